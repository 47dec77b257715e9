use serde_json::Value;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::PatchLog;
use crate::db;
use crate::errors::{OpsError, ResultExt};

#[derive(Debug, FromRow)]
struct BackfilledRow {
    id: Uuid,
    title: String,
    course_id: Uuid,
}

#[derive(Debug, FromRow)]
struct TitledRow {
    id: Uuid,
    title: String,
}

pub(super) async fn backfill_course_id(conn: &mut PgConnection) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    if !db::column_exists(&mut *conn, "assessments", "course_id")
        .await
        .context("checking assessments.course_id")?
    {
        return Err(OpsError::Unexpected(
            "assessments has no course_id column, run the course_id migration first".to_string(),
        ));
    }

    let rows: Vec<BackfilledRow> = sqlx::query_as(
        r#"
        UPDATE assessments a
        SET course_id = m.course_id
        FROM modules m
        WHERE a.module_id = m.id AND a.course_id IS NULL
        RETURNING a.id, a.title, m.course_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("backfilling assessments.course_id")?;

    for row in &rows {
        log.note(format!(
            "Avaliação \"{}\" ({}) → course_id {}",
            row.title, row.id, row.course_id
        ));
    }
    log.touched(rows.len() as u64);

    let remaining: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM assessments a
        JOIN modules m ON a.module_id = m.id
        WHERE a.course_id IS NULL
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .context("verifying backfill")?;

    if remaining != 0 {
        return Err(OpsError::Unexpected(format!(
            "{} module-linked assessment(s) still have a null course_id",
            remaining
        )));
    }
    log.note("Nenhuma avaliação vinculada a módulo ficou com course_id NULL");

    Ok(log)
}

pub(super) async fn cleanup_invalid(conn: &mut PgConnection) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let both: Vec<TitledRow> = sqlx::query_as(
        r#"
        UPDATE assessments
        SET course_id = NULL
        WHERE course_id IS NOT NULL AND module_id IS NOT NULL
        RETURNING id, title
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("clearing course_id on module assessments")?;
    for row in &both {
        log.note(format!("course_id removido de \"{}\" ({})", row.title, row.id));
    }
    log.touched(both.len() as u64);

    // Questions reference assessments, so they go first.
    let orphan_filter = r#"
        SELECT a.id
        FROM assessments a
        LEFT JOIN modules m ON a.module_id = m.id
        LEFT JOIN courses c ON a.course_id = c.id
        WHERE (a.module_id IS NOT NULL AND m.id IS NULL)
           OR (a.course_id IS NOT NULL AND c.id IS NULL)
    "#;

    let deleted_questions = sqlx::query(&format!(
        "DELETE FROM questions WHERE assessment_id IN ({})",
        orphan_filter
    ))
    .execute(&mut *conn)
    .await
    .context("deleting questions of orphaned assessments")?
    .rows_affected();
    if deleted_questions > 0 {
        log.note(format!("{} questão(ões) de avaliações órfãs deletadas", deleted_questions));
    }
    log.touched(deleted_questions);

    let orphans: Vec<TitledRow> = sqlx::query_as(&format!(
        "DELETE FROM assessments WHERE id IN ({}) RETURNING id, title",
        orphan_filter
    ))
    .fetch_all(&mut *conn)
    .await
    .context("deleting orphaned assessments")?;
    for row in &orphans {
        log.note(format!("Avaliação órfã deletada: \"{}\" ({})", row.title, row.id));
    }
    log.touched(orphans.len() as u64);

    let (both_left, neither): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE course_id IS NOT NULL AND module_id IS NOT NULL),
            COUNT(*) FILTER (WHERE course_id IS NULL AND module_id IS NULL)
        FROM assessments
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .context("verifying assessment scope")?;
    check_scope_counts(both_left, neither)?;
    log.note("Todas as avaliações têm exatamente um de course_id ou module_id");

    Ok(log)
}

/// Fails unless every assessment ended with exactly one scope column set.
/// Unattached assessments have no safe target, so the whole cleanup rolls back.
pub fn check_scope_counts(both: i64, neither: i64) -> Result<(), OpsError> {
    if both > 0 || neither > 0 {
        return Err(OpsError::Unexpected(format!(
            "{} assessment(s) with both course_id and module_id, {} with neither; fix them manually",
            both, neither
        )));
    }
    Ok(())
}

/// Checks `index` against the question's option list.
pub fn check_answer_index(options: Option<&Value>, index: u32) -> Result<(), OpsError> {
    let Some(options) = options.and_then(|o| o.as_array()) else {
        return Err(OpsError::Unexpected(
            "question has no options array".to_string(),
        ));
    };
    if (index as usize) >= options.len() {
        return Err(OpsError::InvalidInput(format!(
            "answer index {} out of range, question has {} option(s)",
            index,
            options.len()
        )));
    }
    Ok(())
}

pub(super) async fn set_correct_answer(
    conn: &mut PgConnection,
    question_id: Uuid,
    index: u32,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let row: Option<(String, Option<Value>, Option<i32>)> = sqlx::query_as(
        r#"
        SELECT text, to_jsonb(options), correct_answer::int4
        FROM questions
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(question_id)
    .fetch_optional(&mut *conn)
    .await
    .context("loading question")?;

    let (text, options, previous) =
        row.ok_or_else(|| OpsError::NotFound(format!("question {}", question_id)))?;
    check_answer_index(options.as_ref(), index)?;

    let chosen = options
        .as_ref()
        .and_then(|o| o.get(index as usize))
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .unwrap_or_default();

    log.note(format!("Questão: {}", text));
    log.note(format!(
        "correct_answer: {:?} → {} (\"{}\")",
        previous, index, chosen
    ));

    if previous == Some(index as i32) {
        log.note("Resposta já estava correta");
        return Ok(log);
    }

    let updated = sqlx::query("UPDATE questions SET correct_answer = $1 WHERE id = $2")
        .bind(index as i32)
        .bind(question_id)
        .execute(&mut *conn)
        .await
        .context("updating correct_answer")?
        .rows_affected();
    log.touched(updated);

    Ok(log)
}
