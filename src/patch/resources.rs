use sqlx::PgConnection;

use super::PatchLog;
use crate::errors::{OpsError, ResultExt};
use crate::models::DuplicateResourceGroup;

pub(super) async fn dedupe_lesson_resources(conn: &mut PgConnection) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let groups: Vec<DuplicateResourceGroup> = sqlx::query_as(
        r#"
        SELECT lesson_id, title, type::text AS type, COUNT(*) AS count
        FROM lesson_resources
        GROUP BY lesson_id, title, type
        HAVING COUNT(*) > 1
        ORDER BY count DESC
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("listing duplicated lesson resources")?;

    if groups.is_empty() {
        log.note("Nenhum recurso duplicado encontrado");
        return Ok(log);
    }

    for group in &groups {
        log.note(format!(
            "Aula {} · \"{}\" ({}) · {} cópias",
            group.lesson_id, group.title, group.resource_type, group.count
        ));
    }

    let deleted = sqlx::query(
        r#"
        DELETE FROM lesson_resources
        WHERE id IN (
            SELECT id FROM (
                SELECT id,
                       ROW_NUMBER() OVER (
                           PARTITION BY lesson_id, title, type
                           ORDER BY created_at DESC NULLS LAST, id DESC
                       ) AS rn
                FROM lesson_resources
            ) ranked
            WHERE ranked.rn > 1
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .context("deleting duplicated lesson resources")?
    .rows_affected();

    let expected: i64 = groups.iter().map(|g| g.count - 1).sum();
    if deleted as i64 != expected {
        return Err(OpsError::Unexpected(format!(
            "expected to delete {} duplicate(s) but deleted {}",
            expected, deleted
        )));
    }

    log.note(format!("Removidas {} duplicatas, mantida a cópia mais recente de cada grupo", deleted));
    log.touched(deleted);
    Ok(log)
}
