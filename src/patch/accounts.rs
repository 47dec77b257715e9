use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::PatchLog;
use crate::errors::{OpsError, ResultExt};
use crate::fmt;
use crate::inspect::users::{find_student, find_user};

pub const BCRYPT_COST: u32 = 10;

#[derive(Debug, FromRow)]
struct CreatedProfile {
    id: Uuid,
    email: String,
}

pub(super) async fn ensure_student_profiles(
    conn: &mut PgConnection,
    email: Option<&str>,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    if let Some(email) = email {
        let user = find_user(&mut *conn, email).await?;
        if user.role != "student" {
            return Err(OpsError::InvalidInput(format!(
                "{} has role {}, not student",
                user.email, user.role
            )));
        }
    }

    let created: Vec<CreatedProfile> = sqlx::query_as(
        r#"
        WITH inserted AS (
            INSERT INTO students (id, subscription_status, total_study_time, gdpr_consent, gdpr_consent_at)
            SELECT u.id, 'inactive', 0, true, NOW()
            FROM users u
            LEFT JOIN students s ON s.id = u.id
            WHERE u.role::text = 'student'
              AND s.id IS NULL
              AND ($1::text IS NULL OR lower(u.email) = lower($1))
            RETURNING id
        )
        SELECT i.id, u.email
        FROM inserted i
        JOIN users u ON u.id = i.id
        ORDER BY u.email
        "#,
    )
    .bind(email.map(str::trim))
    .fetch_all(&mut *conn)
    .await
    .context("creating missing student profiles")?;

    if created.is_empty() {
        log.note("Todos os alunos já possuem registro em students");
    }
    for profile in &created {
        log.note(format!("Registro criado em students: {} ({})", profile.email, profile.id));
    }
    log.touched(created.len() as u64);
    Ok(log)
}

pub(super) async fn sync_subscription_status(
    conn: &mut PgConnection,
    email: &str,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let user = find_user(&mut *conn, email).await?;
    log.note(format!("Usuário: {} <{}>", user.name, user.email));

    let active: Option<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, status::text, current_period_end::timestamptz
        FROM subscriptions
        WHERE student_id = $1
          AND status::text = 'active'
          AND current_period_end > NOW()
        ORDER BY current_period_end DESC
        LIMIT 1
        "#,
    )
    .bind(user.id)
    .fetch_optional(&mut *conn)
    .await
    .context("loading active subscription")?;

    let (subscription_id, status, period_end) = active.ok_or_else(|| {
        OpsError::NotFound(format!("active subscription for {}", user.email))
    })?;
    log.note(format!(
        "Assinatura ativa {} até {}",
        subscription_id,
        fmt::date(Some(period_end))
    ));

    let before = find_student(&mut *conn, user.id)
        .await?
        .ok_or_else(|| OpsError::NotFound(format!("students row for {}", user.email)))?;

    if before.subscription_status.as_deref() == Some(status.as_str())
        && before.subscription_expires_at == Some(period_end)
    {
        log.note("students já estava sincronizado");
        return Ok(log);
    }

    let updated = sqlx::query(
        "UPDATE students SET subscription_status = $1, subscription_expires_at = $2 WHERE id = $3",
    )
    .bind(&status)
    .bind(period_end)
    .bind(user.id)
    .execute(&mut *conn)
    .await
    .context("updating students subscription mirror")?
    .rows_affected();

    log.note(format!(
        "students: {} / {} → {} / {}",
        before.subscription_status.as_deref().unwrap_or("-"),
        fmt::date(before.subscription_expires_at),
        status,
        fmt::date(Some(period_end))
    ));
    log.touched(updated);
    Ok(log)
}

pub(super) async fn delete_user(conn: &mut PgConnection, email: &str) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let user = find_user(&mut *conn, email).await?;
    log.note(format!("Usuário: {} <{}> ({}, {})", user.name, user.email, user.role, user.id));

    // Profile rows share the user's id.
    for table in ["students", "instructors"] {
        let rows = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", table))
            .bind(user.id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("deleting {} row", table))?
            .rows_affected();
        if rows > 0 {
            log.note(format!("Registro deletado de {}", table));
        }
        log.touched(rows);
    }

    let rows = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&mut *conn)
        .await
        .context("deleting users row")?
        .rows_affected();
    log.note("Registro deletado de users");
    log.touched(rows);

    Ok(log)
}

pub(super) async fn reset_password(
    conn: &mut PgConnection,
    email: &str,
    password: &str,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let user = find_user(&mut *conn, email).await?;
    let hash = bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| OpsError::Unexpected(format!("bcrypt hashing failed: {}", e)))?;

    let rows = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&hash)
        .bind(user.id)
        .execute(&mut *conn)
        .await
        .context("updating password hash")?
        .rows_affected();

    log.note(format!("Senha redefinida para {} ({})", user.email, user.role));
    log.touched(rows);
    Ok(log)
}
