use chrono::Duration;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use super::accounts::BCRYPT_COST;
use super::payments::{active_plan, db_now, extended_period, mirror_subscription};
use super::PatchLog;
use crate::errors::{OpsError, ResultExt};
use crate::fmt;

/// Subscription state a seeded test student ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedSubscription {
    None,
    Active,
    /// Cancelled 30 days ago after a 30-day period.
    Expired,
}

const EXPIRED_DAYS_AGO: i64 = 30;

#[derive(Debug, Clone)]
pub struct SeedStudent {
    pub email: String,
    pub name: String,
    pub password: String,
    pub subscription: SeedSubscription,
    pub plan_id: Option<Uuid>,
}

/// Creates (or resets) a student login with a known password and a chosen
/// subscription state. Earlier subscriptions of that student are replaced.
pub(super) async fn seed_student(
    conn: &mut PgConnection,
    seed: &SeedStudent,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();
    let email = seed.email.trim();

    let hash = bcrypt::hash(&seed.password, BCRYPT_COST)
        .map_err(|e| OpsError::Unexpected(format!("bcrypt hashing failed: {}", e)))?;

    let existing: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, role::text FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&mut *conn)
            .await
            .context("looking up user")?;

    let user_id = match existing {
        Some((id, role)) => {
            if role != "student" {
                return Err(OpsError::InvalidInput(format!(
                    "{} already exists with role {}, refusing to turn it into a test student",
                    email, role
                )));
            }
            let rows = sqlx::query(
                "UPDATE users SET password_hash = $1, is_active = true WHERE id = $2",
            )
            .bind(&hash)
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("resetting seeded user")?
            .rows_affected();
            log.touched(rows);
            log.note(format!("Usuário {} já existia ({}), senha redefinida", email, id));
            id
        }
        None => {
            let id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO users (email, password_hash, name, role, is_active)
                VALUES ($1, $2, $3, 'student', true)
                RETURNING id
                "#,
            )
            .bind(email)
            .bind(&hash)
            .bind(seed.name.trim())
            .fetch_one(&mut *conn)
            .await
            .context("creating user")?;
            log.touched(1);
            log.note(format!("Usuário criado: {} ({})", email, id));
            id
        }
    };

    let profile = sqlx::query(
        r#"
        INSERT INTO students (id, subscription_status, total_study_time, gdpr_consent, gdpr_consent_at)
        VALUES ($1, 'inactive', 0, true, NOW())
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .context("creating students row")?
    .rows_affected();
    if profile > 0 {
        log.note("Registro criado em students");
    }
    log.touched(profile);

    // Payments reference subscriptions, so they go first.
    let old_payments = sqlx::query(
        "DELETE FROM payments WHERE subscription_id IN (SELECT id FROM subscriptions WHERE student_id = $1)",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .context("deleting previous payments")?
    .rows_affected();
    let old_subscriptions = sqlx::query("DELETE FROM subscriptions WHERE student_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("deleting previous subscriptions")?
        .rows_affected();
    if old_subscriptions > 0 {
        log.note(format!(
            "{} assinatura(s) e {} pagamento(s) anteriores removidos",
            old_subscriptions, old_payments
        ));
    }
    log.touched(old_payments + old_subscriptions);

    match seed.subscription {
        SeedSubscription::None => {
            mirror_subscription(&mut *conn, user_id, "inactive", None, &mut log).await?;
            log.note("Sem assinatura");
        }
        SeedSubscription::Active => {
            let plan = active_plan(&mut *conn, seed.plan_id).await?;
            let now = db_now(&mut *conn).await?;
            let (start, end) = extended_period(None, now, plan.days())?;
            let id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO subscriptions (student_id, plan_id, status, current_period_start, current_period_end)
                VALUES ($1, $2, 'active', $3, $4)
                RETURNING id
                "#,
            )
            .bind(user_id)
            .bind(plan.id)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *conn)
            .await
            .context("creating active subscription")?;
            log.touched(1);
            log.note(format!(
                "Assinatura ativa {} ({}): {} → {}",
                id,
                plan.name,
                fmt::date(Some(start)),
                fmt::date(Some(end))
            ));
            mirror_subscription(&mut *conn, user_id, "active", Some(end), &mut log).await?;
        }
        SeedSubscription::Expired => {
            let plan = active_plan(&mut *conn, seed.plan_id).await?;
            let now = db_now(&mut *conn).await?;
            let end = now - Duration::days(EXPIRED_DAYS_AGO);
            let start = end - Duration::days(EXPIRED_DAYS_AGO);
            let id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO subscriptions
                    (student_id, plan_id, status, current_period_start, current_period_end, cancelled_at)
                VALUES ($1, $2, 'cancelled', $3, $4, $4)
                RETURNING id
                "#,
            )
            .bind(user_id)
            .bind(plan.id)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *conn)
            .await
            .context("creating expired subscription")?;
            log.touched(1);
            log.note(format!(
                "Assinatura vencida {} ({}): expirou em {}",
                id,
                plan.name,
                fmt::date(Some(end))
            ));
            mirror_subscription(&mut *conn, user_id, "cancelled", Some(end), &mut log).await?;
        }
    }

    Ok(log)
}
