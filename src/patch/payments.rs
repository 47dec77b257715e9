use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::PatchLog;
use crate::db;
use crate::errors::{OpsError, ResultExt};
use crate::fmt;
use crate::inspect::users::find_user;
use crate::models::{PaymentRow, PixStatus};

const DEFAULT_DURATION_DAYS: i32 = 30;

#[derive(Debug, FromRow)]
struct PendingCharge {
    student_id: Uuid,
    plan_id: Uuid,
    status: String,
    final_amount: BigDecimal,
    gateway_charge_id: Option<String>,
    student_email: String,
    plan_name: String,
    duration_days: Option<i32>,
}

/// New `(start, end)` for a subscription renewed by `days`.
///
/// A period that already lapsed restarts from `now`; a running one is
/// extended from its current end so no paid day is lost.
pub fn extended_period(
    existing_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    days: i32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), OpsError> {
    if days <= 0 {
        return Err(OpsError::Unexpected(format!(
            "plan duration must be positive, got {} day(s)",
            days
        )));
    }
    let start = match existing_end {
        Some(end) if end > now => end,
        _ => now,
    };
    let end = start
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| {
            OpsError::Unexpected(format!("plan duration of {} day(s) is out of range", days))
        })?;
    Ok((start, end))
}

#[derive(Debug, FromRow)]
pub(super) struct ActivePlan {
    pub id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub duration_days: Option<i32>,
}

impl ActivePlan {
    pub fn days(&self) -> i32 {
        self.duration_days.unwrap_or(DEFAULT_DURATION_DAYS)
    }
}

/// The given plan, or the cheapest active one.
pub(super) async fn active_plan(
    conn: &mut PgConnection,
    plan_id: Option<Uuid>,
) -> Result<ActivePlan, OpsError> {
    sqlx::query_as(
        r#"
        SELECT id, name, price::numeric AS price, duration_days::int4 AS duration_days
        FROM plans
        WHERE is_active = true AND ($1::uuid IS NULL OR id = $1)
        ORDER BY price
        LIMIT 1
        "#,
    )
    .bind(plan_id)
    .fetch_optional(&mut *conn)
    .await
    .context("loading active plan")?
    .ok_or_else(|| match plan_id {
        Some(id) => OpsError::NotFound(format!("active plan {}", id)),
        None => OpsError::NotFound("any active plan".to_string()),
    })
}

pub(super) async fn db_now(conn: &mut PgConnection) -> Result<DateTime<Utc>, OpsError> {
    sqlx::query_scalar("SELECT NOW()")
        .fetch_one(&mut *conn)
        .await
        .context("reading database clock")
}

/// Extends the student's active subscription, or creates one. Returns the
/// subscription id and the new period end.
async fn renew_subscription(
    conn: &mut PgConnection,
    student_id: Uuid,
    plan_id: Uuid,
    days: i32,
    gateway_id: Option<&str>,
    method: &str,
    log: &mut PatchLog,
) -> Result<(Uuid, DateTime<Utc>), OpsError> {
    let now = db_now(&mut *conn).await?;

    let existing: Option<(Uuid, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"
        SELECT id, current_period_end::timestamptz
        FROM subscriptions
        WHERE student_id = $1 AND status::text = 'active'
        ORDER BY current_period_end DESC NULLS LAST
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await
    .context("loading active subscription")?;

    if let Some((id, current_end)) = existing {
        let (_, end) = extended_period(current_end, now, days)?;
        let rows = sqlx::query(
            "UPDATE subscriptions SET current_period_end = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(end)
        .bind(id)
        .execute(&mut *conn)
        .await
        .context("extending subscription")?
        .rows_affected();
        log.touched(rows);
        log.note(format!(
            "Assinatura {} estendida: {} → {}",
            id,
            fmt::date(current_end),
            fmt::date(Some(end))
        ));
        return Ok((id, end));
    }

    let (start, end) = extended_period(None, now, days)?;
    // Some schema generations record the payment method on the subscription.
    let with_method = db::column_exists(&mut *conn, "subscriptions", "payment_method")
        .await
        .context("checking subscriptions.payment_method")?;
    let sql = if with_method {
        r#"
        INSERT INTO subscriptions
            (student_id, plan_id, status, current_period_start, current_period_end, gateway_subscription_id, payment_method)
        VALUES ($1, $2, 'active', $3, $4, $5, $6)
        RETURNING id
        "#
    } else {
        r#"
        INSERT INTO subscriptions
            (student_id, plan_id, status, current_period_start, current_period_end, gateway_subscription_id)
        VALUES ($1, $2, 'active', $3, $4, $5)
        RETURNING id
        "#
    };
    let mut insert = sqlx::query_scalar::<_, Uuid>(sql)
        .bind(student_id)
        .bind(plan_id)
        .bind(start)
        .bind(end)
        .bind(gateway_id);
    if with_method {
        insert = insert.bind(method);
    }
    let id: Uuid = insert
        .fetch_one(&mut *conn)
        .await
        .context("creating subscription")?;
    log.touched(1);
    log.note(format!(
        "Nova assinatura {} criada: {} → {}",
        id,
        fmt::date(Some(start)),
        fmt::date(Some(end))
    ));
    Ok((id, end))
}

async fn record_payment(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    amount: &BigDecimal,
    method: &str,
    gateway_id: Option<&str>,
    log: &mut PatchLog,
) -> Result<PaymentRow, OpsError> {
    let payment: PaymentRow = sqlx::query_as(
        r#"
        INSERT INTO payments (subscription_id, amount, status, payment_method, gateway_payment_id, paid_at)
        VALUES ($1, $2, 'completed', $3, $4, NOW())
        RETURNING id, subscription_id, amount::numeric AS amount, status::text AS status,
                  payment_method::text AS payment_method, gateway_payment_id::text AS gateway_payment_id,
                  paid_at::timestamptz AS paid_at
        "#,
    )
    .bind(subscription_id)
    .bind(amount)
    .bind(method)
    .bind(gateway_id)
    .fetch_one(&mut *conn)
    .await
    .context("recording payment")?;
    log.touched(1);
    log.note(format!(
        "Pagamento {} registrado em payments ({})",
        payment.id,
        fmt::brl(&payment.amount)
    ));
    Ok(payment)
}

/// Login reads the mirror columns on students.
pub(super) async fn mirror_subscription(
    conn: &mut PgConnection,
    student_id: Uuid,
    status: &str,
    expires_at: Option<DateTime<Utc>>,
    log: &mut PatchLog,
) -> Result<(), OpsError> {
    let rows = sqlx::query(
        "UPDATE students SET subscription_status = $1, subscription_expires_at = $2 WHERE id = $3",
    )
    .bind(status)
    .bind(expires_at)
    .bind(student_id)
    .execute(&mut *conn)
    .await
    .context("updating students subscription mirror")?
    .rows_affected();
    log.touched(rows);
    Ok(())
}

pub(super) async fn confirm_pix_payment(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let charge: PendingCharge = sqlx::query_as(
        r#"
        SELECT pp.student_id, pp.plan_id, pp.status::text AS status,
               pp.final_amount::numeric AS final_amount, pp.gateway_charge_id,
               u.email AS student_email, p.name AS plan_name,
               p.duration_days::int4 AS duration_days
        FROM pix_payments pp
        JOIN users u ON pp.student_id = u.id
        JOIN plans p ON pp.plan_id = p.id
        WHERE pp.id = $1
        FOR UPDATE OF pp
        "#,
    )
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await
    .context("loading PIX payment")?
    .ok_or_else(|| OpsError::NotFound(format!("PIX payment {}", payment_id)))?;

    if PixStatus::parse(&charge.status) != PixStatus::Pending {
        return Err(OpsError::InvalidInput(format!(
            "PIX payment {} is {}, only pending payments can be confirmed",
            payment_id, charge.status
        )));
    }
    log.note(format!(
        "Pagamento {} · {} · {} · {}",
        payment_id,
        charge.student_email,
        charge.plan_name,
        fmt::brl(&charge.final_amount)
    ));

    let paid = sqlx::query(
        "UPDATE pix_payments SET status = 'paid', paid_at = NOW(), updated_at = NOW() WHERE id = $1",
    )
    .bind(payment_id)
    .execute(&mut *conn)
    .await
    .context("marking PIX payment as paid")?
    .rows_affected();
    log.touched(paid);
    log.note("Pagamento marcado como pago");

    let days = charge.duration_days.unwrap_or(DEFAULT_DURATION_DAYS);
    let gateway_id = charge.gateway_charge_id.as_deref();
    let (subscription_id, period_end) = renew_subscription(
        &mut *conn,
        charge.student_id,
        charge.plan_id,
        days,
        gateway_id,
        "pix",
        &mut log,
    )
    .await?;
    record_payment(
        &mut *conn,
        subscription_id,
        &charge.final_amount,
        "pix",
        gateway_id,
        &mut log,
    )
    .await?;
    mirror_subscription(&mut *conn, charge.student_id, "active", Some(period_end), &mut log).await?;

    Ok(log)
}

/// Records a paid card charge the way the gateway webhook would, for
/// environments without a card gateway.
pub(super) async fn simulate_card_payment(
    conn: &mut PgConnection,
    email: &str,
    plan_id: Option<Uuid>,
) -> Result<PatchLog, OpsError> {
    let mut log = PatchLog::default();

    let user = find_user(&mut *conn, email).await?;
    if user.role != "student" {
        return Err(OpsError::InvalidInput(format!(
            "{} has role {}, only students pay for plans",
            user.email, user.role
        )));
    }
    let plan = active_plan(&mut *conn, plan_id).await?;
    log.note(format!(
        "Cartão · {} · {} · {}",
        user.email,
        plan.name,
        fmt::brl(&plan.price)
    ));

    let subscription_ref = format!("manual_{}", Uuid::new_v4().simple());
    let (subscription_id, period_end) = renew_subscription(
        &mut *conn,
        user.id,
        plan.id,
        plan.days(),
        Some(&subscription_ref),
        "card",
        &mut log,
    )
    .await?;
    let payment_ref = format!("manual_payment_{}", Uuid::new_v4().simple());
    record_payment(
        &mut *conn,
        subscription_id,
        &plan.price,
        "card",
        Some(&payment_ref),
        &mut log,
    )
    .await?;
    mirror_subscription(&mut *conn, user.id, "active", Some(period_end), &mut log).await?;

    Ok(log)
}
