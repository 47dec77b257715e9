use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::errors::{OpsError, ResultExt};
use crate::fmt;
use crate::inspect::users::{find_student, find_user};
use crate::models::{PixPaymentRow, PixStatus, PlanRow, StudentRow, SubscriptionRow, UserRow};
use crate::report::Report;

#[derive(Debug, Serialize)]
pub struct PlansReport {
    pub plans: Vec<PlanRow>,
}

impl PlansReport {
    /// Active plans, cheapest first, as the checkout page lists them.
    pub fn active(&self) -> Vec<&PlanRow> {
        let mut active: Vec<&PlanRow> = self.plans.iter().filter(|p| p.is_active).collect();
        active.sort_by(|a, b| a.price.cmp(&b.price));
        active
    }
}

impl Report for PlansReport {
    fn render(&self) -> String {
        let mut out = format!("📊 Total de planos: {}\n", self.plans.len());
        for plan in &self.plans {
            let _ = writeln!(out, "\n  - ID: {}", plan.id);
            let _ = writeln!(out, "    Nome: {}", plan.name);
            let _ = writeln!(out, "    Preço: {} {}", plan.currency, plan.price);
            let _ = writeln!(out, "    Intervalo: {}", plan.interval);
            if let Some(days) = plan.duration_days {
                let _ = writeln!(out, "    Duração: {} dias", days);
            }
            let _ = writeln!(out, "    Ativo: {}", fmt::yes_no(plan.is_active));
        }

        let active = self.active();
        let _ = writeln!(out, "\n✅ Planos ativos: {}", active.len());
        if active.is_empty() {
            out.push_str("⚠️  Nenhum plano ativo encontrado! O checkout não terá opções.\n");
        }
        for plan in active {
            let _ = writeln!(
                out,
                "  - {}: {} {}/{}",
                plan.name, plan.currency, plan.price, plan.interval
            );
        }
        out
    }

    fn is_ok(&self) -> bool {
        !self.active().is_empty()
    }
}

pub async fn plans(pool: &PgPool) -> Result<PlansReport, OpsError> {
    let plans: Vec<PlanRow> = sqlx::query_as(
        r#"
        SELECT id, name, price::numeric AS price, currency, interval::text AS interval,
               is_active, duration_days::int4 AS duration_days,
               created_at::timestamptz AS created_at
        FROM plans
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await
    .context("loading plans")?;

    Ok(PlansReport { plans })
}

#[derive(Debug, Serialize)]
pub struct SubscriptionsReport {
    pub user: UserRow,
    pub student: Option<StudentRow>,
    pub subscriptions: Vec<SubscriptionRow>,
    pub checked_at: DateTime<Utc>,
}

impl SubscriptionsReport {
    /// The subscription currently granting access, latest end date first.
    pub fn current(&self) -> Option<&SubscriptionRow> {
        self.subscriptions
            .iter()
            .filter(|s| s.is_current(self.checked_at))
            .max_by_key(|s| s.current_period_end)
    }

    /// Whether the denormalized status on `students` agrees with `subscriptions`.
    ///
    /// The frontend reads the `students` columns, so a mismatch shows the renewal
    /// warning to a paying student.
    pub fn student_mirror_in_sync(&self) -> bool {
        let Some(student) = &self.student else {
            return self.current().is_none();
        };
        match self.current() {
            Some(current) => {
                student.subscription_status.as_deref() == Some("active")
                    && student.subscription_expires_at == current.current_period_end
            }
            None => student.subscription_status.as_deref() != Some("active"),
        }
    }
}

impl Report for SubscriptionsReport {
    fn render(&self) -> String {
        let mut out = format!("👤 {} <{}>\n", self.user.name, self.user.email);
        if self.subscriptions.is_empty() {
            out.push_str("\n❌ Nenhuma assinatura encontrada\n");
        }
        for (i, sub) in self.subscriptions.iter().enumerate() {
            let current = sub.is_current(self.checked_at);
            let _ = writeln!(out, "\n{}. {}", i + 1, sub.id);
            let _ = writeln!(
                out,
                "   Status:  {} {}",
                sub.status,
                if current { "✅" } else { "❌" }
            );
            let _ = writeln!(out, "   Plano:   {}", sub.plan_name);
            let _ = writeln!(
                out,
                "   Período: {} até {}",
                fmt::date(sub.current_period_start),
                fmt::date(sub.current_period_end)
            );
        }

        out.push('\n');
        out.push_str(&fmt::rule());
        match &self.student {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "\n  students.subscription_status:     {}",
                    s.subscription_status.as_deref().unwrap_or("-")
                );
                let _ = writeln!(
                    out,
                    "  students.subscription_expires_at: {}",
                    fmt::date(s.subscription_expires_at)
                );
            }
            None => out.push_str("\n  Sem registro em students\n"),
        }
        out.push_str(&fmt::rule());
        if self.student_mirror_in_sync() {
            out.push_str("\n✅ students está sincronizado com subscriptions");
        } else {
            out.push_str(
                "\n⚠️  students está dessincronizado (veja: ead-ops patch sync-subscription)",
            );
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.student_mirror_in_sync()
    }
}

pub async fn user_subscriptions(pool: &PgPool, email: &str) -> Result<SubscriptionsReport, OpsError> {
    let user = find_user(pool, email).await?;
    let student = find_student(pool, user.id).await?;

    let subscriptions: Vec<SubscriptionRow> = sqlx::query_as(
        r#"
        SELECT s.id, s.plan_id, p.name AS plan_name, s.status::text AS status,
               s.current_period_start::timestamptz AS current_period_start,
               s.current_period_end::timestamptz AS current_period_end,
               s.gateway_subscription_id,
               s.created_at::timestamptz AS created_at
        FROM subscriptions s
        JOIN plans p ON s.plan_id = p.id
        WHERE s.student_id = $1
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await
    .context("loading subscriptions")?;

    Ok(SubscriptionsReport {
        user,
        student,
        subscriptions,
        checked_at: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct PixReport {
    pub payments: Vec<PixPaymentRow>,
    pub checked_at: DateTime<Utc>,
}

impl PixReport {
    pub fn by_status(&self) -> BTreeMap<PixStatus, Vec<&PixPaymentRow>> {
        let mut groups: BTreeMap<PixStatus, Vec<&PixPaymentRow>> = BTreeMap::new();
        for p in &self.payments {
            groups.entry(p.pix_status()).or_default().push(p);
        }
        groups
    }

    pub fn overdue(&self) -> Vec<&PixPaymentRow> {
        self.payments
            .iter()
            .filter(|p| p.is_overdue(self.checked_at))
            .collect()
    }
}

fn status_label(status: &PixStatus) -> String {
    match status {
        PixStatus::Pending => "⏳ Pendentes".to_string(),
        PixStatus::Paid => "✅ Pagos".to_string(),
        PixStatus::Expired => "⚠️  Expirados".to_string(),
        PixStatus::Cancelled => "❌ Cancelados".to_string(),
        PixStatus::Other(s) => format!("❔ {}", s),
    }
}

impl Report for PixReport {
    fn render(&self) -> String {
        if self.payments.is_empty() {
            return "❌ Nenhum pagamento PIX encontrado".to_string();
        }
        let groups = self.by_status();
        let mut out = format!("📋 Pagamentos PIX: {}\n\n📊 Estatísticas:\n", self.payments.len());
        for (status, rows) in &groups {
            let _ = writeln!(out, "  {}: {}", status_label(status), rows.len());
        }

        for (status, rows) in &groups {
            let _ = writeln!(out, "\n{}:", status_label(status).to_uppercase());
            for (i, p) in rows.iter().enumerate() {
                let _ = writeln!(out, "\n{}. {}", i + 1, p.id);
                let _ = writeln!(out, "   Estudante: {} ({})", p.student_name, p.student_email);
                let _ = writeln!(out, "   Plano: {}", p.plan_name);
                let _ = writeln!(out, "   Valor: {}", fmt::brl(&p.final_amount));
                let _ = writeln!(out, "   Criado: {}", fmt::datetime(p.created_at));
                match status {
                    PixStatus::Paid => {
                        let _ = writeln!(out, "   Pago em: {}", fmt::datetime(p.paid_at));
                    }
                    _ => {
                        let _ = writeln!(
                            out,
                            "   Expira: {} {}",
                            fmt::datetime(p.expires_at),
                            if p.is_overdue(self.checked_at) { "⚠️ EXPIRADO" } else { "" }
                        );
                    }
                }
                let _ = writeln!(
                    out,
                    "   Tipo: {}",
                    if p.is_mock() { "🧪 Mock (dev)" } else { "💳 Real" }
                );
            }
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.overdue().is_empty()
    }
}

pub async fn pix_payments(pool: &PgPool, limit: i64) -> Result<PixReport, OpsError> {
    if limit <= 0 {
        return Err(OpsError::InvalidInput("limit must be positive".into()));
    }

    let payments: Vec<PixPaymentRow> = sqlx::query_as(
        r#"
        SELECT pp.id, pp.student_id, pp.plan_id, pp.status::text AS status,
               pp.amount::numeric AS amount,
               pp.discount::numeric AS discount,
               pp.final_amount::numeric AS final_amount,
               pp.created_at::timestamptz AS created_at,
               pp.paid_at::timestamptz AS paid_at,
               pp.expires_at::timestamptz AS expires_at,
               pp.gateway_charge_id,
               u.name AS student_name,
               u.email AS student_email,
               p.name AS plan_name
        FROM pix_payments pp
        JOIN users u ON pp.student_id = u.id
        JOIN plans p ON pp.plan_id = p.id
        ORDER BY pp.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("loading PIX payments")?;

    Ok(PixReport {
        payments,
        checked_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Duration;
    use std::str::FromStr;
    use uuid::Uuid;

    fn plan(name: &str, price: &str, active: bool) -> PlanRow {
        PlanRow {
            id: Uuid::new_v4(),
            name: name.into(),
            price: BigDecimal::from_str(price).unwrap(),
            currency: "BRL".into(),
            interval: "month".into(),
            is_active: active,
            duration_days: Some(30),
            created_at: None,
        }
    }

    #[test]
    fn test_active_plans_sorted_by_price() {
        let report = PlansReport {
            plans: vec![
                plan("Anual", "399.90", true),
                plan("Legado", "19.90", false),
                plan("Mensal", "49.90", true),
            ],
        };
        let active: Vec<&str> = report.active().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(active, vec!["Mensal", "Anual"]);
        assert!(report.is_ok());
    }

    #[test]
    fn test_no_active_plan_is_not_ok() {
        let report = PlansReport {
            plans: vec![plan("Legado", "19.90", false)],
        };
        assert!(!report.is_ok());
        assert!(report.render().contains("Nenhum plano ativo"));
    }

    fn subscription(status: &str, end: DateTime<Utc>) -> SubscriptionRow {
        SubscriptionRow {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            plan_name: "Mensal".into(),
            status: status.into(),
            current_period_start: Some(end - Duration::days(30)),
            current_period_end: Some(end),
            gateway_subscription_id: None,
            created_at: None,
        }
    }

    fn user() -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: "Aluno".into(),
            email: "aluno@test.com".into(),
            role: "student".into(),
            created_at: None,
        }
    }

    #[test]
    fn test_mirror_out_of_sync_after_renewal() {
        let now = Utc::now();
        let end = now + Duration::days(25);
        let u = user();
        let report = SubscriptionsReport {
            student: Some(StudentRow {
                id: u.id,
                subscription_status: Some("expired".into()),
                subscription_expires_at: Some(now - Duration::days(5)),
                total_study_time: None,
                gdpr_consent: None,
            }),
            user: u,
            subscriptions: vec![
                subscription("expired", now - Duration::days(5)),
                subscription("active", end),
            ],
            checked_at: now,
        };
        assert_eq!(report.current().unwrap().current_period_end, Some(end));
        assert!(!report.student_mirror_in_sync());
    }

    #[test]
    fn test_mirror_in_sync() {
        let now = Utc::now();
        let end = now + Duration::days(25);
        let u = user();
        let report = SubscriptionsReport {
            student: Some(StudentRow {
                id: u.id,
                subscription_status: Some("active".into()),
                subscription_expires_at: Some(end),
                total_study_time: None,
                gdpr_consent: None,
            }),
            user: u,
            subscriptions: vec![subscription("active", end)],
            checked_at: now,
        };
        assert!(report.student_mirror_in_sync());
        assert!(report.is_ok());
    }

    #[test]
    fn test_pix_grouping() {
        let now = Utc::now();
        let payment = |status: &str, expires: DateTime<Utc>| PixPaymentRow {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: status.into(),
            amount: BigDecimal::from(50),
            discount: Some(BigDecimal::from(0)),
            final_amount: BigDecimal::from(50),
            created_at: Some(now - Duration::hours(3)),
            paid_at: None,
            expires_at: Some(expires),
            gateway_charge_id: Some("pi_live_1".into()),
            student_name: "Aluno".into(),
            student_email: "aluno@test.com".into(),
            plan_name: "Mensal".into(),
        };
        let report = PixReport {
            payments: vec![
                payment("pending", now - Duration::minutes(5)),
                payment("pending", now + Duration::minutes(25)),
                payment("paid", now - Duration::hours(1)),
            ],
            checked_at: now,
        };
        let groups = report.by_status();
        assert_eq!(groups[&PixStatus::Pending].len(), 2);
        assert_eq!(groups[&PixStatus::Paid].len(), 1);
        assert_eq!(report.overdue().len(), 1);
        assert!(!report.is_ok());
        assert!(report.render().contains("R$ 50,00"));
    }
}
