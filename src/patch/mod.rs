//! Transactional data fixes.
//!
//! Every patch runs inside exactly one transaction. In dry-run mode the
//! statements execute for real and are then rolled back, so the report shows
//! exactly what `--apply` would change.

mod accounts;
mod assessments;
mod payments;
mod resources;
mod seed;

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::fmt::Write;
use uuid::Uuid;

use crate::errors::{OpsError, ResultExt};
use crate::report::Report;
use crate::validate;

pub use payments::extended_period;
pub use seed::{SeedStudent, SeedSubscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    DryRun,
    Apply,
}

#[derive(Debug, Clone)]
pub enum Patch {
    /// Copy the module's course into `assessments.course_id` where it is null.
    BackfillAssessmentCourse,
    /// Enforce "exactly one of course_id/module_id" and drop orphaned assessments.
    CleanupAssessments,
    /// Keep only the newest row of each duplicated lesson resource.
    DedupeResources,
    /// Create missing `students` rows for student users.
    EnsureStudentProfiles { email: Option<String> },
    /// Mirror the active subscription onto the `students` row.
    SyncSubscription { email: String },
    DeleteUser { email: String },
    ResetPassword { email: String, password: String },
    SetCorrectAnswer { question_id: Uuid, index: u32 },
    /// Development-only stand-in for the PIX gateway webhook.
    ConfirmPix { payment_id: Uuid },
    /// Development-only stand-in for the card gateway webhook.
    SimulateCardPayment { email: String, plan_id: Option<Uuid> },
    /// Test login with a known password and subscription state.
    SeedStudent(SeedStudent),
}

impl Patch {
    pub fn name(&self) -> &'static str {
        match self {
            Patch::BackfillAssessmentCourse => "backfill-assessment-course",
            Patch::CleanupAssessments => "cleanup-assessments",
            Patch::DedupeResources => "dedupe-resources",
            Patch::EnsureStudentProfiles { .. } => "ensure-student-profiles",
            Patch::SyncSubscription { .. } => "sync-subscription",
            Patch::DeleteUser { .. } => "delete-user",
            Patch::ResetPassword { .. } => "reset-password",
            Patch::SetCorrectAnswer { .. } => "set-correct-answer",
            Patch::ConfirmPix { .. } => "confirm-pix",
            Patch::SimulateCardPayment { .. } => "simulate-card-payment",
            Patch::SeedStudent(_) => "seed-student",
        }
    }

    /// Argument checks that need no database access.
    pub fn validate(&self) -> Result<(), OpsError> {
        match self {
            Patch::EnsureStudentProfiles { email: Some(email) }
            | Patch::SyncSubscription { email }
            | Patch::DeleteUser { email }
            | Patch::SimulateCardPayment { email, .. } => validate::email(email).map(|_| ()),
            Patch::ResetPassword { email, password } => {
                validate::email(email)?;
                validate::password(password)?;
                Ok(())
            }
            Patch::SeedStudent(seed) => {
                validate::email(&seed.email)?;
                validate::password(&seed.password)?;
                if seed.name.trim().is_empty() {
                    return Err(OpsError::InvalidInput("name must not be empty".to_string()));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// What a patch did (or would do, in dry-run mode).
#[derive(Debug, Default, Serialize)]
pub struct PatchLog {
    pub affected: u64,
    pub notes: Vec<String>,
}

impl PatchLog {
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn touched(&mut self, rows: u64) {
        self.affected += rows;
    }
}

#[derive(Debug, Serialize)]
pub struct PatchOutcome {
    pub name: &'static str,
    pub mode: PatchMode,
    pub committed: bool,
    pub affected: u64,
    pub notes: Vec<String>,
}

impl Report for PatchOutcome {
    fn render(&self) -> String {
        let mut out = format!("🔧 {}\n", self.name);
        for note in &self.notes {
            let _ = writeln!(out, "   {}", note);
        }
        let _ = writeln!(out, "\n   Linhas afetadas: {}", self.affected);
        if self.committed {
            out.push_str("✅ Alterações confirmadas (COMMIT)");
        } else if self.affected == 0 {
            out.push_str("✅ Nada a corrigir");
        } else {
            out.push_str("↩️  Dry-run: alterações desfeitas (ROLLBACK). Use --apply para gravar.");
        }
        out
    }
}

async fn apply(conn: &mut PgConnection, patch: &Patch) -> Result<PatchLog, OpsError> {
    match patch {
        Patch::BackfillAssessmentCourse => assessments::backfill_course_id(conn).await,
        Patch::CleanupAssessments => assessments::cleanup_invalid(conn).await,
        Patch::DedupeResources => resources::dedupe_lesson_resources(conn).await,
        Patch::EnsureStudentProfiles { email } => {
            accounts::ensure_student_profiles(conn, email.as_deref()).await
        }
        Patch::SyncSubscription { email } => accounts::sync_subscription_status(conn, email).await,
        Patch::DeleteUser { email } => accounts::delete_user(conn, email).await,
        Patch::ResetPassword { email, password } => {
            accounts::reset_password(conn, email, password).await
        }
        Patch::SetCorrectAnswer { question_id, index } => {
            assessments::set_correct_answer(conn, *question_id, *index).await
        }
        Patch::ConfirmPix { payment_id } => payments::confirm_pix_payment(conn, *payment_id).await,
        Patch::SimulateCardPayment { email, plan_id } => {
            payments::simulate_card_payment(conn, email, *plan_id).await
        }
        Patch::SeedStudent(seed) => seed::seed_student(conn, seed).await,
    }
}

/// Runs `patch` in a single transaction, committing only in `Apply` mode and
/// only when every statement succeeded.
pub async fn run_patch(pool: &PgPool, patch: &Patch, mode: PatchMode) -> Result<PatchOutcome, OpsError> {
    patch.validate()?;

    tracing::info!("Running patch {} ({:?})", patch.name(), mode);
    let mut tx = pool.begin().await.context("starting transaction")?;

    let log = match apply(&mut *tx, patch).await {
        Ok(log) => log,
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            tracing::error!("Patch {} failed, rolled back: {}", patch.name(), e);
            return Err(e);
        }
    };

    let committed = match mode {
        PatchMode::Apply => {
            tx.commit().await.context("committing transaction")?;
            tracing::info!("Patch {} committed ({} rows)", patch.name(), log.affected);
            true
        }
        PatchMode::DryRun => {
            tx.rollback().await.context("rolling back dry run")?;
            tracing::info!("Patch {} rolled back (dry run)", patch.name());
            false
        }
    };

    Ok(PatchOutcome {
        name: patch.name(),
        mode,
        committed,
        affected: log.affected,
        notes: log.notes,
    })
}
