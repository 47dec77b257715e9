//! Command-line definitions for `ead-ops`. Dispatch lives in `main.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "ead-ops",
    version,
    about = "Diagnostics, data patches, cache maintenance and smoke tests for the EAD platform"
)]
pub struct Cli {
    /// Print reports as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read-only database diagnostics
    #[command(subcommand)]
    Inspect(InspectCommand),
    /// Transactional data fixes (dry run unless --apply)
    Patch(PatchCli),
    /// Redis maintenance
    #[command(subcommand)]
    Cache(CacheCommand),
    /// HTTP smoke tests against a running API
    Smoke(SmokeCli),
}

#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// List tables of a schema
    Tables {
        #[arg(long, default_value = "public")]
        schema: String,
    },
    /// Columns and check constraints of one table
    Table { name: String },
    /// Row counts of the platform tables
    Counts,
    /// A user with their student/instructor profile rows
    User { email: String },
    /// Courses with instructor and content counts
    Courses {
        #[arg(long)]
        status: Option<String>,
    },
    /// Module/lesson/assessment tree of one course
    Course { id: Uuid },
    /// Integrity checks on assessments
    Assessments,
    /// Questions of one assessment
    Questions { assessment_id: Uuid },
    /// Subscription plans
    Plans,
    /// Subscriptions of one user
    Subscriptions { email: String },
    /// Recent PIX payments
    Pix {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Course progress of one student
    Progress { email: String },
}

#[derive(clap::Args, Debug)]
pub struct PatchCli {
    /// Commit the transaction; without it every change is rolled back.
    #[arg(long, global = true)]
    pub apply: bool,

    #[command(subcommand)]
    pub command: PatchCommand,
}

#[derive(Subcommand, Debug)]
pub enum PatchCommand {
    /// Fill assessments.course_id from the owning module
    BackfillAssessmentCourse,
    /// Clear course_id on module assessments and delete orphans
    CleanupAssessments,
    /// Delete duplicated lesson resources, keeping the newest
    DedupeResources,
    /// Create missing students rows for student users
    EnsureStudentProfiles {
        #[arg(long)]
        email: Option<String>,
    },
    /// Copy the active subscription onto the students row
    SyncSubscription { email: String },
    /// Delete a user and their profile rows
    DeleteUser { email: String },
    /// Set a new bcrypt password
    ResetPassword { email: String, password: String },
    /// Point a question's correct_answer at option INDEX (0-based)
    SetCorrectAnswer { question_id: Uuid, index: u32 },
    /// Confirm a pending PIX payment as the gateway webhook would
    ConfirmPix { payment_id: Uuid },
    /// Record a paid card charge as the gateway webhook would
    SimulateCardPayment {
        email: String,
        /// Plan to charge (defaults to the cheapest active plan)
        #[arg(long)]
        plan: Option<Uuid>,
    },
    /// Create or reset a test student with a known password
    SeedStudent {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "Estudante Teste")]
        name: String,
        #[arg(long, value_enum, default_value_t = SeedState::Active)]
        subscription: SeedState,
        /// Plan for the subscription (defaults to the cheapest active plan)
        #[arg(long)]
        plan: Option<Uuid>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedState {
    None,
    Active,
    Expired,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// FLUSHALL
    Flush,
    /// Delete the API's rate-limit counters
    ClearRateLimits,
    /// Delete every key matching a glob pattern
    Delete {
        pattern: String,
        /// List the matching keys without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct SmokeCli {
    /// Login email (falls back to SMOKE_EMAIL)
    #[arg(long)]
    pub email: Option<String>,

    /// Login password (falls back to SMOKE_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Option<SmokeCommand>,
}

#[derive(Subcommand, Debug)]
pub enum SmokeCommand {
    /// Register a user through the public API
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "student")]
        role: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_patch_defaults_to_dry_run() {
        let cli = Cli::parse_from(["ead-ops", "patch", "delete-user", "a@example.com"]);
        match cli.command {
            Command::Patch(p) => assert!(!p.apply),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_apply_flag_after_subcommand() {
        let cli = Cli::parse_from(["ead-ops", "patch", "dedupe-resources", "--apply"]);
        match cli.command {
            Command::Patch(p) => assert!(p.apply),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_seed_student_defaults_to_active() {
        let cli = Cli::parse_from([
            "ead-ops", "patch", "seed-student", "--email", "aluno@example.com", "--password",
            "Senha123!",
        ]);
        match cli.command {
            Command::Patch(PatchCli {
                command: PatchCommand::SeedStudent { subscription, name, .. },
                apply,
            }) => {
                assert!(!apply);
                assert_eq!(subscription, SeedState::Active);
                assert_eq!(name, "Estudante Teste");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cache_delete_dry_run() {
        let cli = Cli::parse_from(["ead-ops", "cache", "delete", "session:*", "--dry-run"]);
        match cli.command {
            Command::Cache(CacheCommand::Delete { pattern, dry_run }) => {
                assert_eq!(pattern, "session:*");
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_smoke_register() {
        let cli = Cli::parse_from([
            "ead-ops", "--json", "smoke", "register", "--name", "Aluno", "--email",
            "a@example.com", "--password", "Senha123!",
        ]);
        assert!(cli.json);
        match cli.command {
            Command::Smoke(SmokeCli {
                command: Some(SmokeCommand::Register { role, .. }),
                ..
            }) => assert_eq!(role, "student"),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
