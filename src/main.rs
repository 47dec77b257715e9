use anyhow::Context;
use clap::Parser;
use sqlx::PgPool;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ead_ops::api_client::{PlatformClient, RegisterRequest};
use ead_ops::cache::CacheClient;
use ead_ops::config::Config;
use ead_ops::db::Database;
use ead_ops::errors::OpsError;
use ead_ops::patch::{run_patch, Patch, PatchMode, SeedStudent, SeedSubscription};
use ead_ops::report::{self, Report};
use ead_ops::{inspect, smoke};

mod cli;

use cli::{
    CacheCommand, Cli, Command, InspectCommand, PatchCommand, SeedState, SmokeCli, SmokeCommand,
};

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "ead_ops=debug" } else { "ead_ops=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Prints the report and returns whether it describes a healthy state.
fn emit<R: Report>(report: R, json: bool) -> bool {
    report::print(&report, json);
    report.is_ok()
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<OpsError>()
        .map(|e| e.exit_code() as u8)
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("❌ Erro: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Config::from_env()?;
    let json = cli.json;

    match cli.command {
        Command::Inspect(cmd) => {
            let db = Database::connect(&config.database)
                .await
                .context("connecting to the database")?;
            // The connection is closed on the error path too.
            let result = run_inspect(&db.pool, cmd, json).await;
            db.close().await;
            Ok(result?)
        }
        Command::Patch(patch_cli) => {
            let mode = if patch_cli.apply {
                PatchMode::Apply
            } else {
                PatchMode::DryRun
            };
            let patch = to_patch(patch_cli.command);
            patch.validate()?;

            let db = Database::connect(&config.database)
                .await
                .context("connecting to the database")?;
            let result = run_patch(&db.pool, &patch, mode).await;
            db.close().await;
            Ok(emit(result?, json))
        }
        Command::Cache(cmd) => {
            let cache = CacheClient::connect(&config.redis_url).await?;
            let ok = match cmd {
                CacheCommand::Flush => emit(cache.flush_all().await?, json),
                CacheCommand::ClearRateLimits => emit(cache.clear_rate_limits().await?, json),
                CacheCommand::Delete {
                    pattern,
                    dry_run: true,
                } => emit(cache.preview_matching(&pattern).await?, json),
                CacheCommand::Delete { pattern, .. } => {
                    emit(cache.delete_matching(&pattern).await?, json)
                }
            };
            Ok(ok)
        }
        Command::Smoke(smoke_cli) => run_smoke(&config, smoke_cli, json).await,
    }
}

async fn run_inspect(pool: &PgPool, cmd: InspectCommand, json: bool) -> Result<bool, OpsError> {
    let ok = match cmd {
        InspectCommand::Tables { schema } => emit(inspect::list_tables(pool, &schema).await?, json),
        InspectCommand::Table { name } => emit(inspect::describe_table(pool, &name).await?, json),
        InspectCommand::Counts => emit(inspect::table_counts(pool).await?, json),
        InspectCommand::User { email } => {
            ead_ops::validate::email(&email)?;
            emit(inspect::lookup_user(pool, &email).await?, json)
        }
        InspectCommand::Courses { status } => {
            emit(inspect::course_overview(pool, status.as_deref()).await?, json)
        }
        InspectCommand::Course { id } => emit(inspect::course_tree(pool, id).await?, json),
        InspectCommand::Assessments => emit(inspect::assessment_integrity(pool).await?, json),
        InspectCommand::Questions { assessment_id } => {
            emit(inspect::assessment_questions(pool, assessment_id).await?, json)
        }
        InspectCommand::Plans => emit(inspect::plans(pool).await?, json),
        InspectCommand::Subscriptions { email } => {
            ead_ops::validate::email(&email)?;
            emit(inspect::user_subscriptions(pool, &email).await?, json)
        }
        InspectCommand::Pix { limit } => emit(inspect::pix_payments(pool, limit).await?, json),
        InspectCommand::Progress { email } => {
            ead_ops::validate::email(&email)?;
            emit(inspect::student_progress(pool, &email).await?, json)
        }
    };
    Ok(ok)
}

fn to_patch(cmd: PatchCommand) -> Patch {
    match cmd {
        PatchCommand::BackfillAssessmentCourse => Patch::BackfillAssessmentCourse,
        PatchCommand::CleanupAssessments => Patch::CleanupAssessments,
        PatchCommand::DedupeResources => Patch::DedupeResources,
        PatchCommand::EnsureStudentProfiles { email } => Patch::EnsureStudentProfiles { email },
        PatchCommand::SyncSubscription { email } => Patch::SyncSubscription { email },
        PatchCommand::DeleteUser { email } => Patch::DeleteUser { email },
        PatchCommand::ResetPassword { email, password } => Patch::ResetPassword { email, password },
        PatchCommand::SetCorrectAnswer { question_id, index } => {
            Patch::SetCorrectAnswer { question_id, index }
        }
        PatchCommand::ConfirmPix { payment_id } => Patch::ConfirmPix { payment_id },
        PatchCommand::SimulateCardPayment { email, plan } => Patch::SimulateCardPayment {
            email,
            plan_id: plan,
        },
        PatchCommand::SeedStudent {
            email,
            password,
            name,
            subscription,
            plan,
        } => Patch::SeedStudent(SeedStudent {
            email,
            name,
            password,
            subscription: match subscription {
                SeedState::None => SeedSubscription::None,
                SeedState::Active => SeedSubscription::Active,
                SeedState::Expired => SeedSubscription::Expired,
            },
            plan_id: plan,
        }),
    }
}

async fn run_smoke(config: &Config, smoke_cli: SmokeCli, json: bool) -> anyhow::Result<bool> {
    let client = PlatformClient::new(&config.api_base_url, config.http_timeout)?;

    if let Some(SmokeCommand::Register {
        name,
        email,
        password,
        role,
    }) = smoke_cli.command
    {
        let request = RegisterRequest {
            role,
            ..RegisterRequest::student(&name, &email, &password)
        };
        return Ok(emit(smoke::register_user(&client, &request).await?, json));
    }

    let email = smoke_cli.email.or_else(|| config.smoke_email.clone());
    let password = smoke_cli.password.or_else(|| config.smoke_password.clone());

    let mut suite = smoke::default_suite();
    let session = match (email, password) {
        (Some(email), Some(password)) => Some(client.login(&email, &password).await?),
        _ => {
            tracing::warn!("No smoke credentials, running anonymous checks only");
            suite.retain(|check| !check.authenticated);
            None
        }
    };

    let report = smoke::run_suite(&client, session.as_ref(), &suite).await;
    Ok(emit(report, json))
}
