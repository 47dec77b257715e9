use sqlx::{postgres::PgPoolOptions, PgExecutor, PgPool};

use crate::config::DatabaseTarget;

/// Tables of the platform schema the tool knows about.
pub const PLATFORM_TABLES: &[&str] = &[
    "users",
    "students",
    "instructors",
    "courses",
    "modules",
    "lessons",
    "lesson_resources",
    "assessments",
    "questions",
    "student_progress",
    "subscriptions",
    "plans",
    "payments",
    "pix_payments",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Opens the single connection a command runs on.
    pub async fn connect(target: &DatabaseTarget) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(target.connect_options()?)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::debug!("Connected to {}", target.redacted());

        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Database connection closed");
    }
}

/// `undefined_table`
pub fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42P01"),
        _ => false,
    }
}

pub async fn table_exists<'e, E>(executor: E, schema: &str, table: &str) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(executor)
    .await
}

/// Whether `public.<table>.<column>` exists. Older databases predate some columns.
pub async fn column_exists<'e, E>(executor: E, table: &str, column: &str) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM information_schema.columns WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2)",
    )
    .bind(table)
    .bind(column)
    .fetch_one(executor)
    .await
}

/// Quotes an identifier for interpolation into SQL.
///
/// Only used for table names that were already checked against
/// `information_schema`, never for values.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
