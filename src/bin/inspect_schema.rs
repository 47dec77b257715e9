//! Utility to print table structures of the platform database.
//!
//! Without arguments it lists every public table and describes the platform
//! tables; with arguments it describes just those tables.

use ead_ops::config::Config;
use ead_ops::db::{table_exists, Database, PLATFORM_TABLES};
use ead_ops::errors::OpsError;
use ead_ops::inspect::{describe_table, list_tables};
use ead_ops::report::Report;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env()?;
    let db = Database::connect(&config.database).await?;

    let requested: Vec<String> = env::args().skip(1).collect();
    let result = print_tables(&db, &requested).await;
    db.close().await;
    result?;

    Ok(())
}

async fn print_tables(db: &Database, requested: &[String]) -> Result<(), OpsError> {
    let tables: Vec<String> = if requested.is_empty() {
        let list = list_tables(&db.pool, "public").await?;
        println!("{}\n", list.render());
        PLATFORM_TABLES
            .iter()
            .filter(|t| list.tables.iter().any(|name| name == *t))
            .map(|t| t.to_string())
            .collect()
    } else {
        requested.to_vec()
    };

    for table in &tables {
        if !table_exists(&db.pool, "public", table).await? {
            println!("⚠️  Tabela {} não encontrada\n", table);
            continue;
        }
        println!("{}\n", describe_table(&db.pool, table).await?.render());
    }
    Ok(())
}
