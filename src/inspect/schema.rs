use serde::Serialize;
use sqlx::PgPool;
use std::fmt::Write;

use crate::db::{self, PLATFORM_TABLES};
use crate::errors::{OpsError, ResultExt};
use crate::models::{CheckConstraint, TableColumn, TableCount};
use crate::report::Report;

#[derive(Debug, Serialize)]
pub struct TableList {
    pub schema: String,
    pub tables: Vec<String>,
}

impl Report for TableList {
    fn render(&self) -> String {
        let mut out = format!("Tabelas no schema '{}':\n\n", self.schema);
        for table in &self.tables {
            let _ = writeln!(out, "  - {}", table);
        }
        let _ = write!(out, "\n{} tabela(s)", self.tables.len());
        out
    }
}

pub async fn list_tables(pool: &PgPool, schema: &str) -> Result<TableList, OpsError> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1 ORDER BY table_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .context("listing tables")?;

    Ok(TableList {
        schema: schema.to_string(),
        tables,
    })
}

#[derive(Debug, Serialize)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<TableColumn>,
    pub check_constraints: Vec<CheckConstraint>,
}

impl Report for TableDescription {
    fn render(&self) -> String {
        let mut out = format!("Colunas da tabela {}:\n", self.table);
        for col in &self.columns {
            let _ = write!(
                out,
                "  - {}: {} (nullable: {})",
                col.column_name,
                col.data_type,
                if col.is_nullable { "YES" } else { "NO" }
            );
            if let Some(default) = &col.column_default {
                let _ = write!(out, " default {}", default);
            }
            out.push('\n');
        }
        if !self.check_constraints.is_empty() {
            out.push_str("\nCheck constraints:\n");
            for c in &self.check_constraints {
                let _ = writeln!(out, "  - {}: {}", c.name, c.definition);
            }
        }
        out
    }
}

pub async fn describe_table(pool: &PgPool, table: &str) -> Result<TableDescription, OpsError> {
    let columns: Vec<TableColumn> = sqlx::query_as(
        r#"
        SELECT column_name::text AS column_name,
               data_type::text AS data_type,
               (is_nullable = 'YES') AS is_nullable,
               column_default::text AS column_default
        FROM information_schema.columns
        WHERE table_schema = 'public' AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("describing table {}", table))?;

    if columns.is_empty() {
        return Err(OpsError::NotFound(format!("table '{}'", table)));
    }

    let check_constraints: Vec<CheckConstraint> = sqlx::query_as(
        r#"
        SELECT con.conname::text AS name,
               pg_get_constraintdef(con.oid) AS definition
        FROM pg_constraint con
        JOIN pg_class rel ON rel.oid = con.conrelid
        JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
        WHERE nsp.nspname = 'public' AND rel.relname = $1 AND con.contype = 'c'
        ORDER BY con.conname
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("loading check constraints of {}", table))?;

    Ok(TableDescription {
        table: table.to_string(),
        columns,
        check_constraints,
    })
}

#[derive(Debug, Serialize)]
pub struct TableCounts {
    pub counts: Vec<TableCount>,
}

impl TableCounts {
    pub fn missing(&self) -> Vec<&str> {
        self.counts
            .iter()
            .filter(|c| c.rows.is_none())
            .map(|c| c.table.as_str())
            .collect()
    }
}

impl Report for TableCounts {
    fn render(&self) -> String {
        let width = self.counts.iter().map(|c| c.table.len()).max().unwrap_or(0);
        let mut out = String::from("📊 Registros por tabela:\n\n");
        for c in &self.counts {
            match c.rows {
                Some(n) => {
                    let _ = writeln!(out, "  {:<width$}  {}", c.table, n, width = width);
                }
                None => {
                    let _ = writeln!(
                        out,
                        "  {:<width$}  ❌ tabela não existe",
                        c.table,
                        width = width
                    );
                }
            }
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.missing().is_empty()
    }
}

pub async fn table_counts(pool: &PgPool) -> Result<TableCounts, OpsError> {
    let mut counts = Vec::with_capacity(PLATFORM_TABLES.len());
    for table in PLATFORM_TABLES {
        let sql = format!("SELECT COUNT(*) FROM {}", db::quote_ident(table));
        let rows = match sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await {
            Ok(n) => Some(n),
            Err(e) if db::is_undefined_table(&e) => {
                tracing::warn!("Table {} does not exist", table);
                None
            }
            Err(e) => {
                return Err::<TableCounts, _>(e)
                    .with_context(|| format!("counting rows of {}", table))
            }
        };
        counts.push(TableCount {
            table: table.to_string(),
            rows,
        });
    }
    Ok(TableCounts { counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_report_missing_tables() {
        let report = TableCounts {
            counts: vec![
                TableCount {
                    table: "users".into(),
                    rows: Some(3),
                },
                TableCount {
                    table: "pix_payments".into(),
                    rows: None,
                },
            ],
        };
        assert_eq!(report.missing(), vec!["pix_payments"]);
        assert!(!report.is_ok());
        let text = report.render();
        assert!(text.contains("users"));
        assert!(text.contains("não existe"));
    }

    #[test]
    fn test_describe_render_lists_constraints() {
        let report = TableDescription {
            table: "assessments".into(),
            columns: vec![TableColumn {
                column_name: "course_id".into(),
                data_type: "uuid".into(),
                is_nullable: true,
                column_default: None,
            }],
            check_constraints: vec![CheckConstraint {
                name: "assessment_target_check".into(),
                definition: "CHECK (...)".into(),
            }],
        };
        let text = report.render();
        assert!(text.contains("course_id: uuid (nullable: YES)"));
        assert!(text.contains("assessment_target_check"));
    }
}
