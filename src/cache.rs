//! Redis maintenance: full flush and pattern deletes.
//!
//! Keys are enumerated with `SCAN` so a large keyspace never blocks the
//! server the way `KEYS` would.

use redis::aio::MultiplexedConnection;
use serde::Serialize;
use std::fmt::Write;

use crate::errors::{OpsError, ResultExt};
use crate::report::Report;

const SCAN_COUNT: usize = 500;
const DELETE_BATCH: usize = 500;

/// Patterns matching the API's rate-limit counters (`<prefix>:<ip>`).
pub const RATE_LIMIT_PATTERNS: [&str; 2] = ["*login*", "*api*"];

fn check_pattern(pattern: &str) -> Result<(), OpsError> {
    if pattern.trim().is_empty() {
        return Err(OpsError::InvalidInput("pattern must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CacheClient {
    con: MultiplexedConnection,
}

#[derive(Debug, Serialize)]
pub struct FlushReport {
    /// Keys across every logical database, since FLUSHALL clears them all.
    pub keys_before: u64,
}

impl Report for FlushReport {
    fn render(&self) -> String {
        format!(
            "🧹 FLUSHALL executado ({} chave(s) removidas em todos os bancos)\n✅ Redis limpo",
            self.keys_before
        )
    }
}

/// Total `keys=` over the `dbN:` lines of `INFO keyspace`.
pub fn keyspace_total(info: &str) -> u64 {
    info.lines()
        .filter(|line| line.starts_with("db"))
        .filter_map(|line| line.split_once(':'))
        .filter_map(|(_, fields)| {
            fields
                .split(',')
                .find_map(|field| field.strip_prefix("keys="))
                .and_then(|n| n.trim().parse::<u64>().ok())
        })
        .sum()
}

#[derive(Debug, Serialize)]
pub struct DeleteReport {
    pub pattern: String,
    /// Keys only listed, nothing deleted.
    pub dry_run: bool,
    pub deleted: Vec<String>,
}

impl Report for DeleteReport {
    fn render(&self) -> String {
        let mut out = format!("🔑 Padrão {}\n", self.pattern);
        if self.deleted.is_empty() {
            out.push_str("   Nenhuma chave encontrada\n");
        }
        let mark = if self.dry_run { "·" } else { "✗" };
        for key in &self.deleted {
            let _ = writeln!(out, "   {} {}", mark, key);
        }
        if self.dry_run {
            let _ = write!(
                out,
                "   {} chave(s) encontradas (dry-run, nada deletado)",
                self.deleted.len()
            );
        } else {
            let _ = write!(out, "   {} chave(s) deletadas", self.deleted.len());
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitReport {
    pub patterns: Vec<DeleteReport>,
}

impl RateLimitReport {
    pub fn total(&self) -> usize {
        self.patterns.iter().map(|p| p.deleted.len()).sum()
    }
}

impl Report for RateLimitReport {
    fn render(&self) -> String {
        let mut out = String::new();
        for pattern in &self.patterns {
            out.push_str(&pattern.render());
            out.push('\n');
        }
        let _ = write!(out, "✅ Rate limits limpos ({} chave(s))", self.total());
        out
    }
}

impl CacheClient {
    pub async fn connect(url: &str) -> Result<Self, OpsError> {
        let client = redis::Client::open(url)
            .map_err(|e| OpsError::InvalidInput(format!("invalid redis url: {}", e)))?;
        let con = client
            .get_multiplexed_async_connection()
            .await
            .context("connecting to redis")?;
        tracing::info!("Connected to redis");
        Ok(Self { con })
    }

    /// Number of keys in every logical database.
    pub async fn key_count(&self) -> Result<u64, OpsError> {
        let mut con = self.con.clone();
        let info: String = redis::cmd("INFO")
            .arg("keyspace")
            .query_async(&mut con)
            .await
            .context("INFO keyspace")?;
        Ok(keyspace_total(&info))
    }

    pub async fn flush_all(&self) -> Result<FlushReport, OpsError> {
        let keys_before = self.key_count().await?;
        let mut con = self.con.clone();
        let _: () = redis::cmd("FLUSHALL")
            .query_async(&mut con)
            .await
            .context("FLUSHALL")?;
        tracing::warn!("Flushed all redis databases ({} keys)", keys_before);
        Ok(FlushReport { keys_before })
    }

    /// Every key matching `pattern`, collected across the whole SCAN cycle.
    pub async fn scan_matching(&self, pattern: &str) -> Result<Vec<String>, OpsError> {
        let mut con = self.con.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut con)
                .await
                .with_context(|| format!("SCAN {}", pattern))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Lists what `delete_matching` would remove, without deleting.
    pub async fn preview_matching(&self, pattern: &str) -> Result<DeleteReport, OpsError> {
        check_pattern(pattern)?;
        let keys = self.scan_matching(pattern).await?;
        tracing::info!("{} key(s) match {}", keys.len(), pattern);
        Ok(DeleteReport {
            pattern: pattern.to_string(),
            dry_run: true,
            deleted: keys,
        })
    }

    pub async fn delete_matching(&self, pattern: &str) -> Result<DeleteReport, OpsError> {
        check_pattern(pattern)?;

        let keys = self.scan_matching(pattern).await?;
        let mut con = self.con.clone();
        let mut deleted = 0u64;
        for chunk in keys.chunks(DELETE_BATCH) {
            let n: u64 = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut con)
                .await
                .with_context(|| format!("DEL {} key(s)", chunk.len()))?;
            deleted += n;
        }
        tracing::info!("Deleted {} key(s) matching {}", deleted, pattern);

        Ok(DeleteReport {
            pattern: pattern.to_string(),
            dry_run: false,
            deleted: keys,
        })
    }

    pub async fn clear_rate_limits(&self) -> Result<RateLimitReport, OpsError> {
        let mut patterns = Vec::with_capacity(RATE_LIMIT_PATTERNS.len());
        for pattern in RATE_LIMIT_PATTERNS {
            patterns.push(self.delete_matching(pattern).await?);
        }
        Ok(RateLimitReport { patterns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_total_sums_every_db() {
        let info = "# Keyspace\r\ndb0:keys=12,expires=3,avg_ttl=0\r\ndb2:keys=5,expires=0,avg_ttl=0\r\n";
        assert_eq!(keyspace_total(info), 17);
        assert_eq!(keyspace_total("# Keyspace\r\n"), 0);
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        assert!(matches!(check_pattern("  "), Err(OpsError::InvalidInput(_))));
        assert!(check_pattern("*login*").is_ok());
    }

    #[test]
    fn test_delete_report_render() {
        let report = DeleteReport {
            pattern: "*login*".into(),
            dry_run: false,
            deleted: vec!["rl:login:1.2.3.4".into()],
        };
        let text = report.render();
        assert!(text.contains("rl:login:1.2.3.4"));
        assert!(text.contains("1 chave(s) deletadas"));
    }

    #[test]
    fn test_preview_render_says_nothing_was_deleted() {
        let report = DeleteReport {
            pattern: "session:*".into(),
            dry_run: true,
            deleted: vec!["session:a".into(), "session:b".into()],
        };
        let text = report.render();
        assert!(text.contains("2 chave(s) encontradas"));
        assert!(!text.contains("deletadas"));
    }

    #[test]
    fn test_flush_report_counts_all_databases() {
        let text = FlushReport { keys_before: 17 }.render();
        assert!(text.contains("17 chave(s) removidas em todos os bancos"));
    }
}
