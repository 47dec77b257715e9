use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "plataforma_ead";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASSWORD: &str = "postgres";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Where the platform database lives.
///
/// Older tooling exported a single `DATABASE_URL`; the payment scripts used the
/// discrete `DB_*` variables. Both are accepted, the URL wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Url(String),
    Params {
        host: String,
        port: u16,
        name: String,
        user: String,
        password: String,
    },
}

impl DatabaseTarget {
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        match self {
            DatabaseTarget::Url(url) => Ok(PgConnectOptions::from_str(url)?),
            DatabaseTarget::Params {
                host,
                port,
                name,
                user,
                password,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(name)
                .username(user)
                .password(password)),
        }
    }

    /// Printable form without credentials.
    pub fn redacted(&self) -> String {
        match self {
            DatabaseTarget::Url(raw) => redact_url(raw),
            DatabaseTarget::Params {
                host,
                port,
                name,
                user,
                ..
            } => format!("postgres://{}:***@{}:{}/{}", user, host, port, name),
        }
    }
}

/// `raw` with any password replaced by `***`.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseTarget,
    pub redis_url: String,
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub smoke_email: Option<String>,
    pub smoke_password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database: {}", config.database.redacted());
        tracing::debug!("Redis URL: {}", redact_url(&config.redis_url));
        tracing::debug!("API base URL: {}", config.api_base_url);

        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database = match non_empty("DB_URL").or_else(|| non_empty("DATABASE_URL")) {
            Some(url) => {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                }
                DatabaseTarget::Url(url)
            }
            None => DatabaseTarget::Params {
                host: non_empty("DB_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
                port: match non_empty("DB_PORT") {
                    Some(port) => port.trim().parse().map_err(|_| {
                        anyhow::anyhow!("DB_PORT must be a valid number between 1-65535")
                    })?,
                    None => DEFAULT_DB_PORT,
                },
                name: non_empty("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
                user: non_empty("DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
                password: lookup("DB_PASSWORD")
                    .unwrap_or_else(|| DEFAULT_DB_PASSWORD.to_string()),
            },
        };

        let redis_url = non_empty("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
        if !redis_url.starts_with("redis://") && !redis_url.starts_with("rediss://") {
            anyhow::bail!("REDIS_URL must start with redis:// or rediss://");
        }

        let api_base_url =
            non_empty("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            anyhow::bail!("API_BASE_URL must start with http:// or https://");
        }
        let api_base_url = api_base_url.trim_end_matches('/').to_string();

        let http_timeout = match non_empty("HTTP_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a whole number"))?,
            ),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            database,
            redis_url,
            api_base_url,
            http_timeout,
            smoke_email: non_empty("SMOKE_EMAIL"),
            smoke_password: non_empty("SMOKE_PASSWORD"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_use_discrete_params() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(
            config.database,
            DatabaseTarget::Params {
                host: "localhost".into(),
                port: 5432,
                name: "plataforma_ead".into(),
                user: "postgres".into(),
                password: "postgres".into(),
            }
        );
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(config.smoke_email.is_none());
    }

    #[test]
    fn test_database_url_wins_over_params() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://u:p@db:5432/ead"),
            ("DB_HOST", "ignored"),
        ]))
        .unwrap();
        assert_eq!(
            config.database,
            DatabaseTarget::Url("postgres://u:p@db:5432/ead".into())
        );
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        let err = Config::from_lookup(lookup_from(&[("DB_URL", "mysql://x")])).unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Config::from_lookup(lookup_from(&[("DB_PORT", "abc")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("DB_PORT", "70000")])).is_err());
    }

    #[test]
    fn test_api_base_url_trailing_slash_trimmed() {
        let config =
            Config::from_lookup(lookup_from(&[("API_BASE_URL", "http://127.0.0.1:3000/")]))
                .unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_blank_smoke_credentials_are_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("SMOKE_EMAIL", "  "),
            ("SMOKE_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert!(config.smoke_email.is_none());
        assert_eq!(config.smoke_password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_redacted_hides_password() {
        let url = DatabaseTarget::Url("postgres://admin:hunter2@db:5432/ead".into());
        let shown = url.redacted();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("admin"));

        let params = DatabaseTarget::Params {
            host: "h".into(),
            port: 1,
            name: "n".into(),
            user: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!params.redacted().contains("hunter2"));
    }

    #[test]
    fn test_redis_url_password_is_redacted() {
        let shown = redact_url("redis://:s3cret@cache:6379/0");
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("cache:6379"));
        assert_eq!(redact_url("redis://localhost:6379"), "redis://localhost:6379");
    }
}
