use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid { name: &'static str, expected: &'static str, value: String },
}

/// Process configuration, read once at startup from the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub port: u16,
    /// Extra CORS origin for a separately hosted frontend.
    pub frontend_url: Option<String>,
    /// Snapshot directory for the in-memory store.
    pub data_dir: Option<PathBuf>,
    pub enable_hsts: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads variables through `get`.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| get(name).filter(|v| !v.trim().is_empty());
        fn parse<T: std::str::FromStr>(
            name: &'static str,
            expected: &'static str,
            raw: Option<String>,
            default: T,
        ) -> Result<T, ConfigError> {
            match raw {
                None => Ok(default),
                Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, expected, value }),
            }
        }

        Ok(Self {
            // DB is the older name for the connection string
            database_url: non_empty("DATABASE_URL").or_else(|| non_empty("DB")),
            db_max_connections: parse("DB_MAX_CONNECTIONS", "positive integer", non_empty("DB_MAX_CONNECTIONS"), 5)?,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("PORT", "port number", non_empty("PORT"), 8080)?,
            frontend_url: non_empty("FRONTEND_URL"),
            data_dir: non_empty("BOARD_DATA_DIR").map(PathBuf::from),
            enable_hsts: non_empty("ENABLE_HSTS").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
        })
    }
}
