use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use imagegen_storage::S3Config;
use imagegen_worker::PoolConfig;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for running next to the desktop
/// shell. Provider credentials are not part of it; they live in the
/// `provider_configs` table.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    pub database_url: String,
    /// Root directory for generated images and thumbnails.
    pub storage_dir: PathBuf,
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Grace period for in-flight tasks at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Interval between `ping` events on progress streams (default: `15`).
    pub stream_heartbeat_secs: u64,
    /// Remote mirror, set only when bucket, region and both keys are given.
    pub s3: Option<S3Config>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            cors_origins: vec![
                "http://localhost:1420".into(),
                "http://localhost:5173".into(),
            ],
            request_timeout_secs: 60,
            database_url: "sqlite://data/imagegen.db?mode=rwc".into(),
            storage_dir: PathBuf::from("storage"),
            worker_count: 3,
            queue_capacity: 100,
            shutdown_timeout_secs: 30,
            stream_heartbeat_secs: 15,
            s3: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                        |
    /// |-------------------------|------------------------------------------------|
    /// | `HOST`                  | `0.0.0.0`                                      |
    /// | `PORT`                  | `8080`                                         |
    /// | `CORS_ORIGINS`          | `http://localhost:1420,http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`  | `60`                                           |
    /// | `DATABASE_URL`          | `sqlite://data/imagegen.db?mode=rwc`           |
    /// | `STORAGE_DIR`           | `storage`                                      |
    /// | `WORKER_COUNT`          | `3`                                            |
    /// | `QUEUE_CAPACITY`        | `100`                                          |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                                           |
    /// | `STREAM_HEARTBEAT_SECS` | `15`                                           |
    /// | `S3_*`                  | unset (no remote mirror)                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let cors_origins = match get("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        let s3 = match (
            get("S3_BUCKET"),
            get("S3_REGION"),
            get("S3_ACCESS_KEY_ID"),
            get("S3_SECRET_ACCESS_KEY"),
        ) {
            (Some(bucket), Some(region), Some(access_key_id), Some(secret_access_key)) => {
                Some(S3Config {
                    bucket,
                    region,
                    endpoint: get("S3_ENDPOINT"),
                    access_key_id,
                    secret_access_key,
                    public_domain: get("S3_PUBLIC_DOMAIN"),
                })
            }
            _ => None,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs: parse(&get, "REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            storage_dir: get("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            worker_count: parse(&get, "WORKER_COUNT", defaults.worker_count)?,
            queue_capacity: parse(&get, "QUEUE_CAPACITY", defaults.queue_capacity)?,
            shutdown_timeout_secs: parse(&get, "SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout_secs)?,
            stream_heartbeat_secs: parse(&get, "STREAM_HEARTBEAT_SECS", defaults.stream_heartbeat_secs)?,
            s3,
        })
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.worker_count,
            queue_capacity: self.queue_capacity,
            shutdown_grace: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn stream_heartbeat(&self) -> Duration {
        Duration::from_secs(self.stream_heartbeat_secs.max(1))
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
