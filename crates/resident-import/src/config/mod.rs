use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Which import queue implementation is wired at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Jobs are handed to a single background consumer.
    Background,
    /// Jobs run to completion inside `submit`; used for isolated testing.
    Inline,
}

impl QueueMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "background" | "async" => Ok(Self::Background),
            "inline" | "sync" => Ok(Self::Inline),
            _ => Err(ConfigError::InvalidQueueMode(value.to_string())),
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub import: ImportConfig,
    pub database_path: Option<PathBuf>,
    pub status_store: Option<StatusStoreConfig>,
    pub artifact_storage: Option<ArtifactStorageConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let queue_mode = match non_empty_var("IMPORT_QUEUE_MODE") {
            Some(value) => QueueMode::parse(&value)?,
            None if environment == AppEnvironment::Test => QueueMode::Inline,
            None => QueueMode::Background,
        };

        let import = ImportConfig {
            max_rows: positive_var("IMPORT_MAX_ROWS", DEFAULT_MAX_ROWS)?,
            progress_interval: positive_var("IMPORT_PROGRESS_INTERVAL", DEFAULT_PROGRESS_INTERVAL)?,
            work_dir: non_empty_var("IMPORT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tmp")),
            upload_dir: non_empty_var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("resident-uploads")),
            upload_max_bytes: positive_var("UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES)?,
            queue_mode,
        };

        let status_store = non_empty_var("REDIS_URL").map(|url| StatusStoreConfig { url });

        let artifact_storage = match non_empty_var("ARTIFACT_BUCKET") {
            Some(bucket) => Some(ArtifactStorageConfig {
                bucket,
                region: non_empty_var("ARTIFACT_REGION"),
                endpoint: non_empty_var("ARTIFACT_ENDPOINT"),
                url_ttl: Duration::from_secs(positive_var(
                    "ARTIFACT_URL_TTL_SECS",
                    DEFAULT_URL_TTL_SECS,
                )?),
            }),
            None => None,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            import,
            database_path: non_empty_var("DATABASE_PATH").map(PathBuf::from),
            status_store,
            artifact_storage,
        })
    }
}

const DEFAULT_MAX_ROWS: u64 = 5_000;
const DEFAULT_PROGRESS_INTERVAL: u64 = 50;
const DEFAULT_UPLOAD_MAX_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_URL_TTL_SECS: u64 = 60 * 60;

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn positive_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match non_empty_var(name) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidNumber {
                variable: name,
                value: raw,
            }),
        },
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Limits and locations used by the import pipeline.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Maximum number of data rows a preview evaluates.
    pub max_rows: u64,
    /// Rows between progress callbacks during an import.
    pub progress_interval: u64,
    /// Directory receiving local failure artifacts.
    pub work_dir: PathBuf,
    /// Directory receiving spooled uploads.
    pub upload_dir: PathBuf,
    pub upload_max_bytes: u64,
    pub queue_mode: QueueMode,
}

/// Connection settings for the durable job status store.
#[derive(Debug, Clone)]
pub struct StatusStoreConfig {
    pub url: String,
}

/// Object storage receiving failure artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStorageConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// S3-compatible endpoint override.
    pub endpoint: Option<String>,
    /// Lifetime of signed retrieval URLs.
    pub url_ttl: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{variable} must be a positive integer, got '{value}'")]
    InvalidNumber { variable: &'static str, value: String },
    #[error("IMPORT_QUEUE_MODE must be 'background' or 'inline', got '{0}'")]
    InvalidQueueMode(String),
}
