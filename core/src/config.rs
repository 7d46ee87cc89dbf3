use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub http: HttpConfig,
    pub sink: SinkConfig,
    pub job_retry: JobRetryConfig,
    pub ledger: LedgerConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Settings applied to every OAI-PMH request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Re-running a failed harvest as a fresh job. Independent of the sink's own
/// per-request retries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// A harvestable OAI-PMH source. `name` is the single-flight key in the job ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Target {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub set: Option<String>,
    #[serde(default)]
    pub metadata_prefix: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub datasource: String,
    #[serde(default)]
    pub filter: FilterKind,
    #[serde(default)]
    pub granularity: Granularity,
}

impl Target {
    /// Basic-auth credentials, when the target declares them.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}

/// Record classifier dialect used for a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    Default,
    Preservation5,
    Preservation7,
    DrArchive,
}

/// Date-stamp granularity the source supports for `from`/`until`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    #[default]
    Seconds,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Load default configuration
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // Layer on config file if it exists
        if Path::new("harvester.toml").exists() {
            builder = builder.add_source(File::with_name("harvester"));
        }

        // Layer on environment variables (HARVESTER__ prefix)
        builder = builder.add_source(
            Environment::with_prefix("HARVESTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Config = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink.base_url.is_empty() {
            return Err(ConfigError::Message("sink.base_url is required".into()));
        }

        if self.job_retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "job_retry.max_attempts must be greater than 0".into(),
            ));
        }

        if self.ledger.history_capacity == 0 {
            return Err(ConfigError::Message(
                "ledger.history_capacity must be greater than 0".into(),
            ));
        }

        if self.http.connect_timeout_secs == 0 || self.http.read_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "http timeouts must be greater than 0".into(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() || target.base_url.is_empty() || target.datasource.is_empty() {
                return Err(ConfigError::Message(format!(
                    "target '{}' needs a name, base_url and datasource",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
            if target.username.is_some() != target.password.is_some() {
                return Err(ConfigError::Message(format!(
                    "target '{}' must set both username and password",
                    target.name
                )));
            }
        }

        Ok(())
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                connect_timeout_secs: 10,
                read_timeout_secs: 120,
                user_agent: concat!("oai-harvester/", env!("CARGO_PKG_VERSION")).to_string(),
            },
            sink: SinkConfig {
                base_url: "http://localhost:9072/storage/v1".to_string(),
                request_timeout_secs: 30,
                max_retries: 3,
                retry_base_delay_ms: 500,
            },
            job_retry: JobRetryConfig {
                max_attempts: 1,
                base_delay_ms: 30_000,
            },
            ledger: LedgerConfig {
                history_capacity: 256,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
                metrics_enabled: false,
                metrics_port: 9090,
            },
            targets: Vec::new(),
        }
    }
}
