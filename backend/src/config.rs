use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::telemetry::TelemetryConfig;

pub const DEFAULT_MODEL_PATH: &str = "models/iris_tree.json";
pub const DEFAULT_PAYLOAD_LIMIT: usize = 16 * 1024;
pub const DEFAULT_SERVICE_NAME: &str = "iris-classifier";

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub model_path: PathBuf,
    /// Per-worker cap on concurrent connections; actix default when unset.
    pub max_connections: Option<usize>,
    pub payload_limit: usize,
    pub telemetry: TelemetryConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let workers = parse(&non_empty, "WORKERS")?.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            return Err(ConfigError {
                key: "WORKERS",
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        Ok(ServerConfig {
            host: non_empty("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse(&non_empty, "PORT")?.unwrap_or(8080),
            workers,
            model_path: non_empty("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            max_connections: parse(&non_empty, "MAX_CONNECTIONS")?,
            payload_limit: parse(&non_empty, "PAYLOAD_LIMIT")?.unwrap_or(DEFAULT_PAYLOAD_LIMIT),
            telemetry: TelemetryConfig {
                service_name: non_empty("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
                otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
