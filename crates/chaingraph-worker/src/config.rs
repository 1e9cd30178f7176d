//! Environment-driven worker configuration (spec §6 Configuration).
//!
//! Follows the same typed-config-with-its-own-error-enum shape the teacher
//! uses for `ServerConfig`, but sources from environment variables rather
//! than a TOML file, since the worker is meant to run as one process among
//! many identical replicas in a pool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerConfigError {
    #[error("environment variable '{0}' must be a valid {1}")]
    InvalidValue(&'static str, &'static str),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub worker_concurrency: usize,
    pub worker_memory_limit_mb: Option<u64>,
    pub worker_timeout_ms: u64,
    pub message_bus_brokers: Vec<String>,
    pub message_bus_client_id: String,
    pub group_id_worker: String,
    pub database_url: String,
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl WorkerConfig {
    /// Loads configuration from the process environment, falling back to
    /// sane single-process defaults for anything unset so the worker binary
    /// still starts in a local/dev environment.
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        let worker_id = match std::env::var("WORKER_ID") {
            Ok(v) => v,
            Err(_) => format!("worker-{}", uuid::Uuid::new_v4()),
        };

        let worker_concurrency = env_or("WORKER_CONCURRENCY", "4")
            .parse::<usize>()
            .map_err(|_| WorkerConfigError::InvalidValue("WORKER_CONCURRENCY", "usize"))?;

        let worker_memory_limit_mb = match std::env::var("WORKER_MEMORY_LIMIT_MB") {
            Ok(v) => Some(
                v.parse::<u64>()
                    .map_err(|_| WorkerConfigError::InvalidValue("WORKER_MEMORY_LIMIT_MB", "u64"))?,
            ),
            Err(_) => None,
        };

        let worker_timeout_ms = env_or("WORKER_TIMEOUT_MS", "30000")
            .parse::<u64>()
            .map_err(|_| WorkerConfigError::InvalidValue("WORKER_TIMEOUT_MS", "u64"))?;

        let message_bus_brokers = env_or("MESSAGE_BUS_BROKERS", "memory")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let message_bus_client_id = env_or("MESSAGE_BUS_CLIENT_ID", "chaingraph-worker");
        let group_id_worker = env_or("GROUP_ID_WORKER", "chaingraph-workers");
        let database_url = env_or("DATABASE_URL", "sqlite::memory:");
        let log_level = env_or("LOG_LEVEL", "info");

        Ok(Self {
            worker_id,
            worker_concurrency,
            worker_memory_limit_mb,
            worker_timeout_ms,
            message_bus_brokers,
            message_bus_client_id,
            group_id_worker,
            database_url,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in ["WORKER_ID", "WORKER_CONCURRENCY", "WORKER_TIMEOUT_MS", "DATABASE_URL"] {
            std::env::remove_var(key);
        }
        let cfg = WorkerConfig::from_env().unwrap();
        assert_eq!(cfg.worker_concurrency, 4);
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert!(cfg.worker_id.starts_with("worker-"));
    }

    #[test]
    fn invalid_concurrency_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("WORKER_CONCURRENCY", "not-a-number");
        let err = WorkerConfig::from_env().unwrap_err();
        assert!(matches!(err, WorkerConfigError::InvalidValue("WORKER_CONCURRENCY", _)));
        std::env::remove_var("WORKER_CONCURRENCY");
    }

    #[test]
    fn broker_list_is_split_on_comma() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MESSAGE_BUS_BROKERS", "host-a:9092, host-b:9092");
        let cfg = WorkerConfig::from_env().unwrap();
        assert_eq!(cfg.message_bus_brokers, vec!["host-a:9092".to_string(), "host-b:9092".to_string()]);
        std::env::remove_var("MESSAGE_BUS_BROKERS");
    }
}
