//! Environment-driven stream-service configuration (spec §6 Configuration).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamConfigError {
    #[error("environment variable '{0}' must be a valid {1}")]
    InvalidValue(&'static str, &'static str),
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub port: u16,
    pub ws_path: String,
    pub connection_buffer_size: usize,
    pub max_connections: usize,
    pub idle_timeout_secs: u64,
    pub message_bus_brokers: Vec<String>,
    pub group_id_stream: String,
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl StreamConfig {
    /// Loads configuration from the process environment, falling back to
    /// sane single-process defaults for local/dev runs.
    pub fn from_env() -> Result<Self, StreamConfigError> {
        let port = env_or("EVENT_STREAM_PORT", "8090")
            .parse::<u16>()
            .map_err(|_| StreamConfigError::InvalidValue("EVENT_STREAM_PORT", "u16"))?;

        let ws_path = env_or("EVENT_STREAM_WS_PATH", "/ws");

        let connection_buffer_size = env_or("EVENT_STREAM_BUFFER_SIZE", "256")
            .parse::<usize>()
            .map_err(|_| StreamConfigError::InvalidValue("EVENT_STREAM_BUFFER_SIZE", "usize"))?;

        let max_connections = env_or("EVENT_STREAM_MAX_CONNECTIONS", "1000")
            .parse::<usize>()
            .map_err(|_| StreamConfigError::InvalidValue("EVENT_STREAM_MAX_CONNECTIONS", "usize"))?;

        let idle_timeout_secs = env_or("EVENT_STREAM_IDLE_TIMEOUT_SECS", "60")
            .parse::<u64>()
            .map_err(|_| StreamConfigError::InvalidValue("EVENT_STREAM_IDLE_TIMEOUT_SECS", "u64"))?;

        let message_bus_brokers = env_or("MESSAGE_BUS_BROKERS", "memory")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let group_id_stream = env_or("GROUP_ID_STREAM", "chaingraph-stream");
        let log_level = env_or("LOG_LEVEL", "info");

        Ok(Self {
            port,
            ws_path,
            connection_buffer_size,
            max_connections,
            idle_timeout_secs,
            message_bus_brokers,
            group_id_stream,
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
        for key in ["EVENT_STREAM_PORT", "EVENT_STREAM_WS_PATH", "EVENT_STREAM_IDLE_TIMEOUT_SECS"] {
            std::env::remove_var(key);
        }
        let cfg = StreamConfig::from_env().unwrap();
        assert_eq!(cfg.port, 8090);
        assert_eq!(cfg.ws_path, "/ws");
        assert_eq!(cfg.idle_timeout_secs, 60);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("EVENT_STREAM_PORT", "not-a-port");
        let err = StreamConfig::from_env().unwrap_err();
        assert!(matches!(err, StreamConfigError::InvalidValue("EVENT_STREAM_PORT", _)));
        std::env::remove_var("EVENT_STREAM_PORT");
    }
}
