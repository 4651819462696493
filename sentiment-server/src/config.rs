//! Start-up configuration read from the environment

use anyhow::{Context, Result};
use sentiment_core::{DeviceChoice, ModelConfig, ServiceConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub model: ModelConfig,
    pub service: ServiceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
            model: ModelConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their
    /// defaults; set but unparseable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(model_id) = lookup("SENTIMENT_MODEL") {
            config.model.model_id = model_id;
        }
        if let Some(revision) = lookup("SENTIMENT_REVISION") {
            config.model.revision = revision;
        }
        if let Some(device) = lookup("SENTIMENT_DEVICE") {
            config.model.device = DeviceChoice::from_str(&device)?;
        }
        if let Some(max_length) = parsed::<usize>(&lookup, "SENTIMENT_MAX_LENGTH")? {
            config.model.max_length = Some(max_length);
        }
        if let Some(host) = lookup("SENTIMENT_HOST") {
            config.host = host;
        }
        if let Some(port) = parsed::<u16>(&lookup, "SENTIMENT_PORT")? {
            config.port = port;
        }
        if let Some(dir) = lookup("SENTIMENT_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(n) = parsed::<usize>(&lookup, "SENTIMENT_MAX_CONCURRENCY")? {
            config.service.max_concurrency = n;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "SENTIMENT_REQUEST_TIMEOUT_SECS")? {
            config.service.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.model.model_id, sentiment_core::DEFAULT_MODEL_ID);
        assert_eq!(config.model.revision, "main");
        assert_eq!(config.model.device, DeviceChoice::Auto);
        assert_eq!(config.model.max_length, None);
        assert_eq!(config.service.request_timeout, Duration::from_secs(30));
        assert_eq!(config.static_dir, PathBuf::from("static"));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SENTIMENT_MODEL", "/models/imdb"),
            ("SENTIMENT_DEVICE", "cpu"),
            ("SENTIMENT_MAX_LENGTH", "128"),
            ("SENTIMENT_PORT", "9090"),
            ("SENTIMENT_HOST", "127.0.0.1"),
            ("SENTIMENT_MAX_CONCURRENCY", "3"),
            ("SENTIMENT_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.model.model_id, "/models/imdb");
        assert_eq!(config.model.device, DeviceChoice::Cpu);
        assert_eq!(config.model.max_length, Some(128));
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
        assert_eq!(config.service.max_concurrency, 3);
        assert_eq!(config.service.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = ServerConfig::from_lookup(lookup(&[("SENTIMENT_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("SENTIMENT_PORT"));

        assert!(ServerConfig::from_lookup(lookup(&[("SENTIMENT_DEVICE", "tpu")])).is_err());
    }
}
