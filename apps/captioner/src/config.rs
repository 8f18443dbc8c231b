use ai::{ComputeDevice, GatewayError};
use caption_pipeline::MoondreamConfig;
use std::path::PathBuf;

pub const RESOURCES_DIR_VAR: &str = "CAPTIONER_RESOURCES_DIR";
pub const MODEL_URL_VAR: &str = "CAPTIONER_MODEL_URL";
pub const DEVICE_VAR: &str = "CAPTIONER_DEVICE";
pub const LOG_DIR_VAR: &str = "CAPTIONER_LOG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is set but empty")]
    Empty { var: &'static str },
    #[error("invalid {var}: {source}")]
    InvalidDevice {
        var: &'static str,
        #[source]
        source: GatewayError,
    },
    #[error("invalid {var} {value:?}: {reason}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionerConfig {
    pub resources_dir: PathBuf,
    pub model_url: String,
    pub device: ComputeDevice,
    pub log_dir: Option<PathBuf>,
}

impl CaptionerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &'static str| match lookup(var) {
            Some(v) if v.trim().is_empty() => Err(ConfigError::Empty { var }),
            Some(v) => Ok(Some(v.trim().to_string())),
            None => Ok(None),
        };

        let defaults = MoondreamConfig::default();

        let resources_dir = non_empty(RESOURCES_DIR_VAR)?
            .map(PathBuf::from)
            .unwrap_or(defaults.resources_dir);

        let model_url = match non_empty(MODEL_URL_VAR)? {
            Some(value) => {
                let url = reqwest::Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
                    var: MODEL_URL_VAR,
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::InvalidUrl {
                        var: MODEL_URL_VAR,
                        value,
                        reason: "expected an http(s) url".to_string(),
                    });
                }
                value.trim_end_matches('/').to_string()
            }
            None => defaults.download_url,
        };

        let device = match non_empty(DEVICE_VAR)? {
            Some(value) => ComputeDevice::parse(&value).map_err(|source| {
                ConfigError::InvalidDevice {
                    var: DEVICE_VAR,
                    source,
                }
            })?,
            None => ComputeDevice::preferred(),
        };

        let log_dir = non_empty(LOG_DIR_VAR)?.map(PathBuf::from);

        Ok(Self {
            resources_dir,
            model_url,
            device,
            log_dir,
        })
    }

    pub fn moondream(&self) -> MoondreamConfig {
        MoondreamConfig {
            resources_dir: self.resources_dir.clone(),
            download_url: self.model_url.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CaptionerConfig, ConfigError, DEVICE_VAR, LOG_DIR_VAR, MODEL_URL_VAR};
    use ai::ComputeDevice;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config(vars: &[(&str, &str)]) -> Result<CaptionerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CaptionerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.resources_dir, PathBuf::from("resources"));
        assert_eq!(config.model_url, "https://huggingface.co");
        assert_eq!(config.device, ComputeDevice::preferred());
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CAPTIONER_RESOURCES_DIR", "/tmp/models"),
            (MODEL_URL_VAR, "http://localhost:8080/"),
            (DEVICE_VAR, "CPU"),
            (LOG_DIR_VAR, "/tmp/logs"),
        ])
        .unwrap();
        assert_eq!(config.resources_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.model_url, "http://localhost:8080");
        assert_eq!(config.device, ComputeDevice::Cpu);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));

        let moondream = config.moondream();
        assert_eq!(moondream.download_url, "http://localhost:8080");
        assert_eq!(moondream.resources_dir, PathBuf::from("/tmp/models"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[(DEVICE_VAR, "tpu")]),
            Err(ConfigError::InvalidDevice { .. })
        ));
        assert!(matches!(
            config(&[(MODEL_URL_VAR, "not a url")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config(&[(MODEL_URL_VAR, "ftp://example.com")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config(&[(LOG_DIR_VAR, "  ")]),
            Err(ConfigError::Empty { var: LOG_DIR_VAR })
        ));
    }
}
