use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Upload cap for the `image` field (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PredictionConfig {
    pub common: core_config::Config,
    pub history: HistoryConfig,
    pub mongodb: MongoConfig,
    pub model: ModelConfig,
    pub upload: UploadConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBackend {
    MongoDb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// `http(s)://` URL, `file://` URL or filesystem path of the ONNX artifact.
    pub url: String,
    pub cache: ModelCachePolicy,
    pub preload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCachePolicy {
    /// Load once, share the handle across requests.
    Shared,
    /// Reload the artifact for every prediction.
    PerRequest,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
}

impl PredictionConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(PredictionConfig {
            common: common_config,
            history: HistoryConfig {
                backend: parse_setting(
                    "HISTORY_BACKEND",
                    &get_env("HISTORY_BACKEND", Some("mongodb"), is_prod)?,
                )?,
            },
            mongodb: MongoConfig {
                uri: Secret::new(get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017"),
                    is_prod,
                )?),
                database: get_env("MONGODB_DATABASE", Some("prediction_db"), is_prod)?,
                collection: get_env("MONGODB_COLLECTION", Some("predictions"), is_prod)?,
            },
            model: ModelConfig {
                url: get_env("MODEL_URL", Some("model/model.onnx"), is_prod)?,
                cache: parse_setting(
                    "MODEL_CACHE",
                    &get_env("MODEL_CACHE", Some("shared"), is_prod)?,
                )?,
                preload: parse_setting(
                    "MODEL_PRELOAD",
                    &get_env("MODEL_PRELOAD", Some("false"), is_prod)?,
                )?,
            },
            upload: UploadConfig {
                max_file_size: parse_setting(
                    "UPLOAD_MAX_FILE_SIZE",
                    &get_env(
                        "UPLOAD_MAX_FILE_SIZE",
                        Some(&DEFAULT_MAX_FILE_SIZE.to_string()),
                        is_prod,
                    )?,
                )?,
            },
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
        })
    }
}

impl std::str::FromStr for HistoryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(HistoryBackend::MongoDb),
            "memory" => Ok(HistoryBackend::Memory),
            _ => Err(format!("Invalid history backend: {}", s)),
        }
    }
}

impl std::str::FromStr for ModelCachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "shared" => Ok(ModelCachePolicy::Shared),
            "per_request" => Ok(ModelCachePolicy::PerRequest),
            _ => Err(format!("Invalid model cache policy: {}", s)),
        }
    }
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
    })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_history_backends() {
        assert_eq!("mongodb".parse::<HistoryBackend>(), Ok(HistoryBackend::MongoDb));
        assert_eq!("Memory".parse::<HistoryBackend>(), Ok(HistoryBackend::Memory));
        assert!("cassandra".parse::<HistoryBackend>().is_err());
    }

    #[test]
    fn parses_cache_policies() {
        assert_eq!("shared".parse::<ModelCachePolicy>(), Ok(ModelCachePolicy::Shared));
        assert_eq!("per-request".parse::<ModelCachePolicy>(), Ok(ModelCachePolicy::PerRequest));
        assert_eq!("PER_REQUEST".parse::<ModelCachePolicy>(), Ok(ModelCachePolicy::PerRequest));
        assert!("lru".parse::<ModelCachePolicy>().is_err());
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = parse_setting::<usize>("UPLOAD_MAX_FILE_SIZE", "lots").unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let size: usize = parse_setting("UPLOAD_MAX_FILE_SIZE", " 1048576 ").unwrap();
        assert_eq!(size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn missing_variable_uses_default_outside_production() {
        let value = get_env("PREDICTION_TEST_UNSET_VARIABLE", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");

        assert!(get_env("PREDICTION_TEST_UNSET_VARIABLE", Some("fallback"), true).is_err());
        assert!(get_env("PREDICTION_TEST_UNSET_VARIABLE", None, false).is_err());
    }
}
