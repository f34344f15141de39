use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::GolfCoachError;

/// Environment variable holding the Anthropic API key. Never read from
/// `golf-coach.toml`.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GolfCoachConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub images: ImageConfig,
    pub vision: VisionConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://golf_coach.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Comma-separated list of origins allowed by CORS.
    pub cors_origins: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: "http://localhost:3000,http://localhost:5173".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImageConfig {
    pub max_size_mb: u64,
    pub allowed_formats: Vec<String>,
    pub thumbnail_size: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 5,
            allowed_formats: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/jpg".to_string(),
            ],
            thumbnail_size: 200,
        }
    }
}

impl ImageConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 2048,
            timeout_seconds: 120,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub default_limit: u32,
    pub max_limit: u32,
    /// Number of previous swings fed into the analysis prompt.
    pub prompt_context: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 100,
            prompt_context: 3,
        }
    }
}

impl GolfCoachConfig {
    /// Load configuration from an optional TOML file, then layer
    /// `GOLF_COACH__SECTION__KEY` environment variables on top.
    pub fn load(path: &str) -> Result<Self, GolfCoachError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("GOLF_COACH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = GolfCoachConfig::load("does-not-exist.toml").expect("defaults should load");
        assert_eq!(config.images.max_size_mb, 5);
        assert_eq!(config.history.prompt_context, 3);
        assert_eq!(config.vision.max_tokens, 2048);
        assert!(config.database.url.starts_with("sqlite:"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(
            file,
            "[http]\nport = 9100\ncors_origins = \"https://a.example, https://b.example\"\n\n[images]\nmax_size_mb = 8"
        )
        .unwrap();

        let config = GolfCoachConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.http.port, 9100);
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.images.max_size_mb, 8);
        assert_eq!(config.images.allowed_formats.len(), 3);
        assert_eq!(
            config.http.cors_origin_list(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        writeln!(file, "[http]\nport = \"not a number\"").unwrap();

        let err = GolfCoachConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, GolfCoachError::Config(_)));
        assert!(err.to_string().starts_with("Config error:"));
    }

    #[test]
    fn test_cors_origin_list_skips_blanks() {
        let http = HttpConfig {
            cors_origins: "http://localhost:3000,, ".to_string(),
            ..HttpConfig::default()
        };
        assert_eq!(http.cors_origin_list(), vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_max_size_bytes() {
        let images = ImageConfig::default();
        assert_eq!(images.max_size_bytes(), 5 * 1024 * 1024);
    }
}
