use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, TranslateError};
use crate::language::{LanguageCode, LanguageOption};

// Default values for optional oracle settings
fn default_google_endpoint() -> String {
    "https://translation.googleapis.com/language/translate/v2".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_TRANSLATE_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub translate: TranslateConfig,
    pub language: LanguageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Which oracle answers batch requests
    pub provider: OracleProvider,
    /// Translation endpoint URL speaking the `{texts, targetLanguage}` contract
    pub endpoint: String,
    /// Google Cloud Translation v2 endpoint (Google provider only)
    #[serde(default = "default_google_endpoint")]
    pub google_endpoint: String,
    /// Environment variable holding the Google API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Upper bound on strings per oracle request
    pub max_batch_size: usize,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Drop in-flight requests of superseded generations instead of
    /// letting them finish and fill the cache
    #[serde(default)]
    pub abort_superseded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleProvider {
    /// Endpoint: POST JSON batches to a translation route
    Endpoint,
    /// Google: call Google Cloud Translation v2 directly
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Language the UI strings are authored in
    pub source: LanguageCode,
    /// Language shown before the user picks one
    pub default: LanguageCode,
    /// Where the chosen language is remembered
    pub preference_file: PathBuf,
    /// Languages offered to the user
    pub supported: Vec<LanguageOption>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translate: TranslateConfig {
                provider: OracleProvider::Endpoint,
                endpoint: "http://localhost:3000/api/translate".to_string(),
                google_endpoint: default_google_endpoint(),
                api_key_env: default_api_key_env(),
                max_batch_size: 40, // safely under Google limits
                request_timeout_secs: default_request_timeout_secs(),
                abort_superseded: false,
            },
            language: LanguageConfig {
                source: LanguageCode::new("en"),
                default: LanguageCode::new("en"),
                preference_file: PathBuf::from(".boba/language.toml"),
                supported: LanguageOption::defaults(),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslateError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TranslateError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TranslateError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content)
            .map_err(|e| TranslateError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.translate.max_batch_size == 0 {
            return Err(TranslateError::Config(
                "translate.max_batch_size must be at least 1".to_string(),
            ));
        }

        if !self.language.is_supported(&self.language.source) {
            return Err(TranslateError::Config(format!(
                "Source language '{}' is not in language.supported",
                self.language.source
            )));
        }

        if !self.language.is_supported(&self.language.default) {
            return Err(TranslateError::Config(format!(
                "Default language '{}' is not in language.supported",
                self.language.default
            )));
        }

        Ok(())
    }
}

impl LanguageConfig {
    pub fn is_supported(&self, code: &LanguageCode) -> bool {
        self.supported.iter().any(|option| &option.code == code)
    }

    /// Look up a user-supplied code, rejecting ones not offered
    pub fn resolve(&self, code: &str) -> Result<LanguageCode> {
        let code = LanguageCode::new(code.trim());
        if self.is_supported(&code) {
            Ok(code)
        } else {
            let valid = self
                .supported
                .iter()
                .map(|option| option.code.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(TranslateError::UnsupportedLanguage(format!(
                "'{}' (valid: {})",
                code, valid
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.translate.max_batch_size, 40);
        assert_eq!(config.language.source.as_str(), "en");
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("boba.toml");

        let mut config = Config::default();
        config.translate.provider = OracleProvider::Google;
        config.translate.max_batch_size = 25;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.translate.provider, OracleProvider::Google);
        assert_eq!(loaded.translate.max_batch_size, 25);
        assert_eq!(loaded.language.supported.len(), 3);
    }

    #[test]
    fn test_optional_fields_default() {
        let content = r#"
[translate]
provider = "Endpoint"
endpoint = "http://kiosk.local/api/translate"
max_batch_size = 10

[language]
source = "en"
default = "es"
preference_file = "lang.toml"
supported = [
    { code = "en", label = "English" },
    { code = "es", label = "Español" },
]
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.translate.request_timeout_secs, 30);
        assert!(!config.translate.abort_superseded);
        assert_eq!(config.translate.api_key_env, "GOOGLE_TRANSLATE_API_KEY");
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.translate.max_batch_size = 0;
        assert!(matches!(config.validate(), Err(TranslateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_default_language() {
        let mut config = Config::default();
        config.language.default = LanguageCode::new("fr");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_language() {
        let config = Config::default();
        assert_eq!(config.language.resolve(" zh ").unwrap().as_str(), "zh");
        assert!(matches!(
            config.language.resolve("klingon"),
            Err(TranslateError::UnsupportedLanguage(_))
        ));
    }
}
