// On-demand UI string translation
//
// This module resolves a changing set of source strings into the user's
// display language:
// - Batch: splits missing strings into oracle-sized requests
// - Cache: shared, append-only store of resolved translations
// - Orchestrator: per-consumer generations, batched fetches, merging
// - View: synchronous `display()` projection with fallback to the original
// - Endpoint / Google: oracle implementations over HTTP

pub mod batch;
pub mod cache;
pub mod endpoint;
pub mod google;
pub mod orchestrator;
pub mod view;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use cache::TranslationCache;
pub use orchestrator::{FetchOrchestrator, TranslationHandle};
pub use view::{ResolutionState, ResolutionView};

use crate::config::{OracleProvider, TranslateConfig};
use crate::error::{Result, TranslateError};
use crate::language::LanguageCode;

/// Remote translation service answering one batch at a time
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationOracle: Send + Sync {
    /// Translate `texts` into `target`.
    ///
    /// The returned map is keyed by original text. Texts left out of the
    /// map are unresolved, which is not an error.
    async fn translate_batch(
        &self,
        texts: &[String],
        target: &LanguageCode,
    ) -> Result<HashMap<String, String>>;
}

/// Factory for creating oracle instances
pub struct OracleFactory;

impl OracleFactory {
    /// Create the oracle selected by `config.provider`
    pub fn create_oracle(
        config: &TranslateConfig,
        source: &LanguageCode,
    ) -> Result<Arc<dyn TranslationOracle>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TranslateError::Config(format!("Failed to create HTTP client: {}", e)))?;

        match config.provider {
            OracleProvider::Endpoint => Ok(Arc::new(endpoint::EndpointOracle::new(
                client,
                config.endpoint.clone(),
            ))),
            OracleProvider::Google => {
                let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                    TranslateError::Config(format!(
                        "Missing Google Translate API key. Set {}.",
                        config.api_key_env
                    ))
                })?;
                Ok(Arc::new(
                    google::GoogleTranslateOracle::new(client, config.google_endpoint.clone(), api_key)
                        .with_source_language(source),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_factory_creates_endpoint_oracle() {
        let config = Config::default();
        assert!(OracleFactory::create_oracle(&config.translate, &config.language.source).is_ok());
    }

    #[test]
    fn test_factory_requires_google_key() {
        let mut config = Config::default();
        config.translate.provider = OracleProvider::Google;
        config.translate.api_key_env = "BOBA_TRANSLATE_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        match OracleFactory::create_oracle(&config.translate, &config.language.source) {
            Err(TranslateError::Config(message)) => {
                assert!(message.contains("BOBA_TRANSLATE_TEST_KEY_THAT_IS_NEVER_SET"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected missing key error"),
        }
    }
}
