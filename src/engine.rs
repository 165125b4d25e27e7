use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::language::{FilePreferenceStore, LanguageCode, LanguageOption, LanguagePreference};
use crate::translate::{FetchOrchestrator, OracleFactory, TranslationCache, TranslationHandle, TranslationOracle};

/// Everything one process needs to translate UI strings: a single shared
/// cache, the oracle, and the user's language preference.
pub struct TranslationEngine {
    config: Config,
    orchestrator: Arc<FetchOrchestrator>,
    preference: LanguagePreference,
}

impl TranslationEngine {
    /// Build the engine from configuration, restoring the saved language
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let oracle = OracleFactory::create_oracle(&config.translate, &config.language.source)?;
        let store = Arc::new(FilePreferenceStore::new(&config.language.preference_file));
        let preference = LanguagePreference::with_store(config.language.default.clone(), store);

        Ok(Self::assemble(config, oracle, preference))
    }

    /// Build the engine around an existing oracle and preference
    pub fn with_oracle(
        config: Config,
        oracle: Arc<dyn TranslationOracle>,
        preference: LanguagePreference,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, oracle, preference))
    }

    fn assemble(config: Config, oracle: Arc<dyn TranslationOracle>, preference: LanguagePreference) -> Self {
        let cache = Arc::new(TranslationCache::new(config.language.source.clone()));
        let orchestrator = Arc::new(
            FetchOrchestrator::new(Arc::clone(&cache), oracle, config.translate.max_batch_size)
                .with_abort_superseded(config.translate.abort_superseded),
        );

        info!(
            "Translation engine ready: source {}, language {}, batch size {}",
            cache.source_language(),
            preference.current(),
            config.translate.max_batch_size
        );

        Self {
            config,
            orchestrator,
            preference,
        }
    }

    /// Register a consumer for `texts`
    pub fn translation<I, S>(&self, texts: I) -> TranslationHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.orchestrator.consumer(self.preference.clone(), texts)
    }

    pub fn language(&self) -> LanguageCode {
        self.preference.current()
    }

    /// Switch to a supported language
    pub fn set_language(&self, code: &str) -> Result<LanguageCode> {
        let language = self.config.language.resolve(code)?;
        self.preference.set(language.clone());
        Ok(language)
    }

    pub fn languages(&self) -> &[LanguageOption] {
        &self.config.language.supported
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        self.orchestrator.cache()
    }

    /// Cached translation count per language
    pub fn cache_stats(&self) -> BTreeMap<LanguageCode, usize> {
        self.cache().stats()
    }
}
