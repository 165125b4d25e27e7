use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::language::LanguageCode;

/// Process-wide store of resolved translations, keyed by language then
/// source text.
///
/// Entries are only ever added. Once `cache[lang][s]` holds a value it is
/// never removed or replaced. The source language is never stored: it
/// resolves to the text itself.
#[derive(Debug)]
pub struct TranslationCache {
    source_language: LanguageCode,
    entries: RwLock<HashMap<LanguageCode, HashMap<String, String>>>,
}

impl TranslationCache {
    pub fn new(source_language: LanguageCode) -> Self {
        Self {
            source_language,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn source_language(&self) -> &LanguageCode {
        &self.source_language
    }

    pub fn is_source(&self, language: &LanguageCode) -> bool {
        *language == self.source_language
    }

    pub fn get(&self, language: &LanguageCode, text: &str) -> Option<String> {
        if self.is_source(language) {
            return Some(text.to_string());
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(language)?.get(text).cloned()
    }

    /// Translations present for `texts`; absent keys are left out
    pub fn get_many<'a, I>(&self, language: &LanguageCode, texts: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.is_source(language) {
            return texts.into_iter().map(|t| (t.clone(), t.clone())).collect();
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let Some(resolved) = entries.get(language) else {
            return HashMap::new();
        };

        texts
            .into_iter()
            .filter_map(|t| resolved.get(t).map(|v| (t.clone(), v.clone())))
            .collect()
    }

    /// Requested texts that have no entry for `language`
    pub fn missing<'a, I>(&self, language: &LanguageCode, texts: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.is_source(language) {
            return BTreeSet::new();
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let resolved = entries.get(language);

        texts
            .into_iter()
            .filter(|t| !resolved.is_some_and(|r| r.contains_key(*t)))
            .cloned()
            .collect()
    }

    /// Add resolved translations. Existing entries keep their value.
    /// Returns how many entries were new.
    pub fn merge(&self, language: &LanguageCode, translations: HashMap<String, String>) -> usize {
        if self.is_source(language) || translations.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let resolved = entries.entry(language.clone()).or_default();

        let mut added = 0;
        for (text, translation) in translations {
            if text.is_empty() {
                continue;
            }
            if let std::collections::hash_map::Entry::Vacant(slot) = resolved.entry(text) {
                slot.insert(translation);
                added += 1;
            }
        }

        debug!("Merged {} new {} translations ({} total)", added, language, resolved.len());
        added
    }

    /// Number of cached entries for one language
    pub fn len(&self, language: &LanguageCode) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(language).map_or(0, HashMap::len)
    }

    /// Entry counts for every language seen so far
    pub fn stats(&self) -> BTreeMap<LanguageCode, usize> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(language, resolved)| (language.clone(), resolved.len()))
            .collect()
    }
}
