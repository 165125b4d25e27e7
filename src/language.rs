use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, TranslateError};

/// Opaque identifier for a display language, e.g. `es`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// A language offered in the language picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageOption {
    pub code: LanguageCode,
    pub label: String,
}

impl LanguageOption {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            code: LanguageCode::new(code),
            label: label.to_string(),
        }
    }

    /// The kiosk's stock language list
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("en", "English"),
            Self::new("es", "Español"),
            Self::new("zh", "中文"),
        ]
    }
}

/// Somewhere the chosen language survives restarts
pub trait PreferenceStore: Send + Sync {
    /// Read the stored language, `None` when nothing was saved yet
    fn load(&self) -> Result<Option<LanguageCode>>;

    /// Remember the language
    fn save(&self, language: &LanguageCode) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PreferenceFile {
    language: LanguageCode,
}

/// Stores the preference as a one-key TOML file
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Option<LanguageCode>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let file: PreferenceFile = toml::from_str(&content)?;

        Ok(Some(file.language))
    }

    fn save(&self, language: &LanguageCode) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string(&PreferenceFile {
            language: language.clone(),
        })
        .map_err(|e| TranslateError::Preference(format!("Failed to serialize preference: {}", e)))?;

        std::fs::write(&self.path, content)?;
        debug!("Saved language preference {} to {}", language, self.path.display());
        Ok(())
    }
}

/// Reactive holder of the active display language.
///
/// Cloning shares the same underlying value: a `set` through any clone is
/// observed by every `subscribe`r.
#[derive(Clone)]
pub struct LanguagePreference {
    sender: Arc<watch::Sender<LanguageCode>>,
    store: Option<Arc<dyn PreferenceStore>>,
}

impl LanguagePreference {
    /// In-memory preference, nothing is persisted
    pub fn new(initial: LanguageCode) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
            store: None,
        }
    }

    /// Preference restored from and written back to `store`.
    /// A missing or unreadable stored value falls back to `default`.
    pub fn with_store(default: LanguageCode, store: Arc<dyn PreferenceStore>) -> Self {
        let initial = match store.load() {
            Ok(Some(language)) => {
                info!("Restored language preference: {}", language);
                language
            }
            Ok(None) => default,
            Err(e) => {
                warn!("Failed to load language preference, using {}: {}", default, e);
                default
            }
        };

        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
            store: Some(store),
        }
    }

    pub fn current(&self) -> LanguageCode {
        self.sender.borrow().clone()
    }

    /// Switch language. Subscribers are notified only on an actual change.
    pub fn set(&self, language: LanguageCode) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == language {
                false
            } else {
                *current = language.clone();
                true
            }
        });

        if !changed {
            return;
        }

        info!("Language switched to {}", language);

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&language) {
                warn!("Failed to persist language preference: {}", e);
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LanguageCode> {
        self.sender.subscribe()
    }
}

impl fmt::Debug for LanguagePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguagePreference")
            .field("current", &self.current())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    #[test]
    fn test_set_notifies_only_on_change() {
        let preference = LanguagePreference::new(LanguageCode::new("en"));
        let mut rx = preference.subscribe();

        preference.set(LanguageCode::new("en"));
        assert!(!rx.has_changed().unwrap());

        preference.set(LanguageCode::new("es"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_str(), "es");
        assert_eq!(preference.current().as_str(), "es");
    }

    #[test]
    fn test_clones_share_value() {
        let preference = LanguagePreference::new(LanguageCode::new("en"));
        let other = preference.clone();
        other.set(LanguageCode::new("zh"));
        assert_eq!(preference.current().as_str(), "zh");
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("prefs").child("language.toml");
        let store = FilePreferenceStore::new(file.path());

        assert!(store.load().unwrap().is_none());
        store.save(&LanguageCode::new("es")).unwrap();

        file.assert("language = \"es\"\n");
        assert_eq!(store.load().unwrap(), Some(LanguageCode::new("es")));
    }

    #[test]
    fn test_preference_restores_and_persists() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("language.toml");
        file.write_str("language = \"zh\"\n").unwrap();

        let store: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(file.path()));
        let preference = LanguagePreference::with_store(LanguageCode::new("en"), store.clone());
        assert_eq!(preference.current().as_str(), "zh");

        preference.set(LanguageCode::new("es"));
        assert_eq!(store.load().unwrap(), Some(LanguageCode::new("es")));
    }

    #[test]
    fn test_corrupt_preference_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("language.toml");
        file.write_str("not = [valid").unwrap();

        let store = FilePreferenceStore::new(file.path());
        assert!(matches!(store.load(), Err(TranslateError::Toml(_))));

        let store: Arc<dyn PreferenceStore> = Arc::new(store);
        let preference = LanguagePreference::with_store(LanguageCode::new("en"), store);
        assert_eq!(preference.current().as_str(), "en");
    }
}
