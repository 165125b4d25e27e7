use std::collections::HashMap;
use tokio::sync::watch;

use crate::language::LanguageCode;

/// What one consumer currently shows. Derived from the shared cache and the
/// consumer's strings; only `is_translating` and `error` carry extra state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionState {
    pub language: LanguageCode,
    pub visible_translations: HashMap<String, String>,
    pub is_translating: bool,
    pub error: Option<String>,
}

impl ResolutionState {
    pub fn idle(language: LanguageCode) -> Self {
        Self {
            language,
            visible_translations: HashMap::new(),
            is_translating: false,
            error: None,
        }
    }

    /// Translation of `text`, or `text` itself when none is known
    pub fn display(&self, text: &str) -> String {
        self.visible_translations
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string())
    }
}

/// Read side of a consumer's resolution. Cheap to clone; every clone sees
/// the latest published state.
#[derive(Debug, Clone)]
pub struct ResolutionView {
    state: watch::Receiver<ResolutionState>,
}

impl ResolutionView {
    pub(crate) fn new(state: watch::Receiver<ResolutionState>) -> Self {
        Self { state }
    }

    /// Never blocks, never fails. Unknown strings come back unchanged.
    pub fn display(&self, text: &str) -> String {
        self.state.borrow().display(text)
    }

    pub fn language(&self) -> LanguageCode {
        self.state.borrow().language.clone()
    }

    pub fn is_translating(&self) -> bool {
        self.state.borrow().is_translating
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn snapshot(&self) -> ResolutionState {
        self.state.borrow().clone()
    }

    /// Wait until no fetch is outstanding for the live generation.
    /// Returns immediately when nothing is in flight.
    pub async fn settled(&self) -> ResolutionState {
        let mut state = self.state.clone();
        if let Ok(settled) = state.wait_for(|s| !s.is_translating).await {
            return settled.clone();
        }
        // Publisher gone: nothing else will ever change
        state.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(pairs: &[(&str, &str)]) -> ResolutionState {
        let mut state = ResolutionState::idle(LanguageCode::new("es"));
        state.visible_translations = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        state
    }

    #[test]
    fn test_display_falls_back_to_original() {
        let (_tx, rx) = watch::channel(state_with(&[("Login", "Iniciar sesión")]));
        let view = ResolutionView::new(rx);

        assert_eq!(view.display("Login"), "Iniciar sesión");
        assert_eq!(view.display("Checkout"), "Checkout");
        assert_eq!(view.display(""), "");
    }

    #[test]
    fn test_view_follows_published_state() {
        let (tx, rx) = watch::channel(ResolutionState::idle(LanguageCode::new("en")));
        let view = ResolutionView::new(rx);
        assert_eq!(view.display("Login"), "Login");

        tx.send_replace(state_with(&[("Login", "Iniciar sesión")]));
        assert_eq!(view.display("Login"), "Iniciar sesión");
        assert_eq!(view.language().as_str(), "es");
    }

    #[tokio::test]
    async fn test_settled_returns_once_idle() {
        let mut busy = state_with(&[]);
        busy.is_translating = true;
        let (tx, rx) = watch::channel(busy);
        let view = ResolutionView::new(rx);

        let waiter = tokio::spawn({
            let view = view.clone();
            async move { view.settled().await }
        });

        tx.send_modify(|s| {
            s.is_translating = false;
            s.error = Some("boom".to_string());
        });

        let settled = waiter.await.unwrap();
        assert!(!settled.is_translating);
        assert_eq!(settled.error.as_deref(), Some("boom"));
    }
}
