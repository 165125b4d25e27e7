use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::{Result, TranslateError};
use crate::language::LanguageCode;
use super::TranslationOracle;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    texts: &'a [String],
    target_language: &'a str,
}

/// Oracle backed by a translation route accepting
/// `{"texts": [...], "targetLanguage": "es"}` and answering
/// `{"translations": {"<original>": "<translated>"}}`
pub struct EndpointOracle {
    client: Client,
    url: String,
}

impl EndpointOracle {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl TranslationOracle for EndpointOracle {
    async fn translate_batch(
        &self,
        texts: &[String],
        target: &LanguageCode,
    ) -> Result<HashMap<String, String>> {
        debug!("Sending {} texts ({}) to {}", texts.len(), target, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&BatchRequest {
                texts,
                target_language: target.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        interpret_response(status, &body, texts)
    }
}

/// Turn an endpoint reply into the translations for `requested`.
///
/// Non-success statuses surface the reply's `error` field. A success
/// without a `translations` object is malformed. Entries that are not
/// strings, or answer texts that were never asked for, are dropped.
pub(crate) fn interpret_response(
    status: StatusCode,
    body: &str,
    requested: &[String],
) -> Result<HashMap<String, String>> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("Translation request failed.");
        warn!("Translation endpoint returned {}: {}", status, message);
        return Err(TranslateError::Oracle(message.to_string()));
    }

    let Some(parsed) = parsed else {
        return Err(TranslateError::MalformedResponse(
            "response body is not JSON".to_string(),
        ));
    };

    let Some(translations) = parsed.get("translations").and_then(Value::as_object) else {
        return Err(TranslateError::MalformedResponse(
            "Missing translations in response.".to_string(),
        ));
    };

    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut resolved = HashMap::with_capacity(translations.len());

    for (original, translated) in translations {
        if !requested.contains(original.as_str()) {
            debug!("Ignoring unrequested translation for {:?}", original);
            continue;
        }
        match translated.as_str() {
            Some(text) => {
                resolved.insert(original.clone(), text.to_string());
            }
            None => debug!("Ignoring non-string translation for {:?}", original),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested() -> Vec<String> {
        vec!["Login".to_string(), "Order Now".to_string()]
    }

    #[test]
    fn test_success_maps_by_original_text() {
        let body = r#"{"translations":{"Order Now":"Ordenar Ahora","Login":"Iniciar sesión"}}"#;
        let resolved = interpret_response(StatusCode::OK, body, &requested()).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["Login"], "Iniciar sesión");
        assert_eq!(resolved["Order Now"], "Ordenar Ahora");
    }

    #[test]
    fn test_partial_response_is_not_an_error() {
        let body = r#"{"translations":{"Login":"Iniciar sesión"}}"#;
        let resolved = interpret_response(StatusCode::OK, body, &requested()).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(!resolved.contains_key("Order Now"));
    }

    #[test]
    fn test_drops_unrequested_and_non_string_entries() {
        let body = r#"{"translations":{"Login":42,"Order Now":"Ordenar Ahora","Extra":"Extra"}}"#;
        let resolved = interpret_response(StatusCode::OK, body, &requested()).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["Order Now"], "Ordenar Ahora");
    }

    #[test]
    fn test_missing_translations_field_is_malformed() {
        let err = interpret_response(StatusCode::OK, r#"{"result":{}}"#, &requested()).unwrap_err();
        assert!(matches!(err, TranslateError::MalformedResponse(_)));

        let err = interpret_response(StatusCode::OK, "<html>", &requested()).unwrap_err();
        assert!(matches!(err, TranslateError::MalformedResponse(_)));
    }

    #[test]
    fn test_error_status_uses_error_field() {
        let body = r#"{"error":"Missing Google Translate API key."}"#;
        let err = interpret_response(StatusCode::INTERNAL_SERVER_ERROR, body, &requested()).unwrap_err();
        assert_eq!(err.to_string(), "Missing Google Translate API key.");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let client = Client::builder().no_proxy().build().unwrap();
        let oracle = EndpointOracle::new(client, "http://127.0.0.1:9/api/translate".to_string());

        let err = oracle
            .translate_batch(&requested(), &LanguageCode::new("es"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::Http(_)));
        assert!(err.to_string().starts_with("HTTP request error"));
    }

    #[test]
    fn test_error_status_without_json() {
        let err = interpret_response(StatusCode::BAD_GATEWAY, "upstream down", &requested()).unwrap_err();
        assert_eq!(err.to_string(), "Translation request failed.");
    }
}
