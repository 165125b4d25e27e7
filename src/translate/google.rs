use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{Result, TranslateError};
use crate::language::LanguageCode;
use super::TranslationOracle;

/// Google Cloud Translation v2 response body
#[derive(Debug, Deserialize)]
struct GoogleResponse {
    data: Option<GoogleData>,
}

#[derive(Debug, Deserialize)]
struct GoogleData {
    #[serde(default)]
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
struct GoogleTranslation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Oracle calling Google Cloud Translation v2 directly.
///
/// Texts are always translated from the source language of the kiosk UI.
pub struct GoogleTranslateOracle {
    client: Client,
    endpoint: String,
    api_key: String,
    source_language: String,
}

impl GoogleTranslateOracle {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            source_language: "en".to_string(),
        }
    }

    pub fn with_source_language(mut self, source: &LanguageCode) -> Self {
        self.source_language = source.as_str().to_string();
        self
    }
}

#[async_trait]
impl TranslationOracle for GoogleTranslateOracle {
    async fn translate_batch(
        &self,
        texts: &[String],
        target: &LanguageCode,
    ) -> Result<HashMap<String, String>> {
        let valid: Vec<&str> = texts
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();

        if valid.is_empty() {
            return Ok(passthrough_blank(texts));
        }

        // v2 wants form-urlencoded with one `q` per text
        let mut form: Vec<(&str, &str)> = valid.iter().map(|t| ("q", *t)).collect();
        form.push(("target", target.as_str()));
        form.push(("source", self.source_language.as_str()));
        form.push(("format", "text"));

        debug!("Sending {} texts ({}) to Google Translate", valid.len(), target);

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = google_error_message(&body);
            warn!("Google Translate API error {}: {}", status, message);
            return Err(TranslateError::Oracle(message));
        }

        let parsed: GoogleResponse = serde_json::from_str(&body)
            .map_err(|e| TranslateError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        let translated = parsed
            .data
            .map(|d| d.translations)
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.translated_text)
            .collect::<Vec<_>>();

        Ok(pair_by_position(texts, &translated))
    }
}

/// Map every non-blank input to the translation at the same position among
/// non-blank inputs. Inputs past the end of a short reply are left out so
/// they stay unresolved; blank inputs map to themselves.
fn pair_by_position(texts: &[String], translated: &[String]) -> HashMap<String, String> {
    let mut resolved = HashMap::with_capacity(texts.len());
    let mut index = 0;

    for original in texts {
        if original.trim().is_empty() {
            resolved.insert(original.clone(), original.clone());
            continue;
        }

        match translated.get(index) {
            Some(text) => {
                resolved.insert(original.clone(), decode_html_entities(text));
            }
            None => debug!("No translation returned for {:?}", original),
        }
        index += 1;
    }

    resolved
}

fn passthrough_blank(texts: &[String]) -> HashMap<String, String> {
    texts.iter().map(|t| (t.clone(), t.clone())).collect()
}

fn google_error_message(body: &str) -> String {
    let fallback = "Translation service error.".to_string();
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return fallback;
    };

    let error = json.get("error");
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| {
            error
                .and_then(|e| e.get("errors"))
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        })
        .or_else(|| error.and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or(fallback)
}

/// Undo the HTML escaping Google applies even in text mode
fn decode_html_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pair_by_position_skips_blank_inputs() {
        let inputs = texts(&["Login", "  ", "Order Now"]);
        let translated = texts(&["Iniciar sesión", "Ordenar Ahora"]);
        let resolved = pair_by_position(&inputs, &translated);

        assert_eq!(resolved["Login"], "Iniciar sesión");
        assert_eq!(resolved["  "], "  ");
        assert_eq!(resolved["Order Now"], "Ordenar Ahora");
    }

    #[test]
    fn test_pair_by_position_short_reply_leaves_rest_unresolved() {
        let inputs = texts(&["Tea", "  ", "Milk", "Ice"]);
        let resolved = pair_by_position(&inputs, &texts(&["Té"]));
        assert_eq!(resolved["Tea"], "Té");
        assert_eq!(resolved["  "], "  ");
        assert!(!resolved.contains_key("Milk"));
        assert!(!resolved.contains_key("Ice"));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_decode_html_entities() {
        assert_eq!(decode_html_entities("Tom &amp; Jerry&#39;s &quot;boba&quot;"), "Tom & Jerry's \"boba\"");
        assert_eq!(decode_html_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_html_entities("1 &lt; 2 &gt; 0"), "1 < 2 > 0");
    }

    #[test]
    fn test_google_error_message_variants() {
        assert_eq!(
            google_error_message(r#"{"error":{"message":"API key not valid."}}"#),
            "API key not valid."
        );
        assert_eq!(
            google_error_message(r#"{"error":{"errors":[{"message":"Daily limit exceeded"}]}}"#),
            "Daily limit exceeded"
        );
        assert_eq!(google_error_message(r#"{"error":"quota"}"#), "quota");
        assert_eq!(google_error_message("not json"), "Translation service error.");
    }

    #[test]
    fn test_parse_google_body() {
        let body = r#"{"data":{"translations":[{"translatedText":"Hola"},{"translatedText":"Té &amp; leche"}]}}"#;
        let parsed: GoogleResponse = serde_json::from_str(body).unwrap();
        let translated: Vec<String> = parsed
            .data
            .unwrap()
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect();

        let resolved = pair_by_position(&texts(&["Hello", "Tea & milk"]), &translated);
        assert_eq!(resolved["Tea & milk"], "Té & leche");
    }

    #[test]
    fn test_blank_only_batch_needs_no_request() {
        let client = Client::new();
        let oracle = GoogleTranslateOracle::new(client, "http://127.0.0.1:9".to_string(), "k".to_string());
        let resolved = tokio_test::block_on(oracle.translate_batch(&texts(&[" "]), &LanguageCode::new("es")))
            .unwrap();
        assert_eq!(resolved[" "], " ");
    }
}
