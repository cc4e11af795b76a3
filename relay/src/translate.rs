//! Text translation backends.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_protocol::Language;
use tracing::debug;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: Language, to: Language) -> Result<String>;
}

/// Client for a LibreTranslate server, the HTTP front end of the Argos
/// models the catalog installs.
pub struct LibreTranslateTranslator {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

impl LibreTranslateTranslator {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

fn translation_err(message: impl Into<String>) -> RelayError {
    RelayError::Translation {
        message: message.into(),
    }
}

#[async_trait]
impl Translator for LibreTranslateTranslator {
    async fn translate(&self, text: &str, from: Language, to: Language) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: from.code(),
            target: to.code(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        debug!("Translating text from {} to {}: {}", from, to, text);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| translation_err(format!("translation server unreachable: {e}")))?;
        let status = response.status();
        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| translation_err(format!("unexpected translation reply: {e}")))?;

        match (body.translated_text, body.error) {
            (_, Some(error)) => Err(translation_err(error)),
            (Some(text), None) if status.is_success() => Ok(text),
            _ => Err(translation_err(format!("translation server returned {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_matches_libretranslate_api() {
        let request = TranslateRequest {
            q: "hello",
            source: "en",
            target: "es",
            format: "text",
            api_key: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"q":"hello","source":"en","target":"es","format":"text"}"#
        );
    }

    #[test]
    fn response_field_names() {
        let ok: TranslateResponse = serde_json::from_str(r#"{"translatedText":"hola"}"#).unwrap();
        assert_eq!(ok.translated_text.as_deref(), Some("hola"));
        let err: TranslateResponse =
            serde_json::from_str(r#"{"error":"en is not supported"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("en is not supported"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_translation_error() {
        let t = LibreTranslateTranslator::new("http://127.0.0.1:9/", None);
        assert_eq!(t.endpoint, "http://127.0.0.1:9/translate");
        let err = t
            .translate("hello", Language::English, Language::Spanish)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Translation { .. }));
    }
}
