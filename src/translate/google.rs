//! Google Translate client using the public `translate_a/single` (gtx) endpoint.
//! No API key. The response is a nested JSON array whose first element holds
//! `[translated, original, ...]` sentence chunks; line breaks survive inside the chunks.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::http::{build_client, send_with_retry};
use super::{TranslateError, TranslationBackend};

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

pub struct GoogleTranslator {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(timeout: Duration) -> Result<Self, TranslateError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, TranslateError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TranslationBackend for GoogleTranslator {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        if target_lang.is_empty() || target_lang == "auto" {
            return Err(TranslateError::InvalidInput(format!(
                "target language must be explicit, got {target_lang:?}"
            )));
        }

        let url = format!("{}/translate_a/single", self.base_url);
        let response = send_with_retry(|| {
            self.http
                .post(&url)
                .query(&[
                    ("client", "gtx"),
                    ("sl", source_lang),
                    ("tl", target_lang),
                    ("dt", "t"),
                ])
                .form(&[("q", text)])
        })
        .await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TranslateError::BadResponse(e.to_string()))?;
        parse_gtx_response(&body)
    }
}

/// Concatenate the translated chunks of a gtx response.
pub fn parse_gtx_response(body: &Value) -> Result<String, TranslateError> {
    let chunks = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::BadResponse("missing sentence array".into()))?;

    let mut out = String::new();
    for chunk in chunks {
        if let Some(piece) = chunk.get(0).and_then(Value::as_str) {
            out.push_str(piece);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn concatenates_sentence_chunks() {
        let body = json!([
            [
                ["Olá mundo\n", "Hello world\n", null, null, 10],
                ["Tchau", "Bye", null, null, 10]
            ],
            null,
            "en"
        ]);
        assert_eq!(parse_gtx_response(&body).unwrap(), "Olá mundo\nTchau");
    }

    #[test]
    fn skips_non_text_chunks() {
        let body = json!([[["Oi", "Hi"], [null, null, "Oi"]], null, "en"]);
        assert_eq!(parse_gtx_response(&body).unwrap(), "Oi");
    }

    #[test]
    fn rejects_unexpected_shape() {
        let body = json!({"error": "nope"});
        assert!(matches!(
            parse_gtx_response(&body),
            Err(TranslateError::BadResponse(_))
        ));
    }
}
