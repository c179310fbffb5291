//! DeepSeek API translation client.
//! Connection pooling via reqwest, simple next-allowed-time rate limiting, retry policy
//! shared with the other backends. The prompt pins the output to one line per input line
//! so batched payloads keep their correspondence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{build_client, send_with_retry};
use super::{TranslateError, TranslationBackend};

pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// System prompt kept short; the line rule is what batching depends on.
const SYSTEM_PROMPT: &str = "You are a translator. Translate every input line separately and \
output exactly one line per input line, in the same order. Output only the translation.";

/// DeepSeek chat/completions client.
pub struct DeepSeekClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Tracks the next allowed request time.
    next_allowed: Arc<tokio::sync::Mutex<Instant>>,
    /// Minimum interval between requests (e.g. 100ms = 10 req/s).
    min_interval: Duration,
}

impl DeepSeekClient {
    /// Create a new client. Reads `DEEPSEEK_API_KEY` from the environment.
    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self, TranslateError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            TranslateError::InvalidInput(format!("{API_KEY_ENV} environment variable not set"))
        })?;
        Self::new(api_key, base_url, timeout)
    }

    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, TranslateError> {
        if api_key.trim().is_empty() {
            return Err(TranslateError::InvalidInput("empty API key".into()));
        }
        Ok(Self {
            http: build_client(timeout)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            next_allowed: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            min_interval: Duration::from_millis(100),
        })
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }
}

#[async_trait]
impl TranslationBackend for DeepSeekClient {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        self.rate_limit_wait().await;

        let body = build_request_body(text, source_lang, target_lang);
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = send_with_retry(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::BadResponse(e.to_string()))?;
        extract_content(parsed)
    }
}

fn build_request_body(text: &str, source_lang: &str, target_lang: &str) -> serde_json::Value {
    let mut user = serde_json::json!({ "t": text, "l": target_lang });
    if source_lang != "auto" {
        user["s"] = serde_json::Value::from(source_lang);
    }

    serde_json::json!({
        "model": "deepseek-chat",
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": user.to_string()}
        ],
        "max_tokens": estimate_max_tokens(text),
        "stream": false,
        "temperature": 0.1
    })
}

/// Estimate max_tokens: (input_tokens * 1.15 + 32), clamped to [64, 2048].
fn estimate_max_tokens(text: &str) -> u32 {
    // Rough: ~4 chars/token for Latin, ~1.5 for CJK
    let estimated_input_tokens = text.len() as f64 / 3.0;
    let max = (estimated_input_tokens * 1.15 + 32.0) as u32;
    max.clamp(64, 2048)
}

fn extract_content(parsed: ChatResponse) -> Result<String, TranslateError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| TranslateError::BadResponse("no choices in response".into()))
}

// --- response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
