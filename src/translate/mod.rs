//! Translation service.
//! Single payloads go straight to the backend. Batches are joined with `\n` into one
//! call and split back by line; when the backend returns a different number of lines the
//! first segments are mapped by index and the rest fall back to their original text.
//! Backend failures never fail a batch: every entry falls back to its source text.

pub mod cache;
pub mod deepseek;
pub mod detect;
pub mod google;
mod http;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use cache::TranslationCache;

pub use deepseek::DeepSeekClient;
pub use google::GoogleTranslator;

/// Separator used to pack a batch into one payload.
pub const BATCH_SEPARATOR: &str = "\n";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("translation timeout")]
    Timeout,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

/// Translation backend adapter (one network call per `translate`).
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Translate `text`. `source_lang` may be `"auto"`.
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError>;
}

/// How a batch's translated segments lined up with its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every entry came from the cache; no call was made.
    Cached,
    /// The backend returned one segment per input.
    Exact,
    /// Segment count differed; trailing inputs kept their original text.
    Mismatch { expected: usize, returned: usize },
    /// The call failed; every uncached entry kept its original text.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTranslation {
    /// One entry per input, same order.
    pub texts: Vec<String>,
    pub status: BatchStatus,
}

impl BatchTranslation {
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.status,
            BatchStatus::Mismatch { .. } | BatchStatus::Failed(_)
        )
    }
}

/// Map translated segments onto inputs by index.
/// Returns the aligned texts and how many segments the payload contained.
pub fn align_segments(inputs: &[String], payload: &str) -> (Vec<String>, usize) {
    let segments: Vec<&str> = payload
        .trim_end()
        .split(BATCH_SEPARATOR)
        .map(|s| s.trim())
        .collect();
    let returned = if payload.trim().is_empty() {
        0
    } else {
        segments.len()
    };

    let texts = inputs
        .iter()
        .enumerate()
        .map(|(i, original)| match segments.get(i) {
            Some(seg) if i < returned && !seg.is_empty() => (*seg).to_string(),
            _ => original.clone(),
        })
        .collect();

    (texts, returned)
}

/// A region's text must occupy exactly one line of the batch payload.
fn flatten_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Translation front-end: cache, language detection, batching and fallback.
pub struct TranslationService {
    backend: Arc<dyn TranslationBackend>,
    cache: Option<Arc<TranslationCache>>,
    source_lang: String,
    target_lang: String,
    backend_calls: AtomicU64,
}

impl TranslationService {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        source_lang: &str,
        target_lang: &str,
    ) -> Self {
        Self {
            backend,
            cache: None,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            backend_calls: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<TranslationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    /// Number of backend calls issued so far.
    pub fn backend_calls(&self) -> u64 {
        self.backend_calls.load(Ordering::SeqCst)
    }

    /// Language used for cache keys: the configured source, or the detected one for `auto`.
    fn effective_source(&self, text: &str) -> String {
        if self.source_lang == "auto" {
            detect::detect_language(text).unwrap_or_else(|| "auto".to_string())
        } else {
            self.source_lang.clone()
        }
    }

    fn cache_key(&self, text: &str) -> [u8; 32] {
        TranslationCache::compute_key(&self.effective_source(text), &self.target_lang, text)
    }

    async fn call_backend(&self, text: &str) -> Result<String, TranslateError> {
        self.backend_calls.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let result = self
            .backend
            .translate(text, &self.source_lang, &self.target_lang)
            .await;
        debug!(
            backend = self.backend.name(),
            chars = text.chars().count(),
            ok = result.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "backend call finished"
        );
        result
    }

    /// Translate one payload, surfacing backend errors.
    pub async fn try_translate_one(&self, text: &str) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let key = self.cache.as_ref().map(|_| self.cache_key(text));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                debug!("translate_one cache hit");
                return Ok(hit);
            }
        }

        let translated = self.call_backend(text).await?;
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, translated.clone());
        }
        Ok(translated)
    }

    /// Translate one payload; on failure the original text is returned.
    pub async fn translate_one(&self, text: &str) -> String {
        match self.try_translate_one(text).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "translation failed, keeping original text");
                text.to_string()
            }
        }
    }

    /// Translate many payloads with one backend call. Output has one entry per input.
    pub async fn translate_batch(&self, inputs: &[String]) -> BatchTranslation {
        let mut slots: Vec<Option<String>> = inputs
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    return Some(String::new());
                }
                self.cache
                    .as_ref()
                    .and_then(|cache| cache.get(&self.cache_key(text)))
            })
            .collect();

        let misses: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect();

        if misses.is_empty() {
            return BatchTranslation {
                texts: slots.into_iter().map(Option::unwrap_or_default).collect(),
                status: BatchStatus::Cached,
            };
        }

        let pending: Vec<String> = misses.iter().map(|&i| flatten_line(&inputs[i])).collect();
        let payload = pending.join(BATCH_SEPARATOR);

        let status = match self.call_backend(&payload).await {
            Ok(translated) => {
                let (aligned, returned) = align_segments(&pending, &translated);
                let exact = returned == pending.len();
                for (&slot_idx, text) in misses.iter().zip(aligned) {
                    if exact {
                        if let Some(cache) = &self.cache {
                            cache.insert(self.cache_key(&inputs[slot_idx]), text.clone());
                        }
                    }
                    slots[slot_idx] = Some(text);
                }
                if exact {
                    BatchStatus::Exact
                } else {
                    info!(
                        expected = pending.len(),
                        returned,
                        "translated segment count mismatch, falling back to originals for the tail"
                    );
                    BatchStatus::Mismatch {
                        expected: pending.len(),
                        returned,
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, entries = pending.len(), "batch translation failed, keeping originals");
                for &slot_idx in &misses {
                    slots[slot_idx] = Some(inputs[slot_idx].clone());
                }
                BatchStatus::Failed(e.to_string())
            }
        };

        BatchTranslation {
            texts: slots.into_iter().map(Option::unwrap_or_default).collect(),
            status,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Backend returning scripted replies and recording every payload it receives.
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, TranslateError>>>,
        pub payloads: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<String, TranslateError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TranslationBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslateError> {
            self.payloads.lock().push(text.to_string());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TranslateError::ApiError("no scripted reply".into())))
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn service(replies: Vec<Result<String, TranslateError>>) -> (Arc<ScriptedBackend>, TranslationService) {
        let backend = Arc::new(ScriptedBackend::new(replies));
        let svc = TranslationService::new(backend.clone(), "en", "pt");
        (backend, svc)
    }

    #[test]
    fn align_exact() {
        let (texts, returned) = align_segments(&strings(&["A", "B", "C"]), "1\n2\n3");
        assert_eq!(texts, strings(&["1", "2", "3"]));
        assert_eq!(returned, 3);
    }

    #[test]
    fn align_short_payload_falls_back_for_tail() {
        let (texts, returned) = align_segments(&strings(&["A", "B", "C"]), "1\n2");
        assert_eq!(texts, strings(&["1", "2", "C"]));
        assert_eq!(returned, 2);
    }

    #[test]
    fn align_long_payload_ignores_extra_segments() {
        let (texts, returned) = align_segments(&strings(&["A", "B"]), "1\n2\n3\n4");
        assert_eq!(texts, strings(&["1", "2"]));
        assert_eq!(returned, 4);
    }

    #[test]
    fn align_trims_trailing_newline_and_cr() {
        let (texts, returned) = align_segments(&strings(&["A", "B"]), "1\r\n2\r\n");
        assert_eq!(texts, strings(&["1", "2"]));
        assert_eq!(returned, 2);
    }

    #[test]
    fn align_empty_segment_keeps_original() {
        let (texts, _) = align_segments(&strings(&["A", "B", "C"]), "1\n\n3");
        assert_eq!(texts, strings(&["1", "B", "3"]));
    }

    #[test]
    fn align_empty_payload() {
        let (texts, returned) = align_segments(&strings(&["A"]), "  ");
        assert_eq!(texts, strings(&["A"]));
        assert_eq!(returned, 0);
    }

    #[tokio::test]
    async fn batch_exact_correspondence() {
        let (backend, svc) = service(vec![Ok("1\n2\n3".into())]);
        let out = svc.translate_batch(&strings(&["A", "B", "C"])).await;

        assert_eq!(out.texts, strings(&["1", "2", "3"]));
        assert_eq!(out.status, BatchStatus::Exact);
        assert_eq!(backend.payloads.lock().as_slice(), &["A\nB\nC".to_string()]);
        assert_eq!(svc.backend_calls(), 1);
    }

    #[tokio::test]
    async fn batch_mismatch_fallback() {
        let (_, svc) = service(vec![Ok("1\n2".into())]);
        let out = svc.translate_batch(&strings(&["A", "B", "C"])).await;

        assert_eq!(out.texts, strings(&["1", "2", "C"]));
        assert_eq!(out.status, BatchStatus::Mismatch { expected: 3, returned: 2 });
        assert!(out.is_degraded());
    }

    #[tokio::test]
    async fn batch_failure_keeps_originals() {
        let (_, svc) = service(vec![Err(TranslateError::Timeout)]);
        let out = svc.translate_batch(&strings(&["A", "B"])).await;

        assert_eq!(out.texts, strings(&["A", "B"]));
        assert!(matches!(out.status, BatchStatus::Failed(_)));
    }

    #[tokio::test]
    async fn batch_inputs_are_flattened_to_one_line() {
        let (backend, svc) = service(vec![Ok("x\ny".into())]);
        svc.translate_batch(&strings(&["two\nlines", "b"])).await;
        assert_eq!(backend.payloads.lock()[0], "two lines\nb");
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let (_, svc) = service(vec![]);
        let out = svc.translate_batch(&[]).await;
        assert!(out.texts.is_empty());
        assert_eq!(out.status, BatchStatus::Cached);
        assert_eq!(svc.backend_calls(), 0);
    }

    #[tokio::test]
    async fn cached_entries_skip_the_backend() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("1\n2".into()), Ok("3".into())]));
        let cache = Arc::new(TranslationCache::new(16, Duration::from_secs(60)));
        let svc = TranslationService::new(backend.clone(), "en", "pt").with_cache(cache);

        svc.translate_batch(&strings(&["A", "B"])).await;
        let out = svc.translate_batch(&strings(&["A", "C"])).await;

        assert_eq!(out.texts, strings(&["1", "3"]));
        assert_eq!(out.status, BatchStatus::Exact);
        assert_eq!(backend.payloads.lock().as_slice(), &["A\nB".to_string(), "C".to_string()]);

        let again = svc.translate_batch(&strings(&["B", "A"])).await;
        assert_eq!(again.texts, strings(&["2", "1"]));
        assert_eq!(again.status, BatchStatus::Cached);
        assert_eq!(svc.backend_calls(), 2);
    }

    #[tokio::test]
    async fn mismatched_results_are_not_cached() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("1".into()), Ok("1\n2".into())]));
        let cache = Arc::new(TranslationCache::new(16, Duration::from_secs(60)));
        let svc = TranslationService::new(backend.clone(), "en", "pt").with_cache(cache);

        svc.translate_batch(&strings(&["A", "B"])).await;
        let out = svc.translate_batch(&strings(&["A", "B"])).await;
        assert_eq!(out.texts, strings(&["1", "2"]));
        assert_eq!(svc.backend_calls(), 2);
    }

    #[tokio::test]
    async fn translate_one_falls_back_on_error() {
        let (_, svc) = service(vec![Err(TranslateError::ApiError("down".into()))]);
        assert_eq!(svc.translate_one("Hello").await, "Hello");
    }

    #[tokio::test]
    async fn translate_one_passes_through() {
        let (_, svc) = service(vec![Ok("Olá".into())]);
        assert_eq!(svc.try_translate_one("Hello").await.unwrap(), "Olá");
        assert_eq!(svc.try_translate_one("   ").await.unwrap(), "");
        assert_eq!(svc.backend_calls(), 1);
    }
}
