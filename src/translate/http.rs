//! Shared HTTP retry policy for translation backends.
//! 429: Retry-After or 1s/2s/4s (max 3).
//! 5xx: exponential backoff from 500ms (max 2).
//! Timeout: immediate retry once.

use std::time::Duration;

use tracing::warn;

use super::TranslateError;

const MAX_429_RETRIES: u32 = 3;
const MAX_5XX_RETRIES: u32 = 2;

/// Send the request built by `build`, retrying per the policy above.
/// `build` is called once per attempt since a `RequestBuilder` is consumed by `send`.
pub(crate) async fn send_with_retry<F>(build: F) -> Result<reqwest::Response, TranslateError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt: u32 = 0;
    let mut timeout_retried = false;

    loop {
        match build().send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) if resp.status().as_u16() == 429 => {
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| Duration::from_secs(1 << attempt));
                if attempt >= MAX_429_RETRIES {
                    return Err(TranslateError::RateLimited {
                        retry_after_ms: wait.as_millis() as u64,
                    });
                }
                warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Ok(resp) if resp.status().is_server_error() => {
                if attempt >= MAX_5XX_RETRIES {
                    return Err(TranslateError::ApiError(format!(
                        "server error: {}",
                        resp.status()
                    )));
                }
                let wait = Duration::from_millis(500 * (1 << attempt));
                warn!(
                    attempt,
                    status = resp.status().as_u16(),
                    wait_ms = wait.as_millis() as u64,
                    "5xx error, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Ok(resp) => {
                let status = resp.status();
                let body_text = resp.text().await.unwrap_or_default();
                return Err(TranslateError::ApiError(format!(
                    "unexpected status {}: {}",
                    status,
                    body_text.chars().take(200).collect::<String>()
                )));
            }
            Err(e) if e.is_timeout() => {
                if timeout_retried {
                    return Err(TranslateError::Timeout);
                }
                warn!("request timeout, retrying once");
                timeout_retried = true;
            }
            Err(e) => return Err(TranslateError::ApiError(e.to_string())),
        }
    }
}

/// Shared client settings: small idle pool, bounded request time.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, TranslateError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .build()
        .map_err(|e| TranslateError::ApiError(e.to_string()))
}
