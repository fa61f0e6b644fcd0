//! Retry with exponential backoff for remote embedding calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay between retries (base for exponential backoff) in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,
    /// Maximum delay between retries in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before a specific retry attempt (0-indexed; attempt 0 never waits).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let exponential =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        let delay_ms = exponential.min(self.max_delay.as_millis() as f64) as u64;

        Duration::from_millis(delay_ms)
    }
}

/// Whether an error message looks transient enough to retry.
///
/// 5xx statuses, 429, and network-level failures are retried; 4xx client
/// errors are not. Unknown errors default to retryable.
pub fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("connection")
        || error_lower.contains("reset")
        || error_lower.contains("refused")
        || error_lower.contains("dns")
        || error_lower.contains("unreachable")
    {
        return true;
    }

    if error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("504")
        || error_lower.contains("429")
        || error_lower.contains("500")
    {
        return true;
    }

    if error_lower.contains("400")
        || error_lower.contains("401")
        || error_lower.contains("403")
        || error_lower.contains("404")
        || error_lower.contains("422")
    {
        return false;
    }

    true
}

/// Execute an async operation, retrying transient failures with backoff.
///
/// Non-retryable errors short-circuit without consuming further attempts.
pub async fn execute_with_retry_async<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, String>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = is_retryable_error(&e);
                last_error = Some(e);
                if !retryable {
                    break;
                }
                if attempt < config.max_retries {
                    let delay = config.calculate_delay(attempt + 1);
                    if delay > Duration::from_millis(0) {
                        sleep(delay).await;
                    }
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| "all retries exhausted".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn calculate_delay_no_delay_on_first_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.calculate_delay(0), Duration::from_millis(0));
    }

    #[test]
    fn calculate_delay_exponential() {
        let config = RetryConfig::default()
            .with_base_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn calculate_delay_respects_max() {
        let config = RetryConfig::default()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_millis(500))
            .with_backoff_multiplier(10.0);

        assert!(config.calculate_delay(3) <= Duration::from_millis(500));
    }

    #[test]
    fn retryable_transient_errors() {
        assert!(is_retryable_error("request timeout"));
        assert!(is_retryable_error("HTTP 503"));
        assert!(is_retryable_error("429 Too Many Requests"));
    }

    #[test]
    fn not_retryable_client_errors() {
        assert!(!is_retryable_error("HTTP 400"));
        assert!(!is_retryable_error("401 Unauthorized"));
        assert!(!is_retryable_error("404 Not Found"));
    }

    #[tokio::test]
    async fn retry_success_first_try() {
        let config = RetryConfig::default();
        let result =
            execute_with_retry_async(&config, |_attempt| async { Ok::<&str, String>("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn retry_eventual_success() {
        let config = RetryConfig::default().with_base_delay(Duration::from_millis(1));
        let result = execute_with_retry_async(&config, |attempt| async move {
            if attempt < 2 {
                Err("HTTP 503".to_string())
            } else {
                Ok("ok")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn retry_stops_on_client_error() {
        let config = RetryConfig::default().with_base_delay(Duration::from_millis(1));
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_ref = calls.clone();
        let result: Result<(), String> = execute_with_retry_async(&config, move |_attempt| {
            let calls = calls_ref.clone();
            async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err("401 Unauthorized".to_string())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_exhaustion() {
        let config = RetryConfig::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(1));
        let result: Result<(), String> =
            execute_with_retry_async(&config, |_attempt| async { Err("HTTP 503".to_string()) })
                .await;
        assert!(result.is_err());
    }
}
