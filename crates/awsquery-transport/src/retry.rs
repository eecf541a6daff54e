//! Retry classification and deterministic backoff for transport calls.

pub const BASE_BACKOFF_MS: u64 = 200;

/// Attempts per request including the first; retries only retryable failures.
pub const MAX_ATTEMPTS: usize = 3;

pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

pub fn next_backoff_ms(attempt: usize) -> u64 {
    let shift = attempt.min(6);
    BASE_BACKOFF_MS.saturating_mul(1_u64 << shift)
}

pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}
