use crate::config::RetryConfig;
use opentelemetry::otel_warn;
use std::cmp;
use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

// Generates a random jitter value up to max_jitter
fn generate_jitter(max_jitter: Duration) -> Duration {
    let max_nanos = max_jitter.as_nanos() as u64;
    if max_nanos == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or_default();
    Duration::from_nanos(nanos % (max_nanos + 1))
}

/// Retries `operation` with exponential backoff and jitter.
///
/// Only errors accepted by `is_retryable` are retried. The operation is not
/// attempted again once the next delay would overrun
/// [`RetryConfig::max_elapsed_time`]; the last error is returned instead.
pub(crate) fn retry_with_exponential_backoff<T, E, F, R>(
    policy: RetryConfig,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let start = Instant::now();
    let mut delay = policy.initial_interval;
    let mut attempt: u64 = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) if is_retryable(&err) => {
                let delay_with_jitter = cmp::min(
                    delay + generate_jitter(delay / 10),
                    policy.max_interval,
                );
                if start.elapsed() + delay_with_jitter > policy.max_elapsed_time {
                    return Err(err);
                }
                attempt += 1;
                let reason = err.to_string();
                otel_warn!(
                    name: "Facade.RetryingOperation",
                    operation = operation_name,
                    attempt = attempt,
                    reason = reason.as_str()
                );
                thread::sleep(delay_with_jitter);
                delay = cmp::min(delay * 2, policy.max_interval);
            }
            Err(err) => return Err(err),
        }
    }
}
