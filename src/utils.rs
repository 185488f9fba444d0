// ABOUTME: Small shared helpers: connection retry and message sanitizing
// ABOUTME: Keeps backend error text safe for the line-oriented result format

use anyhow::Result;
use std::time::Duration;

/// Retry an async operation with exponential backoff.
///
/// Used for connection establishment, where transient failures are common;
/// each retry doubles the delay.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        "Operation failed (attempt {}/{}), retrying in {:?}...",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Operation failed after retries")))
}

/// Collapse a backend error message onto one line.
///
/// The result file is newline-delimited with a tab separator, so messages
/// must never contain either. Control characters become spaces and runs of
/// whitespace collapse.
pub fn flatten_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut last_was_space = false;
    for c in message.chars() {
        let c = if c.is_control() || c == '\t' { ' ' } else { c };
        if c == ' ' {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}
