//! Rate-limit backoff for platform calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::traits::ClientError;

/// Runs `call` until it returns anything other than a rate-limit signal.
///
/// On [`ClientError::RateLimited`] the task sleeps for exactly the requested
/// duration and then issues the identical call again.
pub async fn retry_rate_limited<T, F, Fut>(label: &str, mut call: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    loop {
        match call().await {
            Err(ClientError::RateLimited { seconds }) => {
                warn!(call = label, wait_secs = seconds, "Rate limited, waiting");
                tokio::time::sleep(Duration::from_secs(seconds)).await;
            }
            other => return other,
        }
    }
}
