//! Per-call execution context: a timeout for every external call and a cooperative
//! cancellation signal checked between the steps of long operations.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can represent an external call that did not answer in time.
///
/// A timeout never means success or failure of the underlying write; it may have landed.
pub trait FromTimeout {
    fn from_timeout(message: String) -> Self;
}

#[derive(Debug, Clone)]
pub struct OpContext {
    timeout: Duration,
    cancel: CancellationToken,
}

impl OpContext {
    pub fn new(timeout: Duration) -> Self {
        OpContext { timeout, cancel: CancellationToken::new() }
    }

    /// Ties this context to an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs one external call under this context's timeout.
    pub async fn call<T, E, F>(&self, what: &'static str, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: FromTimeout,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(call = what, timeout_ms = self.timeout.as_millis() as u64, "External call timed out");
                Err(E::from_timeout(format!("{} timed out after {:?}", what, self.timeout)))
            }
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        OpContext::new(DEFAULT_CALL_TIMEOUT)
    }
}
