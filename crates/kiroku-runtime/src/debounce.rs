//! Debounced, supersedable actions for text inputs.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kiroku_api::{CandidateShow, MetadataProvider, ProviderFailure};
use kiroku_core::config::SearchConfig;

/// Outcome of a debounced call. `Aborted` is not a failure: a newer call
/// took its place.
#[derive(Debug, Clone, PartialEq)]
pub enum Debounced<T> {
    Fired(T),
    Aborted,
}

impl<T> Debounced<T> {
    pub fn fired(self) -> Option<T> {
        match self {
            Self::Fired(value) => Some(value),
            Self::Aborted => None,
        }
    }
}

/// Only the latest of overlapping calls survives the delay and runs.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<CancellationToken>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Wait out the delay, then run `action` unless a newer call or
    /// [`Debouncer::cancel`] arrived first.
    ///
    /// `action` gets the call's token. Cancellation stops the action at its
    /// next suspension point.
    pub async fn run<F, Fut, T>(&self, action: F) -> Debounced<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.supersede();

        tokio::select! {
            _ = token.cancelled() => return Debounced::Aborted,
            _ = tokio::time::sleep(self.delay) => {}
        }

        tokio::select! {
            _ = token.cancelled() => Debounced::Aborted,
            value = action(token.clone()) => Debounced::Fired(value),
        }
    }

    /// Abort whatever call is pending.
    pub fn cancel(&self) {
        if let Some(token) = self.lock().take() {
            token.cancel();
        }
    }

    fn supersede(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Debounced provider search for a search-as-you-type box.
pub struct SearchBox<P> {
    provider: Arc<P>,
    debouncer: Debouncer,
    limit: usize,
}

impl<P: MetadataProvider> SearchBox<P> {
    pub fn new(provider: Arc<P>, delay: Duration, limit: usize) -> Self {
        Self {
            provider,
            debouncer: Debouncer::new(delay),
            limit,
        }
    }

    /// Delay and result limit from the `[search]` config section.
    pub fn from_config(provider: Arc<P>, config: &SearchConfig) -> Self {
        Self::new(provider, Duration::from_millis(config.debounce_ms), config.limit)
    }

    /// Search for `query` once typing settles. A blank query cancels any
    /// pending search and yields no results.
    pub async fn search(&self, query: &str) -> Debounced<Result<Vec<CandidateShow>, ProviderFailure>> {
        let query = query.trim();
        if query.is_empty() {
            self.debouncer.cancel();
            return Debounced::Fired(Ok(Vec::new()));
        }
        let provider = Arc::clone(&self.provider);
        let limit = self.limit;
        self.debouncer
            .run(|_| async move { provider.search(query, limit).await })
            .await
    }

    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}
