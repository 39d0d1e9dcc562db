//! Async runtime around the core: the store actor, the show library, change
//! events and debounced provider search.

mod db;
mod debounce;
mod events;
mod library;

use kiroku_api::ProviderFailure;
use kiroku_core::KirokuError;

pub use db::{DbHandle, Reply};
pub use debounce::{Debounced, Debouncer, SearchBox};
pub use events::{Events, LibraryEvent, Notification, NotificationKind};
pub use library::{BatchReport, Failure, ImportReport, Library, LoadReport};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] KirokuError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderFailure),
    #[error("failed to open database")]
    StoreUnavailable,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("a show with key {0:?} already exists")]
    Duplicate(String),
    #[error("position {index} is out of range for {len} shows")]
    OutOfRange { index: usize, len: usize },
    #[error("no async runtime: {0}")]
    NoRuntime(String),
}

impl RuntimeError {
    /// Turn the error into a user-facing notification.
    pub fn to_notification(&self) -> Notification {
        let detail = match self {
            Self::Provider(failure) => failure.payload_detail(),
            _ => None,
        };
        Notification::error(self.to_string()).with_detail(detail)
    }
}
