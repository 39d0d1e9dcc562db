//! Change notifications for whatever presents the library.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-visible message, with optional raw detail (e.g. a provider payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub detail: Option<String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// The whole collection was (re)loaded from the store.
    Loaded { count: usize },
    /// A show's record reached the store.
    Saved { key: String },
    Removed { key: String },
    /// Ranks changed for the shows in `from..=to`.
    Reordered { from: usize, to: usize },
    Imported { added: usize, replaced: usize },
    Notify(Notification),
}

/// Broadcast side of the event channel. Sending with no subscribers is fine.
#[derive(Debug, Clone)]
pub struct Events {
    tx: broadcast::Sender<LibraryEvent>,
}

impl Events {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: LibraryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, notification: Notification) {
        self.emit(LibraryEvent::Notify(notification));
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}
