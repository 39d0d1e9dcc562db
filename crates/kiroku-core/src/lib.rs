//! Local persistence and mutation layer for the kiroku show tracker.
//!
//! The entity model (shows, seasons, episodes) lives in [`models`]. Every
//! mutator reports through [`Persist`] whether the owning show must be saved;
//! [`Tracked`] turns that signal into saves against the durable [`storage`].

pub mod config;
pub mod error;
pub mod models;
pub mod persist;
pub mod record;
pub mod season_number;
pub mod storage;
pub mod transfer;

pub use error::KirokuError;
pub use models::{Episode, ExternalLink, LinkKind, Season, Show};
pub use persist::{Persist, SaveFn, SaveRequest, Tracked, WatchTransition};
pub use record::{FieldIssue, ShowRecord, ValidationError};
