//! Contracts for the remote collaborators the library talks to.
//!
//! Metadata providers answer searches and detail lookups; sync providers
//! push watch status to a remote account. Both report failures as
//! [`ProviderFailure`] values.

pub mod details;
pub mod error;
pub mod traits;

pub use details::{build_show, fetch_new_show};
pub use error::ProviderFailure;
pub use traits::{
    CandidateShow, MetadataProvider, SeasonDetails, ShowDetails, SyncProvider, WatchStatusUpdate,
};
