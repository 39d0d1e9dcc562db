use kiroku_api::{ProviderFailure, SyncProvider, WatchStatusUpdate};
use kiroku_core::LinkKind;

/// Sync provider for a session with no connected accounts.
pub struct OfflineSync;

impl SyncProvider for OfflineSync {
    fn is_authorized(&self, _kind: LinkKind) -> bool {
        false
    }

    async fn push_watch_status(&self, update: &WatchStatusUpdate) -> Result<(), ProviderFailure> {
        tracing::debug!(show = %update.show_title, "No sync account connected, dropping update");
        Ok(())
    }
}
