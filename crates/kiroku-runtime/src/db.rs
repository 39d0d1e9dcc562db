use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use kiroku_core::error::KirokuError;
use kiroku_core::storage::{Index, OpOutcome, OpValue, Storage, StoreOp, StoredShow};
use kiroku_core::{SaveRequest, Show, ShowRecord};

/// Cloneable handle to the store actor.
///
/// Commands are served one at a time in the order they were sent, so two
/// saves of the same show always land in issuance order.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::UnboundedSender<DbCommand>,
}

pub type Reply<T> = oneshot::Receiver<Result<T, KirokuError>>;

enum DbCommand {
    Transaction {
        ops: Vec<StoreOp>,
        reply: oneshot::Sender<Result<Vec<OpOutcome>, KirokuError>>,
    },
    LoadAll {
        index: Index,
        reply: oneshot::Sender<Result<Vec<StoredShow>, KirokuError>>,
    },
    Count {
        reply: oneshot::Sender<Result<usize, KirokuError>>,
    },
    Flush {
        reply: oneshot::Sender<Result<(), KirokuError>>,
    },
}

impl DbHandle {
    pub fn open(path: &Path) -> Option<Self> {
        let storage = Storage::open(path)
            .map_err(|e| tracing::error!(path = %path.display(), "Failed to open database: {e}"))
            .ok()?;
        Self::spawn(storage)
    }

    pub fn open_memory() -> Option<Self> {
        let storage = Storage::open_memory()
            .map_err(|e| tracing::error!("Failed to open in-memory database: {e}"))
            .ok()?;
        Self::spawn(storage)
    }

    fn spawn(storage: Storage) -> Option<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("db-actor".into())
            .spawn(move || actor_loop(storage, rx))
            .map_err(|e| tracing::error!("Failed to spawn DB thread: {e}"))
            .ok()?;

        Some(Self { tx })
    }

    /// Queue a transaction now and hand back its reply.
    ///
    /// The command is ordered at the moment of this call, not when the
    /// receiver is awaited.
    pub fn enqueue(&self, ops: Vec<StoreOp>) -> Reply<Vec<OpOutcome>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::Transaction { ops, reply });
        rx
    }

    /// Queue the save a [`kiroku_core::Tracked`] asked for. A renamed show
    /// drops its old row in the same transaction.
    pub fn enqueue_save(&self, request: &SaveRequest<'_>) -> Reply<Vec<OpOutcome>> {
        let mut ops = Vec::with_capacity(2);
        if let Some(previous) = &request.previous_key {
            ops.push(StoreOp::Delete {
                key: previous.clone(),
            });
        }
        ops.push(StoreOp::Put {
            key: request.key.clone(),
            record: request.show.to_record(),
        });
        self.enqueue(ops)
    }

    pub async fn transaction(&self, ops: Vec<StoreOp>) -> Result<Vec<OpOutcome>, KirokuError> {
        settle(self.enqueue(ops)).await
    }

    pub async fn put(&self, show: &Show) -> Result<(), KirokuError> {
        self.single(StoreOp::put(show)).await.map(|_| ())
    }

    pub async fn get(&self, key: &str) -> Result<Option<ShowRecord>, KirokuError> {
        match self.single(StoreOp::Get { key: key.into() }).await? {
            OpValue::Found(record) => Ok(record),
            _ => Ok(None),
        }
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, key: &str) -> Result<bool, KirokuError> {
        match self.single(StoreOp::Delete { key: key.into() }).await? {
            OpValue::Deleted(removed) => Ok(removed),
            _ => Ok(false),
        }
    }

    pub async fn load_all(&self, index: Index) -> Result<Vec<StoredShow>, KirokuError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::LoadAll { index, reply });
        settle(rx).await
    }

    pub async fn count(&self) -> Result<usize, KirokuError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::Count { reply });
        settle(rx).await
    }

    /// Resolves once every command sent before it has been served.
    pub async fn flush(&self) -> Result<(), KirokuError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::Flush { reply });
        settle(rx).await
    }

    async fn single(&self, op: StoreOp) -> Result<OpValue, KirokuError> {
        self.transaction(vec![op])
            .await?
            .pop()
            .map(|outcome| outcome.result)
            .unwrap_or(Err(KirokuError::StoreClosed))
    }
}

/// Await a reply, mapping a vanished actor to [`KirokuError::StoreClosed`].
pub async fn settle<T>(rx: Reply<T>) -> Result<T, KirokuError> {
    rx.await.unwrap_or(Err(KirokuError::StoreClosed))
}

fn actor_loop(mut storage: Storage, mut rx: mpsc::UnboundedReceiver<DbCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DbCommand::Transaction { ops, reply } => {
                let _ = reply.send(storage.transaction(ops));
            }
            DbCommand::LoadAll { index, reply } => {
                let _ = reply.send(storage.load_all_ordered_by(index));
            }
            DbCommand::Count { reply } => {
                let _ = reply.send(storage.count());
            }
            DbCommand::Flush { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }
    tracing::debug!("DB actor stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kiroku_core::{ExternalLink, SaveFn, Season, Tracked};

    use super::*;

    fn show(title: &str, order: u32) -> Show {
        let mut show = Show::new(title, ExternalLink::None);
        let _ = show.add_seasons(vec![Season::new("Season 1", ["a", "b"])], None);
        let _ = show.set_order(order);
        show
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let db = DbHandle::open_memory().unwrap();
        db.put(&show("Frieren", 0)).await.unwrap();

        let record = db.get("Frieren").await.unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("Frieren"));
        assert_eq!(db.count().await.unwrap(), 1);

        assert!(db.delete("Frieren").await.unwrap());
        assert!(!db.delete("Frieren").await.unwrap());
        assert!(db.get("Frieren").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saves_land_in_issuance_order() {
        let db = DbHandle::open_memory().unwrap();
        let sink = db.clone();
        let on_save: SaveFn = Arc::new(move |req: SaveRequest<'_>| {
            drop(sink.enqueue_save(&req));
        });

        let mut tracked = Tracked::wrap(show("Frieren", 0), on_save);
        for i in 0..20 {
            let _ = tracked.apply(|s| s.set_image_link(Some(format!("cover-{i}.jpg"))));
        }
        db.flush().await.unwrap();

        let record = db.get("Frieren").await.unwrap().unwrap();
        assert_eq!(record.image_link.as_deref(), Some("cover-19.jpg"));
    }

    #[tokio::test]
    async fn test_rename_moves_row() {
        let db = DbHandle::open_memory().unwrap();
        db.put(&show("Frieren", 0)).await.unwrap();

        let sink = db.clone();
        let on_save: SaveFn = Arc::new(move |req: SaveRequest<'_>| {
            drop(sink.enqueue_save(&req));
        });
        let mut tracked = Tracked::wrap(show("Frieren", 0), on_save);
        let _ = tracked.apply(|s| s.set_title("Sousou no Frieren"));
        db.flush().await.unwrap();

        assert!(db.get("Frieren").await.unwrap().is_none());
        assert!(db.get("Sousou no Frieren").await.unwrap().is_some());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[test]
    fn test_open_fails_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("kiroku.db");
        assert!(DbHandle::open(&path).is_none());
    }

    #[tokio::test]
    async fn test_on_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiroku.db");
        let db = DbHandle::open(&path).unwrap();
        db.put(&show("Mushishi", 0)).await.unwrap();

        let rows = db.load_all(Index::Order).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "Mushishi");
    }
}
