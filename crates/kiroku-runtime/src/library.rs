//! The show collection: one [`Tracked`] per show, index == rank.
//!
//! Single-show edits save through each show's callback, which queues the
//! write on the store actor immediately and reports the outcome in the
//! background. Multi-show changes (delete, reorder, import, load-time
//! correction) go out as one store transaction with per-show outcomes.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use kiroku_api::{fetch_new_show, MetadataProvider, SyncProvider, WatchStatusUpdate};
use kiroku_core::config::AppConfig;
use kiroku_core::storage::{Index, OpOutcome, OpValue, StoreOp};
use kiroku_core::transfer::{self, Rejected};
use kiroku_core::{
    ExternalLink, KirokuError, Persist, SaveFn, SaveRequest, Show, Tracked, ValidationError,
    WatchTransition,
};

use crate::db::{settle, DbHandle};
use crate::events::{Events, LibraryEvent, Notification};
use crate::RuntimeError;

/// A store operation that failed, named by the show it belonged to.
#[derive(Debug)]
pub struct Failure {
    pub key: String,
    pub title: String,
    pub error: KirokuError,
}

/// Aggregate outcome of a multi-show store transaction.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: Vec<Failure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// Stored records that failed validation, by key. Their rows are parked.
    pub unreadable: Vec<(String, ValidationError)>,
    /// Rank and key corrections written back to the store.
    pub corrections: BatchReport,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub added: usize,
    pub replaced: usize,
    pub rejected: Vec<Rejected>,
    /// Keys that appeared more than once in the file; only the first copy
    /// in file order was kept.
    pub duplicates: Vec<String>,
    pub store: BatchReport,
}

/// Detached work the library starts: save reporting and sync pushes.
#[derive(Clone)]
struct Background {
    handle: Handle,
    tracker: TaskTracker,
    events: Events,
}

impl Background {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.tracker.spawn_on(task, &self.handle);
    }
}

pub struct Library<S> {
    shows: Vec<Tracked>,
    db: DbHandle,
    sync: Arc<S>,
    config: AppConfig,
    background: Background,
}

impl<S: SyncProvider + 'static> Library<S> {
    /// Create an empty library over `db`. Must be called inside a tokio runtime.
    pub fn new(db: DbHandle, sync: Arc<S>, config: AppConfig) -> Result<Self, RuntimeError> {
        let handle = Handle::try_current().map_err(|e| RuntimeError::NoRuntime(e.to_string()))?;
        Ok(Self {
            shows: Vec::new(),
            db,
            sync,
            config,
            background: Background {
                handle,
                tracker: TaskTracker::new(),
                events: Events::new(),
            },
        })
    }

    /// Open the library at the configured database path.
    pub fn open(config: AppConfig, sync: Arc<S>) -> Result<Self, RuntimeError> {
        let db_path = AppConfig::ensure_db_path()?;
        Self::open_at(&db_path, config, sync)
    }

    /// Open the library over the database file at `path`.
    pub fn open_at(path: &Path, config: AppConfig, sync: Arc<S>) -> Result<Self, RuntimeError> {
        let db = DbHandle::open(path).ok_or(RuntimeError::StoreUnavailable)?;
        Self::new(db, sync, config)
    }

    // ── Reads ───────────────────────────────────────────────────

    pub fn shows(&self) -> &[Tracked] {
        &self.shows
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.shows.iter().position(|t| t.key() == key)
    }

    pub fn get(&self, key: &str) -> Option<&Tracked> {
        self.position(key).map(|i| &self.shows[i])
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.background.events.subscribe()
    }

    fn events(&self) -> &Events {
        &self.background.events
    }

    fn index_of(&self, key: &str) -> Result<usize, RuntimeError> {
        self.position(key)
            .ok_or_else(|| RuntimeError::NotFound(key.to_string()))
    }

    // ── Load ────────────────────────────────────────────────────

    /// Replace the collection with the store's contents in rank order.
    ///
    /// Ranks are rewritten to match load position and shows stored under a
    /// stale key are moved to their current one. Unreadable records are
    /// reported and parked out of the rank sequence.
    pub async fn load(&mut self) -> Result<LoadReport, RuntimeError> {
        let rows = self.db.load_all(Index::Order).await?;
        let mut report = LoadReport::default();
        let mut parks = Vec::new();
        let mut fixes = Vec::new();
        let mut shows = Vec::with_capacity(rows.len());
        let saver = self.saver();

        for row in rows {
            let mut show = match row.show {
                Ok(show) => show,
                Err(error) => {
                    warn!(key = %row.key, %error, "Skipping unreadable show record");
                    self.events().notify(
                        Notification::warning(format!("Could not read stored show \"{}\"", row.key))
                            .with_detail(Some(error.to_string())),
                    );
                    parks.push((row.key.clone(), StoreOp::Park { key: row.key.clone() }));
                    report.unreadable.push((row.key, error));
                    continue;
                }
            };

            let rank = shows.len() as u32;
            let mut stale = false;
            if show.order() != rank || row.rank != i64::from(rank) {
                debug!(key = %row.key, from = row.rank, to = rank, "Correcting stored rank");
                let _ = show.set_order(rank);
                stale = true;
            }
            let key = show.key();
            if key != row.key {
                debug!(from = %row.key, to = %key, "Moving show to its current key");
                fixes.push((show.title().to_string(), StoreOp::Delete { key: row.key }));
                stale = true;
            }
            if stale {
                fixes.push((show.title().to_string(), StoreOp::put(&show)));
            }
            shows.push(Tracked::wrap(show, saver.clone()));
        }

        // Unreadable rows must give up their ranks before corrected rows take them.
        parks.extend(fixes);
        if !parks.is_empty() {
            report.corrections = self.commit(parks).await?;
        }
        report.loaded = shows.len();
        self.shows = shows;

        info!(
            loaded = report.loaded,
            unreadable = report.unreadable.len(),
            corrected = report.corrections.succeeded,
            "Loaded library"
        );
        self.events().emit(LibraryEvent::Loaded {
            count: report.loaded,
        });
        Ok(report)
    }

    // ── Single-show edits ───────────────────────────────────────

    /// Apply a command to one show and save it if anything changed.
    ///
    /// The command runs on a draft first. Ranks only change through
    /// [`Library::move_show`], and a rename onto another show's key is refused.
    pub fn edit(
        &mut self,
        key: &str,
        command: impl FnOnce(&mut Show) -> Persist,
    ) -> Result<Persist, RuntimeError> {
        let index = self.index_of(key)?;
        let mut draft = Show::clone(&self.shows[index]);
        if !command(&mut draft).is_dirty() {
            return Ok(Persist::Clean);
        }
        let _ = draft.set_order(index as u32);

        let new_key = draft.key();
        if new_key != key && self.position(&new_key).is_some() {
            return Err(RuntimeError::Duplicate(new_key));
        }
        Ok(self.shows[index].apply(move |show| {
            *show = draft;
            Persist::Dirty
        }))
    }

    /// Toggle one episode. A real transition back-fills dates and, when
    /// enabled, pushes the season's progress to the sync provider.
    pub fn set_episode_watched(
        &mut self,
        key: &str,
        season_index: usize,
        episode_number: u32,
        watched: bool,
    ) -> Result<Option<WatchTransition>, RuntimeError> {
        let index = self.index_of(key)?;
        let transition =
            self.shows[index].set_episode_watched(season_index, episode_number, watched, Utc::now());
        if transition.is_some() {
            self.push_watch_status(index, season_index);
        }
        Ok(transition)
    }

    /// Mark every episode of one season.
    pub fn set_season_watched(
        &mut self,
        key: &str,
        season_index: usize,
        watched: bool,
    ) -> Result<Persist, RuntimeError> {
        let now = Utc::now();
        let changed = self.edit(key, |show| {
            let toggled = show.edit_season(season_index, |s| s.set_all_watched(watched));
            if !toggled.is_dirty() {
                return toggled;
            }
            toggled | show.edit_season(season_index, |s| s.update_date(now)) | show.update_date()
        })?;
        if changed.is_dirty() {
            let index = self.index_of(key)?;
            self.push_watch_status(index, season_index);
        }
        Ok(changed)
    }

    /// Mark every episode of every season.
    pub fn set_show_watched(&mut self, key: &str, watched: bool) -> Result<Persist, RuntimeError> {
        let now = Utc::now();
        let changed = self.edit(key, |show| {
            let toggled = show.set_all_watched(watched);
            if !toggled.is_dirty() {
                return toggled;
            }
            let mut changed = toggled;
            for i in 0..show.seasons().len() {
                changed |= show.edit_season(i, |s| s.update_date(now));
            }
            changed | show.update_date()
        })?;
        if changed.is_dirty() {
            let index = self.index_of(key)?;
            for season_index in 0..self.shows[index].seasons().len() {
                self.push_watch_status(index, season_index);
            }
        }
        Ok(changed)
    }

    fn push_watch_status(&self, index: usize, season_index: usize) {
        if !self.config.sync.push_on_watch {
            return;
        }
        let Some(update) = WatchStatusUpdate::for_season(&self.shows[index], season_index) else {
            return;
        };
        let Some(kind) = update.kind() else {
            return;
        };
        if !self.sync.is_authorized(kind) {
            debug!(provider = %kind, "Sync provider not authorized, skipping push");
            return;
        }

        let sync = Arc::clone(&self.sync);
        let events = self.background.events.clone();
        self.background.spawn(async move {
            match sync.push_watch_status(&update).await {
                Ok(()) => debug!(show = %update.show_title, season = %update.season_title, "Pushed watch status"),
                Err(e) => {
                    warn!(show = %update.show_title, season = %update.season_title, "Watch status sync failed: {e}");
                    let detail = e.payload_detail().unwrap_or_else(|| e.to_string());
                    events.notify(
                        Notification::error(format!("Could not sync \"{}\"", update.show_title))
                            .with_detail(Some(detail)),
                    );
                }
            }
        });
    }

    // ── Adding and removing ─────────────────────────────────────

    /// Append a show at the last rank and store it. Returns its index.
    pub async fn insert_show(&mut self, mut show: Show) -> Result<usize, RuntimeError> {
        let key = show.key();
        if self.position(&key).is_some() {
            return Err(RuntimeError::Duplicate(key));
        }
        let index = self.shows.len();
        let _ = show.set_order(index as u32);
        self.db.put(&show).await?;

        info!(key = %key, title = %show.title(), order = index, "Added show");
        self.shows.push(Tracked::wrap(show, self.saver()));
        self.events().emit(LibraryEvent::Saved { key });
        Ok(index)
    }

    /// Fetch a show and its seasons from `provider` and append it.
    pub async fn add_from_provider<P: MetadataProvider>(
        &mut self,
        provider: &P,
        link: &ExternalLink,
    ) -> Result<usize, RuntimeError> {
        if !link.is_none() {
            let key = link.identity("");
            if self.position(&key).is_some() {
                return Err(RuntimeError::Duplicate(key));
            }
        }
        let show = fetch_new_show(provider, link).await?;
        self.insert_show(show).await
    }

    /// Delete a show and close the gap it leaves in the ranks, all in one
    /// store transaction.
    pub async fn delete(&mut self, key: &str) -> Result<BatchReport, RuntimeError> {
        let index = self.index_of(key)?;
        let title = self.shows[index].title().to_string();
        let arrangement: Vec<usize> = (0..self.shows.len()).filter(|&i| i != index).collect();

        let mut ops = vec![(
            title.clone(),
            StoreOp::Delete {
                key: self.shows[index].persisted_key().to_string(),
            },
        )];
        ops.extend(self.rank_ops(&arrangement));
        let shifted = ops.len() - 1;
        let report = self.commit(ops).await?;
        if !report.is_clean() {
            self.resync().await?;
            return Ok(report);
        }

        self.rearrange(&arrangement);
        info!(key, title = %title, shifted, "Deleted show");
        self.events().emit(LibraryEvent::Removed {
            key: key.to_string(),
        });
        Ok(report)
    }

    /// Move the show at `from` to `to`, shifting the shows in between.
    pub async fn move_show(&mut self, from: usize, to: usize) -> Result<BatchReport, RuntimeError> {
        let len = self.shows.len();
        if from >= len || to >= len {
            return Err(RuntimeError::OutOfRange {
                index: from.max(to),
                len,
            });
        }
        if from == to {
            return Ok(BatchReport::default());
        }

        let mut arrangement: Vec<usize> = (0..len).collect();
        let moved = arrangement.remove(from);
        arrangement.insert(to, moved);
        let report = self.commit(self.rank_ops(&arrangement)).await?;
        if !report.is_clean() {
            self.resync().await?;
            return Ok(report);
        }

        self.rearrange(&arrangement);
        let (lo, hi) = (from.min(to), from.max(to));
        debug!(from, to, "Moved show");
        self.events().emit(LibraryEvent::Reordered { from: lo, to: hi });
        Ok(report)
    }

    /// Puts for every show whose rank would change if the collection were
    /// laid out as `arrangement` (indices into the current order).
    fn rank_ops(&self, arrangement: &[usize]) -> Vec<(String, StoreOp)> {
        arrangement
            .iter()
            .enumerate()
            .filter(|&(rank, &i)| self.shows[i].order() != rank as u32)
            .map(|(rank, &i)| {
                let mut show = Show::clone(&self.shows[i]);
                let _ = show.set_order(rank as u32);
                (show.title().to_string(), StoreOp::put(&show))
            })
            .collect()
    }

    /// Lay the collection out as `arrangement` and set ranks to match,
    /// without saving. Shows left out of `arrangement` are dropped.
    fn rearrange(&mut self, arrangement: &[usize]) {
        let mut slots: Vec<Option<Tracked>> =
            std::mem::take(&mut self.shows).into_iter().map(Some).collect();
        self.shows = arrangement.iter().filter_map(|&i| slots[i].take()).collect();
        for (rank, tracked) in self.shows.iter_mut().enumerate() {
            let _ = tracked.run_without_updating_db(|t| t.apply(|s| s.set_order(rank as u32)));
        }
    }

    /// Reload from the store after a batch that only partly went through, so
    /// the collection shows what was actually stored.
    async fn resync(&mut self) -> Result<(), RuntimeError> {
        warn!("Store batch partly failed, reloading library");
        self.load().await.map(|_| ())
    }

    // ── Import / export ─────────────────────────────────────────

    /// Import a JSON library file.
    ///
    /// Invalid records are reported and skipped. Shows whose key is already
    /// in the library replace it at its rank; new shows are appended in the
    /// file's `order`. Everything valid is stored in one transaction.
    pub async fn import(&mut self, json: &str) -> Result<ImportReport, RuntimeError> {
        let batch = transfer::parse_import(json, self.config.import.legacy_seconds_threshold)?;
        let mut report = ImportReport {
            rejected: batch.rejected,
            ..Default::default()
        };
        for rejected in &report.rejected {
            self.events().notify(
                Notification::warning(format!("Skipped invalid show #{}", rejected.position + 1))
                    .with_detail(Some(rejected.error.to_string())),
            );
        }

        report.duplicates = batch.duplicates;

        let mut staged = Vec::with_capacity(batch.shows.len());
        let mut ops = Vec::with_capacity(batch.shows.len());
        for mut show in batch.shows {
            let index = match self.position(&show.key()) {
                Some(index) => {
                    report.replaced += 1;
                    index
                }
                None => {
                    report.added += 1;
                    self.shows.len() + report.added - 1
                }
            };
            let _ = show.set_order(index as u32);
            ops.push((show.title().to_string(), StoreOp::put(&show)));
            staged.push((index, show));
        }

        report.store = self.commit(ops).await?;
        if report.store.is_clean() {
            let saver = self.saver();
            // Appended shows are staged in rank order, so pushing keeps index == rank.
            for (index, show) in staged {
                let tracked = Tracked::wrap(show, saver.clone());
                if index < self.shows.len() {
                    self.shows[index] = tracked;
                } else {
                    self.shows.push(tracked);
                }
            }
        } else {
            self.resync().await?;
        }
        info!(
            added = report.added,
            replaced = report.replaced,
            rejected = report.rejected.len(),
            duplicates = report.duplicates.len(),
            failed = report.store.failed.len(),
            "Imported library"
        );
        self.events().emit(LibraryEvent::Imported {
            added: report.added,
            replaced: report.replaced,
        });
        Ok(report)
    }

    /// Export every show, in rank order, as a JSON array.
    pub fn export(&self) -> Result<String, RuntimeError> {
        Ok(transfer::export_shows(self.shows.iter().map(|t| &**t))?)
    }

    // ── Plumbing ────────────────────────────────────────────────

    /// Wait until every queued store command and every background task
    /// (save reports, sync pushes) has finished.
    pub async fn flush(&self) -> Result<(), RuntimeError> {
        self.db.flush().await?;
        let tracker = &self.background.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
        Ok(())
    }

    /// Save callback shared by every tracked show.
    ///
    /// The write is queued on the actor inside the callback, so saves keep
    /// their issuance order; only the outcome is awaited in the background.
    fn saver(&self) -> SaveFn {
        let db = self.db.clone();
        let background = self.background.clone();
        Arc::new(move |request: SaveRequest<'_>| {
            let reply = db.enqueue_save(&request);
            let title = request.show.title().to_string();
            let events = background.events.clone();
            background.spawn(async move {
                report_save(&events, &title, settle(reply).await);
            });
        })
    }

    /// Run a transaction and report each failed op by show title.
    async fn commit(&self, ops: Vec<(String, StoreOp)>) -> Result<BatchReport, RuntimeError> {
        let (titles, ops): (Vec<String>, Vec<StoreOp>) = ops.into_iter().unzip();
        let outcomes = self.db.transaction(ops).await?;

        let mut report = BatchReport::default();
        for (title, outcome) in titles.into_iter().zip(outcomes) {
            match outcome.result {
                Ok(_) => report.succeeded += 1,
                Err(error) => {
                    warn!(key = %outcome.key, title = %title, "Store operation failed: {error}");
                    self.events().notify(
                        Notification::error(format!("Could not save \"{title}\""))
                            .with_detail(Some(error.to_string())),
                    );
                    report.failed.push(Failure {
                        key: outcome.key,
                        title,
                        error,
                    });
                }
            }
        }
        Ok(report)
    }
}

fn report_save(events: &Events, title: &str, result: Result<Vec<OpOutcome>, KirokuError>) {
    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(e) => {
            warn!(title, "Save never reached the store: {e}");
            events.notify(
                Notification::error(format!("Could not save \"{title}\"")).with_detail(Some(e.to_string())),
            );
            return;
        }
    };
    for outcome in outcomes {
        match outcome.result {
            Ok(OpValue::Stored) => events.emit(LibraryEvent::Saved { key: outcome.key }),
            Ok(_) => {}
            Err(e) => {
                warn!(key = %outcome.key, title, "Failed to save show: {e}");
                events.notify(
                    Notification::error(format!("Could not save \"{title}\""))
                        .with_detail(Some(e.to_string())),
                );
            }
        }
    }
}
