//! Change signalling and the auto-saving show wrapper.
//!
//! Entity mutators never touch storage. Each returns a [`Persist`] telling
//! the caller whether a persisted field actually changed; [`Tracked`] owns a
//! [`Show`] and turns dirty commands into calls to its save callback.

use std::fmt;
use std::ops::{BitOr, BitOrAssign, Deref};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::Show;

/// Whether a command changed persisted state.
#[must_use = "a dirty change has to reach the store"]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Persist {
    #[default]
    Clean,
    Dirty,
}

impl Persist {
    pub fn changed(changed: bool) -> Self {
        if changed {
            Self::Dirty
        } else {
            Self::Clean
        }
    }

    pub fn is_dirty(self) -> bool {
        self == Self::Dirty
    }
}

impl BitOr for Persist {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::changed(self.is_dirty() || rhs.is_dirty())
    }
}

impl BitOrAssign for Persist {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Write `value` into `slot`, reporting whether it differed.
pub(crate) fn assign<T: PartialEq>(slot: &mut T, value: T) -> Persist {
    if *slot == value {
        Persist::Clean
    } else {
        *slot = value;
        Persist::Dirty
    }
}

/// What the save callback receives.
#[derive(Debug)]
pub struct SaveRequest<'a> {
    pub show: &'a Show,
    /// Key the show must be stored under now.
    pub key: String,
    /// Key the show was last stored under, when a rename changed it.
    pub previous_key: Option<String>,
}

pub type SaveFn = Arc<dyn Fn(SaveRequest<'_>) + Send + Sync>;

/// An episode `watched` flip observed through [`Tracked::set_episode_watched`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTransition {
    pub season_index: usize,
    pub episode_number: u32,
    pub watched: bool,
}

/// Sole owner of a [`Show`] whose dirty commands are saved immediately.
///
/// Reads go through `Deref`; writes go through [`Tracked::apply`]. There is
/// no way to reach a `&mut Show` that bypasses the save callback other than
/// the scoped [`Tracked::run_without_updating_db`].
pub struct Tracked {
    show: Show,
    persisted_key: String,
    suppressed: bool,
    on_save: SaveFn,
}

impl Tracked {
    /// Wrap a show that is (or is about to be) stored under its current key.
    pub fn wrap(show: Show, on_save: SaveFn) -> Self {
        let persisted_key = show.key();
        Self {
            show,
            persisted_key,
            suppressed: false,
            on_save,
        }
    }

    /// Apply a command; a dirty result triggers a save unless suppressed.
    pub fn apply(&mut self, command: impl FnOnce(&mut Show) -> Persist) -> Persist {
        let result = command(&mut self.show);
        if result.is_dirty() && !self.suppressed {
            self.save();
        }
        result
    }

    /// Run `action` with saves suppressed; the previous state is restored on
    /// every exit path, unwinding included.
    pub fn run_without_updating_db<R>(&mut self, action: impl FnOnce(&mut Tracked) -> R) -> R {
        let previous = std::mem::replace(&mut self.suppressed, true);
        let mut guard = Suppressed {
            tracked: self,
            previous,
        };
        action(&mut *guard)
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Toggle one episode; a real transition also back-fills season and show
    /// dates, all persisted by a single save.
    pub fn set_episode_watched(
        &mut self,
        season_index: usize,
        episode_number: u32,
        watched: bool,
        now: DateTime<Utc>,
    ) -> Option<WatchTransition> {
        let changed = self.run_without_updating_db(|t| {
            t.apply(|show| {
                let toggled = show.set_episode_watched(season_index, episode_number, watched);
                if !toggled.is_dirty() {
                    return toggled;
                }
                toggled | show.edit_season(season_index, |s| s.update_date(now)) | show.update_date()
            })
        });
        if !changed.is_dirty() {
            return None;
        }
        if !self.suppressed {
            self.save();
        }
        Some(WatchTransition {
            season_index,
            episode_number,
            watched,
        })
    }

    /// Hand the current state to the save callback.
    pub fn save(&mut self) {
        let key = self.show.key();
        let previous = std::mem::replace(&mut self.persisted_key, key.clone());
        let previous_key = (previous != key).then_some(previous);
        (self.on_save)(SaveRequest {
            show: &self.show,
            key,
            previous_key,
        });
    }

    pub fn persisted_key(&self) -> &str {
        &self.persisted_key
    }

    pub fn into_inner(self) -> Show {
        self.show
    }
}

impl Deref for Tracked {
    type Target = Show;

    fn deref(&self) -> &Show {
        &self.show
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("show", &self.show)
            .field("persisted_key", &self.persisted_key)
            .field("suppressed", &self.suppressed)
            .finish_non_exhaustive()
    }
}

struct Suppressed<'a> {
    tracked: &'a mut Tracked,
    previous: bool,
}

impl Deref for Suppressed<'_> {
    type Target = Tracked;

    fn deref(&self) -> &Tracked {
        self.tracked
    }
}

impl std::ops::DerefMut for Suppressed<'_> {
    fn deref_mut(&mut self) -> &mut Tracked {
        self.tracked
    }
}

impl Drop for Suppressed<'_> {
    fn drop(&mut self) {
        self.tracked.suppressed = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::models::{ExternalLink, Season};

    type Log = Arc<Mutex<Vec<(String, Option<String>)>>>;

    fn recording() -> (SaveFn, Log) {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let on_save: SaveFn = Arc::new(move |req: SaveRequest<'_>| {
            sink.lock().unwrap().push((req.key, req.previous_key));
        });
        (on_save, log)
    }

    fn tracked_show() -> (Tracked, Log) {
        let mut show = Show::new("Frieren", ExternalLink::None);
        let _ = show.add_seasons(vec![Season::new("Season 1", ["a", "b"])], None);
        let (on_save, log) = recording();
        (Tracked::wrap(show, on_save), log)
    }

    #[test]
    fn test_dirty_command_saves_once() {
        let (mut tracked, log) = tracked_show();
        assert!(tracked.apply(|s| s.set_image_link(Some("cover.jpg".into()))).is_dirty());
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(tracked.image_link(), Some("cover.jpg"));
    }

    #[test]
    fn test_clean_command_does_not_save() {
        let (mut tracked, log) = tracked_show();
        let _ = tracked.apply(|s| s.set_title("Frieren"));
        let _ = tracked.apply(|s| s.remove_season_at_index(4));
        let _ = tracked.apply(|s| {
            s.set_just_added(true);
            Persist::Clean
        });
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_suppression_batches_edits() {
        let (mut tracked, log) = tracked_show();
        tracked.run_without_updating_db(|t| {
            let _ = t.apply(|s| s.set_order(3));
            let _ = t.apply(|s| s.add_seasons(vec![Season::new("Season 2", ["x"])], None));
            assert!(t.is_suppressed());
        });
        assert!(!tracked.is_suppressed());
        assert!(log.lock().unwrap().is_empty());

        tracked.save();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(tracked.order(), 3);
    }

    #[test]
    fn test_suppression_cleared_on_panic() {
        let (mut tracked, _log) = tracked_show();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracked.run_without_updating_db(|_| panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert!(!tracked.is_suppressed());
    }

    #[test]
    fn test_nested_suppression_restores_outer() {
        let (mut tracked, _log) = tracked_show();
        tracked.run_without_updating_db(|outer| {
            outer.run_without_updating_db(|_| {});
            assert!(outer.is_suppressed());
        });
        assert!(!tracked.is_suppressed());
    }

    #[test]
    fn test_rename_reports_previous_key() {
        let (mut tracked, log) = tracked_show();
        let _ = tracked.apply(|s| s.set_title("Sousou no Frieren"));
        let _ = tracked.apply(|s| s.set_order(1));

        let log = log.lock().unwrap();
        assert_eq!(
            log[0],
            ("Sousou no Frieren".to_string(), Some("Frieren".to_string()))
        );
        assert_eq!(log[1], ("Sousou no Frieren".to_string(), None));
        assert_eq!(tracked.persisted_key(), "Sousou no Frieren");
    }

    #[test]
    fn test_episode_transition_backfills_and_saves_once() {
        let (mut tracked, log) = tracked_show();
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();

        let transition = tracked.set_episode_watched(0, 0, true, now);
        assert_eq!(
            transition,
            Some(WatchTransition {
                season_index: 0,
                episode_number: 0,
                watched: true
            })
        );
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(tracked.seasons()[0].date_started(), Some(now));
        assert_eq!(tracked.date_started(), Some(now));

        // No transition, no save.
        assert_eq!(tracked.set_episode_watched(0, 0, true, now), None);
        assert_eq!(log.lock().unwrap().len(), 1);

        let _ = tracked.set_episode_watched(0, 1, true, now);
        assert!(tracked.watched());
        assert_eq!(tracked.date_finished(), Some(now));
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
