use chrono::{DateTime, Utc};

use super::{ExternalLink, Season};
use crate::persist::{assign, Persist};
use crate::season_number::infer_season_number;

/// Top-level tracked series and the unit of persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Show {
    title: String,
    seasons: Vec<Season>,
    watched: bool,
    image_link: Option<String>,
    external_link: ExternalLink,
    order: u32,
    date_started: Option<DateTime<Utc>>,
    date_finished: Option<DateTime<Utc>>,
    just_added: bool,
}

impl Show {
    pub fn new(title: impl Into<String>, external_link: ExternalLink) -> Self {
        Self {
            title: title.into(),
            seasons: Vec::new(),
            watched: false,
            image_link: None,
            external_link,
            order: 0,
            date_started: None,
            date_finished: None,
            just_added: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        title: String,
        seasons: Vec<Season>,
        image_link: Option<String>,
        external_link: ExternalLink,
        order: u32,
        date_started: Option<DateTime<Utc>>,
        date_finished: Option<DateTime<Utc>>,
    ) -> Self {
        let mut show = Self {
            title,
            seasons,
            watched: false,
            image_link,
            external_link,
            order,
            date_started,
            date_finished,
            just_added: false,
        };
        show.renumber_seasons(0);
        show.watched = show.check_watched_all();
        show
    }

    pub fn with_image(mut self, image_link: impl Into<String>) -> Self {
        self.image_link = Some(image_link.into());
        self
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn season(&self, index: usize) -> Option<&Season> {
        self.seasons.get(index)
    }

    pub fn watched(&self) -> bool {
        self.watched
    }

    /// Some progress exists but the show isn't complete.
    pub fn watching(&self) -> bool {
        !self.watched
            && self
                .seasons
                .iter()
                .any(|s| s.watched() || s.episodes().iter().any(|e| e.watched()))
    }

    pub fn image_link(&self) -> Option<&str> {
        self.image_link.as_deref()
    }

    pub fn external_link(&self) -> &ExternalLink {
        &self.external_link
    }

    /// Dense 0-based display rank across the whole library.
    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn date_started(&self) -> Option<DateTime<Utc>> {
        self.date_started
    }

    pub fn date_finished(&self) -> Option<DateTime<Utc>> {
        self.date_finished
    }

    /// Set on shows created in this session; never persisted.
    pub fn just_added(&self) -> bool {
        self.just_added
    }

    /// Storage primary key, derived from the external link and title.
    pub fn key(&self) -> String {
        self.external_link.identity(&self.title)
    }

    /// True iff the show has seasons and every season is fully watched.
    pub fn check_watched_all(&self) -> bool {
        !self.seasons.is_empty() && self.seasons.iter().all(Season::check_watched_all)
    }

    // ── Metadata ────────────────────────────────────────────────

    pub fn set_title(&mut self, title: impl Into<String>) -> Persist {
        assign(&mut self.title, title.into())
    }

    pub fn set_image_link(&mut self, image_link: Option<String>) -> Persist {
        assign(&mut self.image_link, image_link)
    }

    pub fn set_external_link(&mut self, link: ExternalLink) -> Persist {
        assign(&mut self.external_link, link)
    }

    pub fn set_order(&mut self, order: u32) -> Persist {
        assign(&mut self.order, order)
    }

    pub fn set_date_started(&mut self, date: Option<DateTime<Utc>>) -> Persist {
        assign(&mut self.date_started, date)
    }

    pub fn set_date_finished(&mut self, date: Option<DateTime<Utc>>) -> Persist {
        assign(&mut self.date_finished, date)
    }

    /// Transient flag; changing it never needs a save.
    pub fn set_just_added(&mut self, just_added: bool) {
        self.just_added = just_added;
    }

    // ── Seasons ─────────────────────────────────────────────────

    /// Insert seasons at `at_index`, or where the first title suggests.
    ///
    /// Without an explicit index the first season's title is run through
    /// [`infer_season_number`]; "Season 2" lands at index 1 when that slot
    /// exists, everything else is appended. Numbering is always positional.
    pub fn add_seasons(&mut self, new_seasons: Vec<Season>, at_index: Option<usize>) -> Persist {
        if new_seasons.is_empty() {
            return Persist::Clean;
        }
        let index = at_index
            .or_else(|| {
                new_seasons
                    .first()
                    .and_then(|s| infer_season_number(s.title()))
                    .map(|n| n.saturating_sub(1) as usize)
            })
            .unwrap_or(self.seasons.len())
            .min(self.seasons.len());

        self.seasons.splice(index..index, new_seasons);
        self.renumber_seasons(index);
        self.recompute_watched();
        if !self.watched {
            let _ = self.set_date_finished(None);
        }
        Persist::Dirty
    }

    /// Remove one season, renumbering the ones after it.
    pub fn remove_season_at_index(&mut self, index: usize) -> Persist {
        if index >= self.seasons.len() {
            return Persist::Clean;
        }
        self.seasons.remove(index);
        self.renumber_seasons(index);
        self.recompute_watched();
        if self.seasons.is_empty() {
            let _ = self.set_date_started(None);
            let _ = self.set_date_finished(None);
        }
        Persist::Dirty
    }

    /// Run a season-level command, then refresh the show's derived state.
    pub fn edit_season(&mut self, index: usize, f: impl FnOnce(&mut Season) -> Persist) -> Persist {
        let Some(season) = self.seasons.get_mut(index) else {
            return Persist::Clean;
        };
        f(season) | self.recompute_watched()
    }

    pub fn set_episode_watched(&mut self, season_index: usize, episode: u32, watched: bool) -> Persist {
        self.edit_season(season_index, |s| s.set_episode_watched(episode, watched))
    }

    /// Mark every episode of every season.
    pub fn set_all_watched(&mut self, watched: bool) -> Persist {
        let mut changed = Persist::Clean;
        for season in &mut self.seasons {
            changed |= season.set_all_watched(watched);
        }
        changed | self.recompute_watched()
    }

    /// Back-fill show dates from the first and last seasons, keeping dates already set.
    pub fn update_date(&mut self) -> Persist {
        let mut changed = Persist::Clean;
        if self.date_started.is_none() {
            if let Some(started) = self.seasons.first().and_then(Season::date_started) {
                changed |= self.set_date_started(Some(started));
            }
        }
        if self.date_finished.is_none() {
            if let Some(finished) = self.seasons.last().and_then(Season::date_finished) {
                changed |= self.set_date_finished(Some(finished));
            }
        }
        changed
    }

    fn recompute_watched(&mut self) -> Persist {
        let watched = self.check_watched_all();
        assign(&mut self.watched, watched)
    }

    fn renumber_seasons(&mut self, from: usize) {
        for (i, season) in self.seasons.iter_mut().enumerate().skip(from) {
            let _ = season.set_season_number(i as u32 + 1);
        }
    }
}
