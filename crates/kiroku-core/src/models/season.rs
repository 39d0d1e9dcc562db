use chrono::{DateTime, Utc};

use super::{Episode, ExternalLink};
use crate::persist::{assign, Persist};

/// A watchable unit within a show: an ordered run of episodes plus metadata.
///
/// Episode numbers stay a dense 0-based sequence through every add/remove,
/// and `watched` is recomputed by every mutator that can change it.
#[derive(Debug, Clone, PartialEq)]
pub struct Season {
    title: String,
    episodes: Vec<Episode>,
    watched: bool,
    season_number: u32,
    media_type: Option<String>,
    external_link: ExternalLink,
    score: Option<f64>,
    date_started: Option<DateTime<Utc>>,
    date_finished: Option<DateTime<Utc>>,
}

impl Season {
    /// Create an unwatched season with one episode per title.
    ///
    /// The season number is a placeholder until the season is added to a show.
    pub fn new<I, T>(title: impl Into<String>, episode_titles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let episodes = episode_titles
            .into_iter()
            .enumerate()
            .map(|(i, t)| Episode::new(t, i as u32))
            .collect();
        Self {
            title: title.into(),
            episodes,
            watched: false,
            season_number: 1,
            media_type: None,
            external_link: ExternalLink::None,
            score: None,
            date_started: None,
            date_finished: None,
        }
    }

    /// Rebuild a season from already-validated parts, renumbering episodes.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        title: String,
        episodes: Vec<Episode>,
        media_type: Option<String>,
        external_link: ExternalLink,
        score: Option<f64>,
        date_started: Option<DateTime<Utc>>,
        date_finished: Option<DateTime<Utc>>,
    ) -> Self {
        let mut season = Self {
            title,
            episodes,
            watched: false,
            season_number: 1,
            media_type,
            external_link,
            score,
            date_started,
            date_finished,
        };
        season.renumber_episodes();
        season.watched = season.check_watched_all();
        season
    }

    pub fn with_link(mut self, link: ExternalLink) -> Self {
        self.external_link = link;
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn episode(&self, number: u32) -> Option<&Episode> {
        self.episodes.get(number as usize)
    }

    pub fn watched(&self) -> bool {
        self.watched
    }

    /// Dense 1-based position within the owning show.
    pub fn season_number(&self) -> u32 {
        self.season_number
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn external_link(&self) -> &ExternalLink {
        &self.external_link
    }

    /// Identity key of this season (see [`ExternalLink::identity`]).
    pub fn key(&self) -> String {
        self.external_link.identity(&self.title)
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn date_started(&self) -> Option<DateTime<Utc>> {
        self.date_started
    }

    pub fn date_finished(&self) -> Option<DateTime<Utc>> {
        self.date_finished
    }

    pub fn watched_count(&self) -> usize {
        self.episodes.iter().filter(|e| e.watched()).count()
    }

    /// True iff the season has episodes and every one of them is watched.
    pub fn check_watched_all(&self) -> bool {
        !self.episodes.is_empty() && self.episodes.iter().all(Episode::watched)
    }

    // ── Metadata ────────────────────────────────────────────────

    pub fn set_title(&mut self, title: impl Into<String>) -> Persist {
        assign(&mut self.title, title.into())
    }

    pub fn set_media_type(&mut self, media_type: Option<String>) -> Persist {
        assign(&mut self.media_type, media_type)
    }

    pub fn set_external_link(&mut self, link: ExternalLink) -> Persist {
        assign(&mut self.external_link, link)
    }

    pub fn set_score(&mut self, score: Option<f64>) -> Persist {
        assign(&mut self.score, score)
    }

    pub fn set_date_started(&mut self, date: Option<DateTime<Utc>>) -> Persist {
        assign(&mut self.date_started, date)
    }

    pub fn set_date_finished(&mut self, date: Option<DateTime<Utc>>) -> Persist {
        assign(&mut self.date_finished, date)
    }

    pub(crate) fn set_season_number(&mut self, number: u32) -> Persist {
        assign(&mut self.season_number, number)
    }

    // ── Episodes ────────────────────────────────────────────────

    /// Append an episode numbered after the current last one.
    pub fn add_episode(&mut self, title: impl Into<String>) -> Persist {
        let number = self.episodes.len() as u32;
        self.episodes.push(Episode::new(title, number));
        self.recompute_watched();
        Persist::Dirty
    }

    /// Remove the episode with `number`, shifting every later episode down by one.
    pub fn remove_episode(&mut self, number: u32) -> Persist {
        let index = number as usize;
        if index >= self.episodes.len() {
            return Persist::Clean;
        }
        self.episodes.remove(index);
        self.renumber_episodes();
        self.recompute_watched();
        Persist::Dirty
    }

    pub fn set_episode_title(&mut self, number: u32, title: impl Into<String>) -> Persist {
        match self.episodes.get_mut(number as usize) {
            Some(episode) => episode.set_title(title),
            None => Persist::Clean,
        }
    }

    pub fn set_episode_watched(&mut self, number: u32, watched: bool) -> Persist {
        let changed = match self.episodes.get_mut(number as usize) {
            Some(episode) => episode.set_watched(watched),
            None => return Persist::Clean,
        };
        changed | self.recompute_watched()
    }

    /// Mark every episode watched or unwatched at once.
    pub fn set_all_watched(&mut self, watched: bool) -> Persist {
        let mut changed = Persist::Clean;
        for episode in &mut self.episodes {
            changed |= episode.set_watched(watched);
        }
        changed | self.recompute_watched()
    }

    /// Back-fill the season dates after a watch transition.
    ///
    /// `date_started` is set on the first watched episode and `date_finished`
    /// once every episode is watched; dates already set are left alone.
    pub fn update_date(&mut self, now: DateTime<Utc>) -> Persist {
        let mut changed = Persist::Clean;
        if self.date_started.is_none() && self.watched_count() > 0 {
            changed |= self.set_date_started(Some(now));
        }
        if self.date_finished.is_none() && self.watched {
            changed |= self.set_date_finished(Some(now));
        }
        changed
    }

    pub(crate) fn recompute_watched(&mut self) -> Persist {
        let watched = self.check_watched_all();
        assign(&mut self.watched, watched)
    }

    fn renumber_episodes(&mut self) {
        for (i, episode) in self.episodes.iter_mut().enumerate() {
            let _ = episode.set_episode_number(i as u32);
        }
    }
}
