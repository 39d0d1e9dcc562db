//! Trait definitions for remote metadata and sync providers.
//!
//! The library only ever talks to these traits, so tests and the CLI can
//! plug in offline implementations.

use std::future::Future;

use chrono::{DateTime, Utc};
use kiroku_core::{ExternalLink, LinkKind, Show};

use crate::error::ProviderFailure;

/// Search and detail lookups against a remote catalogue.
pub trait MetadataProvider: Send + Sync {
    /// Search for shows by title.
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CandidateShow>, ProviderFailure>> + Send;

    /// Fetch a show and the links of its seasons.
    fn fetch_show_details(
        &self,
        link: &ExternalLink,
    ) -> impl Future<Output = Result<ShowDetails, ProviderFailure>> + Send;

    /// Fetch one season with its episode list.
    fn fetch_season_details(
        &self,
        link: &ExternalLink,
    ) -> impl Future<Output = Result<SeasonDetails, ProviderFailure>> + Send;
}

/// Pushes watch progress to a user's remote account.
pub trait SyncProvider: Send + Sync {
    /// Whether the user has connected an account for this provider.
    fn is_authorized(&self, kind: LinkKind) -> bool;

    fn push_watch_status(
        &self,
        update: &WatchStatusUpdate,
    ) -> impl Future<Output = Result<(), ProviderFailure>> + Send;
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateShow {
    pub title: String,
    pub external_link: ExternalLink,
    pub image_link: Option<String>,
    pub media_type: Option<String>,
    pub year: Option<i32>,
    pub overview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShowDetails {
    pub title: String,
    pub image_link: Option<String>,
    pub external_link: ExternalLink,
    /// Links of the show's seasons, in airing order.
    pub season_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeasonDetails {
    pub title: String,
    pub external_link: ExternalLink,
    pub media_type: Option<String>,
    pub episode_titles: Vec<String>,
    pub score: Option<f64>,
}

/// Watch progress of one season, as pushed to a sync provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WatchStatusUpdate {
    /// Season link, or the show's link when the season has none.
    pub link: ExternalLink,
    pub show_title: String,
    pub season_title: String,
    pub watched_episodes: u32,
    pub total_episodes: u32,
    pub completed: bool,
    pub score: Option<f64>,
    pub date_started: Option<DateTime<Utc>>,
    pub date_finished: Option<DateTime<Utc>>,
}

impl WatchStatusUpdate {
    /// Snapshot a season's progress. `None` when neither the season nor the
    /// show is linked, or the index is out of range.
    pub fn for_season(show: &Show, season_index: usize) -> Option<Self> {
        let season = show.season(season_index)?;
        let link = if season.external_link().is_none() {
            show.external_link()
        } else {
            season.external_link()
        };
        if link.is_none() {
            return None;
        }
        Some(Self {
            link: link.clone(),
            show_title: show.title().to_string(),
            season_title: season.title().to_string(),
            watched_episodes: season.watched_count() as u32,
            total_episodes: season.episodes().len() as u32,
            completed: season.watched(),
            score: season.score(),
            date_started: season.date_started(),
            date_finished: season.date_finished(),
        })
    }

    pub fn kind(&self) -> Option<LinkKind> {
        self.link.kind()
    }
}

#[cfg(test)]
mod tests {
    use kiroku_core::Season;

    use super::*;

    #[test]
    fn test_update_prefers_season_link() {
        let mut show = Show::new("Bocchi", ExternalLink::tmdb(119100, None, None));
        let _ = show.add_seasons(
            vec![
                Season::new("Season 1", ["1", "2", "3"])
                    .with_link(ExternalLink::tmdb(119100, None, Some(5))),
                Season::new("Specials", ["OVA"]),
            ],
            None,
        );
        let _ = show.set_episode_watched(0, 0, true);

        let update = WatchStatusUpdate::for_season(&show, 0).unwrap();
        assert_eq!(update.link, ExternalLink::tmdb(119100, None, Some(5)));
        assert_eq!(update.watched_episodes, 1);
        assert_eq!(update.total_episodes, 3);
        assert!(!update.completed);

        let fallback = WatchStatusUpdate::for_season(&show, 1).unwrap();
        assert_eq!(fallback.link, *show.external_link());
        assert_eq!(fallback.kind(), Some(LinkKind::Tmdb));
    }

    #[test]
    fn test_unlinked_show_has_no_update() {
        let mut show = Show::new("Home video", ExternalLink::None);
        let _ = show.add_seasons(vec![Season::new("Season 1", ["1"])], None);
        assert!(WatchStatusUpdate::for_season(&show, 0).is_none());
        assert!(WatchStatusUpdate::for_season(&show, 3).is_none());
    }
}
