use crate::persist::{assign, Persist};

/// Smallest watch-tracked unit, owned by exactly one [`Season`](super::Season).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    title: String,
    episode_number: u32,
    watched: bool,
}

impl Episode {
    pub fn new(title: impl Into<String>, episode_number: u32) -> Self {
        Self {
            title: title.into(),
            episode_number,
            watched: false,
        }
    }

    pub fn with_watched(mut self, watched: bool) -> Self {
        self.watched = watched;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Dense 0-based position within the owning season.
    pub fn episode_number(&self) -> u32 {
        self.episode_number
    }

    pub fn watched(&self) -> bool {
        self.watched
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Persist {
        assign(&mut self.title, title.into())
    }

    // Season-level callers recompute the season's watched flag afterwards.
    pub(crate) fn set_watched(&mut self, watched: bool) -> Persist {
        assign(&mut self.watched, watched)
    }

    pub(crate) fn set_episode_number(&mut self, number: u32) -> Persist {
        assign(&mut self.episode_number, number)
    }
}
