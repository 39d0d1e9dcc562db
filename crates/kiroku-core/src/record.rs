//! Persisted record shape and structural validation.
//!
//! Records come from untrusted places (the store, import files), so every
//! field is optional on the way in. [`Show::from_record`] collects every
//! missing or malformed field into one [`ValidationError`] instead of
//! stopping at the first.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Episode, ExternalLink, LinkRecord, Season, Show};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowRecord {
    pub title: Option<String>,
    pub seasons: Option<Vec<SeasonRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
    pub image_link: Option<String>,
    #[serde(default)]
    pub external_link: LinkRecord,
    pub order: Option<u32>,
    pub date_started: Option<i64>,
    pub date_finished: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRecord {
    pub title: Option<String>,
    pub season_number: Option<u32>,
    pub episodes: Option<Vec<EpisodeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
    pub media_type: Option<String>,
    #[serde(default)]
    pub external_link: LinkRecord,
    pub score: Option<f64>,
    pub date_started: Option<i64>,
    pub date_finished: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRecord {
    pub title: Option<String>,
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub watched: bool,
}

impl ShowRecord {
    /// Drop fields that are derived on load (`watched` at show and season level).
    pub fn stripped(mut self) -> Self {
        self.watched = None;
        for season in self.seasons.iter_mut().flatten() {
            season.watched = None;
        }
        self
    }
}

/// One problem found while validating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Field path relative to the show, e.g. `seasons[1].episodes[0].episodeNumber`.
    pub path: String,
    pub message: String,
}

/// Every structural problem found in one show record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Title of the offending show, when it has one.
    pub title: Option<String>,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// An error for a record that could not be decoded at all.
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self {
            title: None,
            issues: vec![FieldIssue {
                path: "record".into(),
                message: message.into(),
            }],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.title.as_deref().unwrap_or("<untitled>"))?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", issue.path, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Default)]
struct Issues(Vec<FieldIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn required<T>(&mut self, value: Option<T>, path: impl Into<String>) -> Option<T> {
        if value.is_none() {
            self.push(path, "is missing");
        }
        value
    }

    /// `parent` is the owning entity's path, empty for the show itself.
    fn link(&mut self, record: LinkRecord, parent: &str) -> ExternalLink {
        ExternalLink::try_from(record).unwrap_or_else(|msg| {
            let path = match parent {
                "" => "externalLink".to_string(),
                parent => format!("{parent}.externalLink"),
            };
            self.push(path, msg);
            ExternalLink::None
        })
    }

    fn date(&mut self, millis: Option<i64>, path: String) -> Option<DateTime<Utc>> {
        let millis = millis?;
        let date = DateTime::from_timestamp_millis(millis);
        if date.is_none() {
            self.push(path, format!("{millis} is not a valid timestamp"));
        }
        date
    }
}

fn millis(date: Option<DateTime<Utc>>) -> Option<i64> {
    date.map(|d| d.timestamp_millis())
}

impl Show {
    /// Full persisted shape, including derived `watched` flags.
    pub fn to_record(&self) -> ShowRecord {
        ShowRecord {
            title: Some(self.title().to_string()),
            seasons: Some(self.seasons().iter().map(season_to_record).collect()),
            watched: Some(self.watched()),
            image_link: self.image_link().map(str::to_string),
            external_link: self.external_link().clone().into(),
            order: Some(self.order()),
            date_started: millis(self.date_started()),
            date_finished: millis(self.date_finished()),
        }
    }

    /// Validate and rebuild a show from an untrusted record.
    ///
    /// Seasons and episodes are put in their recorded number order and then
    /// renumbered densely; stored `watched` flags are recomputed from episodes.
    pub fn from_record(record: ShowRecord) -> Result<Show, ValidationError> {
        let mut issues = Issues::default();
        let title = issues.required(record.title, "title");
        let link = issues.link(record.external_link, "");
        let seasons = issues.required(record.seasons, "seasons").unwrap_or_default();

        let mut numbered: Vec<(u32, Season)> = Vec::with_capacity(seasons.len());
        for (si, season) in seasons.into_iter().enumerate() {
            let path = format!("seasons[{si}]");
            let season_title = issues.required(season.title, format!("{path}.title"));
            let season_link = issues.link(season.external_link, &path);
            let episodes = issues
                .required(season.episodes, format!("{path}.episodes"))
                .unwrap_or_default();

            let mut parsed: Vec<(u32, Episode)> = Vec::with_capacity(episodes.len());
            for (ei, episode) in episodes.into_iter().enumerate() {
                let ep_path = format!("{path}.episodes[{ei}]");
                let ep_title = issues.required(episode.title, format!("{ep_path}.title"));
                let number =
                    issues.required(episode.episode_number, format!("{ep_path}.episodeNumber"));
                if let (Some(ep_title), Some(number)) = (ep_title, number) {
                    parsed.push((number, Episode::new(ep_title, number).with_watched(episode.watched)));
                }
            }
            parsed.sort_by_key(|(n, _)| *n);

            let started = issues.date(season.date_started, format!("{path}.dateStarted"));
            let finished = issues.date(season.date_finished, format!("{path}.dateFinished"));
            if let Some(season_title) = season_title {
                let position = season.season_number.unwrap_or(si as u32 + 1);
                numbered.push((
                    position,
                    Season::from_parts(
                        season_title,
                        parsed.into_iter().map(|(_, e)| e).collect(),
                        season.media_type,
                        season_link,
                        season.score,
                        started,
                        finished,
                    ),
                ));
            }
        }
        numbered.sort_by_key(|(n, _)| *n);

        let started = issues.date(record.date_started, "dateStarted".into());
        let finished = issues.date(record.date_finished, "dateFinished".into());

        match title {
            Some(title) if issues.0.is_empty() => Ok(Show::from_parts(
                title,
                numbered.into_iter().map(|(_, s)| s).collect(),
                record.image_link,
                link,
                record.order.unwrap_or_default(),
                started,
                finished,
            )),
            title => Err(ValidationError {
                title,
                issues: issues.0,
            }),
        }
    }
}

fn season_to_record(season: &Season) -> SeasonRecord {
    SeasonRecord {
        title: Some(season.title().to_string()),
        season_number: Some(season.season_number()),
        episodes: Some(
            season
                .episodes()
                .iter()
                .map(|e| EpisodeRecord {
                    title: Some(e.title().to_string()),
                    episode_number: Some(e.episode_number()),
                    watched: e.watched(),
                })
                .collect(),
        ),
        watched: Some(season.watched()),
        media_type: season.media_type().map(str::to_string),
        external_link: season.external_link().clone().into(),
        score: season.score(),
        date_started: millis(season.date_started()),
        date_finished: millis(season.date_finished()),
    }
}
