use serde::{Deserialize, Serialize};

/// Media kind assumed for provider-B links that don't carry one.
pub const DEFAULT_MEDIA_KIND: &str = "tv";

/// Remote metadata provider a show or season can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Anime database keyed by a single numeric id.
    #[serde(rename = "A")]
    Mal,
    /// Movie/TV database keyed by id, media kind and optional season id.
    #[serde(rename = "B")]
    Tmdb,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mal => "A",
            Self::Tmdb => "B",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference tying a show or season to a remote provider record.
///
/// Only [`ExternalLink::Tmdb`] can carry a season id; the other shapes have
/// nowhere to put one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "LinkRecord", try_from = "LinkRecord")]
pub enum ExternalLink {
    #[default]
    None,
    Mal {
        id: u64,
    },
    Tmdb {
        id: u64,
        media_kind: String,
        season_id: Option<u64>,
    },
}

impl ExternalLink {
    pub fn mal(id: u64) -> Self {
        Self::Mal { id }
    }

    /// Build a provider-B link, falling back to [`DEFAULT_MEDIA_KIND`].
    pub fn tmdb(id: u64, media_kind: Option<&str>, season_id: Option<u64>) -> Self {
        Self::Tmdb {
            id,
            media_kind: media_kind
                .filter(|k| !k.is_empty())
                .unwrap_or(DEFAULT_MEDIA_KIND)
                .to_string(),
            season_id,
        }
    }

    pub fn kind(&self) -> Option<LinkKind> {
        match self {
            Self::None => None,
            Self::Mal { .. } => Some(LinkKind::Mal),
            Self::Tmdb { .. } => Some(LinkKind::Tmdb),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Stable identity string used as map key and storage primary key.
    ///
    /// Unlinked entries key off `fallback_title`, so two unlinked shows with
    /// the same title collide. Changing this derivation changes every stored key.
    pub fn identity(&self, fallback_title: &str) -> String {
        match self {
            Self::None => fallback_title.to_string(),
            Self::Mal { id } => format!("{}{id}", LinkKind::Mal),
            Self::Tmdb {
                id,
                media_kind,
                season_id: Some(season_id),
            } => format!("{}{id}{media_kind}{season_id}", LinkKind::Tmdb),
            Self::Tmdb {
                id,
                media_kind,
                season_id: None,
            } => format!("{}{id}{media_kind}", LinkKind::Tmdb),
        }
    }
}

/// Wire shape of an [`ExternalLink`]: `{ type, id?, mediaKind?, seasonId? }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    #[serde(rename = "type")]
    pub kind: Option<LinkKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_id: Option<u64>,
}

impl From<ExternalLink> for LinkRecord {
    fn from(link: ExternalLink) -> Self {
        match link {
            ExternalLink::None => Self::default(),
            ExternalLink::Mal { id } => Self {
                kind: Some(LinkKind::Mal),
                id: Some(id),
                ..Default::default()
            },
            ExternalLink::Tmdb {
                id,
                media_kind,
                season_id,
            } => Self {
                kind: Some(LinkKind::Tmdb),
                id: Some(id),
                media_kind: Some(media_kind),
                season_id,
            },
        }
    }
}

impl TryFrom<LinkRecord> for ExternalLink {
    type Error = String;

    fn try_from(record: LinkRecord) -> Result<Self, Self::Error> {
        match record.kind {
            None => Ok(Self::None),
            Some(kind) => {
                let id = record.id.ok_or("id is missing")?;
                match kind {
                    LinkKind::Mal if record.season_id.is_some() => {
                        Err("seasonId is only allowed on provider B links".into())
                    }
                    LinkKind::Mal => Ok(Self::Mal { id }),
                    LinkKind::Tmdb => Ok(Self::tmdb(
                        id,
                        record.media_kind.as_deref(),
                        record.season_id,
                    )),
                }
            }
        }
    }
}
