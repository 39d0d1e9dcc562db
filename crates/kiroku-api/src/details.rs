//! Turning provider details into new library shows.

use kiroku_core::{ExternalLink, Season, Show};
use tracing::debug;

use crate::error::ProviderFailure;
use crate::traits::{MetadataProvider, SeasonDetails, ShowDetails};

/// Build a freshly added show from fetched details.
///
/// Seasons keep the given order and are numbered from 1. The show is marked
/// `just_added`; its rank is left for the library to assign.
pub fn build_show(details: ShowDetails, seasons: Vec<SeasonDetails>) -> Show {
    let mut show = Show::new(details.title, details.external_link);
    if let Some(image) = details.image_link {
        show = show.with_image(image);
    }

    let seasons: Vec<Season> = seasons.into_iter().map(build_season).collect();
    let _ = show.add_seasons(seasons, Some(0));
    show.set_just_added(true);
    show
}

fn build_season(details: SeasonDetails) -> Season {
    let mut season = Season::new(details.title, details.episode_titles).with_link(details.external_link);
    if let Some(media_type) = details.media_type {
        season = season.with_media_type(media_type);
    }
    let _ = season.set_score(details.score);
    season
}

/// Fetch a show and every one of its seasons, then build it.
///
/// The first failing lookup is returned; nothing partial is built.
pub async fn fetch_new_show<P: MetadataProvider>(
    provider: &P,
    link: &ExternalLink,
) -> Result<Show, ProviderFailure> {
    if link.is_none() {
        return Err(ProviderFailure::Unlinked);
    }
    let details = provider.fetch_show_details(link).await?;
    let mut seasons = Vec::with_capacity(details.season_links.len());
    for season_link in &details.season_links {
        seasons.push(provider.fetch_season_details(season_link).await?);
    }
    debug!(title = %details.title, seasons = seasons.len(), "Fetched show details");
    Ok(build_show(details, seasons))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CandidateShow;

    struct FakeProvider {
        fail_season: Option<u64>,
    }

    impl MetadataProvider for FakeProvider {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<CandidateShow>, ProviderFailure> {
            Ok(Vec::new())
        }

        async fn fetch_show_details(&self, link: &ExternalLink) -> Result<ShowDetails, ProviderFailure> {
            Ok(ShowDetails {
                title: "Made in Abyss".into(),
                image_link: Some("abyss.jpg".into()),
                external_link: link.clone(),
                season_links: vec![
                    ExternalLink::tmdb(72636, None, Some(1)),
                    ExternalLink::tmdb(72636, None, Some(2)),
                ],
            })
        }

        async fn fetch_season_details(&self, link: &ExternalLink) -> Result<SeasonDetails, ProviderFailure> {
            let ExternalLink::Tmdb {
                season_id: Some(id), ..
            } = link
            else {
                return Err(ProviderFailure::Unlinked);
            };
            if self.fail_season == Some(*id) {
                return Err(ProviderFailure::api(404, "season not found"));
            }
            Ok(SeasonDetails {
                title: format!("Season {id}"),
                external_link: link.clone(),
                media_type: Some("tv".into()),
                episode_titles: vec!["a".into(), "b".into()],
                score: Some(8.5),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_new_show() {
        let provider = FakeProvider { fail_season: None };
        let show = fetch_new_show(&provider, &ExternalLink::tmdb(72636, None, None))
            .await
            .unwrap();

        assert!(show.just_added());
        assert_eq!(show.key(), "B72636tv");
        assert_eq!(show.image_link(), Some("abyss.jpg"));
        let numbers: Vec<u32> = show.seasons().iter().map(Season::season_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(show.seasons()[1].score(), Some(8.5));
        assert_eq!(show.seasons()[1].episodes().len(), 2);
        assert!(!show.watched());
    }

    #[tokio::test]
    async fn test_season_failure_is_returned() {
        let provider = FakeProvider {
            fail_season: Some(2),
        };
        let err = fetch_new_show(&provider, &ExternalLink::tmdb(72636, None, None))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_unlinked_lookup() {
        let provider = FakeProvider { fail_season: None };
        let err = fetch_new_show(&provider, &ExternalLink::None).await.unwrap_err();
        assert!(matches!(err, ProviderFailure::Unlinked));
    }

    #[test]
    fn test_build_show_keeps_provider_order() {
        let details = ShowDetails {
            title: "Overlord".into(),
            image_link: None,
            external_link: ExternalLink::mal(29803),
            season_links: Vec::new(),
        };
        let seasons = ["Overlord III", "Overlord", "Overlord II"]
            .into_iter()
            .map(|title| SeasonDetails {
                title: title.into(),
                external_link: ExternalLink::None,
                media_type: None,
                episode_titles: Vec::new(),
                score: None,
            })
            .collect();
        let show = build_show(details, seasons);
        let titles: Vec<&str> = show.seasons().iter().map(Season::title).collect();
        assert_eq!(titles, vec!["Overlord III", "Overlord", "Overlord II"]);
    }
}
