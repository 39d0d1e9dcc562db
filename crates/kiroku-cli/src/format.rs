use kiroku_core::{Season, Show};
use kiroku_runtime::{Notification, NotificationKind};

fn progress(show: &Show) -> (usize, usize) {
    show.seasons().iter().fold((0, 0), |(watched, total), season| {
        (watched + season.watched_count(), total + season.episodes().len())
    })
}

fn status(show: &Show) -> &'static str {
    if show.watched() {
        "done"
    } else if show.watching() {
        "watching"
    } else {
        ""
    }
}

/// One line of `kiroku list`.
pub fn show_line(show: &Show) -> String {
    let (watched, total) = progress(show);
    format!(
        "{:>3}  {:<40}  {:>4}/{:<4} {:<8}  {}",
        show.order(),
        show.title(),
        watched,
        total,
        status(show),
        show.key()
    )
}

fn season_block(season: &Season) -> String {
    let mut out = format!(
        "  Season {} - {} [{}/{}]\n",
        season.season_number(),
        season.title(),
        season.watched_count(),
        season.episodes().len()
    );
    for episode in season.episodes() {
        let mark = if episode.watched() { 'x' } else { ' ' };
        out.push_str(&format!(
            "    [{mark}] {:>3}  {}\n",
            episode.episode_number(),
            episode.title()
        ));
    }
    out
}

/// Full listing of one show for `kiroku show`.
pub fn show_details(show: &Show) -> String {
    let (watched, total) = progress(show);
    let mut out = format!("{} ({})\n", show.title(), show.key());
    out.push_str(&format!("  rank {}, {watched}/{total} watched\n", show.order()));
    if let Some(started) = show.date_started() {
        out.push_str(&format!("  started  {}\n", started.format("%Y-%m-%d")));
    }
    if let Some(finished) = show.date_finished() {
        out.push_str(&format!("  finished {}\n", finished.format("%Y-%m-%d")));
    }
    for season in show.seasons() {
        out.push_str(&season_block(season));
    }
    out
}

pub fn notification(note: &Notification) -> String {
    let label = match note.kind {
        NotificationKind::Info => "info",
        NotificationKind::Success => "ok",
        NotificationKind::Warning => "warning",
        NotificationKind::Error => "error",
    };
    match &note.detail {
        Some(detail) => format!("{label}: {}\n  {}", note.message, detail.replace('\n', "\n  ")),
        None => format!("{label}: {}", note.message),
    }
}

#[cfg(test)]
mod tests {
    use kiroku_core::ExternalLink;

    use super::*;

    fn sample() -> Show {
        let mut show = Show::new("Mushishi", ExternalLink::mal(457));
        let _ = show.add_seasons(vec![Season::new("Season 1", ["The Green Seat", "The Light of the Eyelid"])], None);
        let _ = show.set_episode_watched(0, 0, true);
        show
    }

    #[test]
    fn test_show_line() {
        let line = show_line(&sample());
        assert!(line.starts_with("  0  Mushishi"));
        assert!(line.contains("1/2"));
        assert!(line.contains("watching"));
        assert!(line.ends_with("A457"));
    }

    #[test]
    fn test_show_details_marks_episodes() {
        let details = show_details(&sample());
        assert!(details.contains("Season 1 - Season 1 [1/2]"));
        assert!(details.contains("[x]   0  The Green Seat"));
        assert!(details.contains("[ ]   1  The Light of the Eyelid"));
    }

    #[test]
    fn test_notification_with_detail() {
        let note = Notification::error("Could not sync \"Mushishi\"").with_detail(Some("{\n  \"error\": 1\n}".into()));
        assert_eq!(
            notification(&note),
            "error: Could not sync \"Mushishi\"\n  {\n    \"error\": 1\n  }"
        );
    }
}
