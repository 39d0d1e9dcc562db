//! JSON library export and import.
//!
//! Export writes the record shape minus derived fields. Import accepts the
//! same shape plus two legacy quirks: dates written in epoch seconds, and a
//! season id nested under `externalLink.season.id`.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::KirokuError;
use crate::models::Show;
use crate::record::{ShowRecord, ValidationError};

const DATE_FIELDS: &[&str] = &["dateStarted", "dateFinished"];

/// Serialize shows, in the order given, as a pretty JSON array.
pub fn export_shows<'a>(shows: impl IntoIterator<Item = &'a Show>) -> Result<String, KirokuError> {
    let records: Vec<ShowRecord> = shows.into_iter().map(|s| s.to_record().stripped()).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// A record from an import file that failed validation.
#[derive(Debug, Clone)]
pub struct Rejected {
    /// Index of the record in the file.
    pub position: usize,
    pub error: ValidationError,
}

/// Parsed import file.
#[derive(Debug, Default)]
pub struct ImportBatch {
    /// Valid shows, sorted by their recorded `order` (file position breaks ties).
    pub shows: Vec<Show>,
    pub rejected: Vec<Rejected>,
    /// Keys seen again after their first valid record in the file; the
    /// later copies are dropped.
    pub duplicates: Vec<String>,
}

/// Parse an import file, validating each record independently.
///
/// Only a file that isn't a JSON array fails as a whole; bad records are
/// collected in [`ImportBatch::rejected`].
pub fn parse_import(json: &str, legacy_seconds_threshold: i64) -> Result<ImportBatch, KirokuError> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Array(items) = value else {
        return Err(KirokuError::Import("expected a JSON array of shows".into()));
    };

    let mut batch = ImportBatch::default();
    let mut seen = HashSet::new();
    for (position, mut item) in items.into_iter().enumerate() {
        migrate_legacy(&mut item);
        normalize_dates(&mut item, legacy_seconds_threshold);

        let parsed = serde_json::from_value::<ShowRecord>(item)
            .map_err(|e| ValidationError::unreadable(e.to_string()))
            .and_then(Show::from_record);
        match parsed {
            Ok(show) => {
                let key = show.key();
                if seen.insert(key.clone()) {
                    batch.shows.push(show);
                } else {
                    warn!(position, key = %key, "Duplicate show in import file");
                    batch.duplicates.push(key);
                }
            }
            Err(error) => {
                debug!(position, %error, "Rejected import record");
                batch.rejected.push(Rejected { position, error });
            }
        }
    }
    batch.shows.sort_by_key(Show::order);
    Ok(batch)
}

/// Move a season id nested as `externalLink.season.id` up to `externalLink.seasonId`.
pub fn migrate_legacy(show: &mut Value) {
    let Some(seasons) = show.get_mut("seasons").and_then(Value::as_array_mut) else {
        return;
    };
    for season in seasons {
        let Some(link) = season.get_mut("externalLink").and_then(Value::as_object_mut) else {
            continue;
        };
        let Some(nested) = link.remove("season") else {
            continue;
        };
        if let Some(id) = nested.get("id").filter(|id| !id.is_null()) {
            link.entry("seasonId").or_insert_with(|| id.clone());
        }
    }
}

/// Scale legacy epoch-second dates below `threshold` up to epoch millis.
pub fn normalize_dates(show: &mut Value, threshold: i64) {
    scale_dates(show, threshold);
    if let Some(seasons) = show.get_mut("seasons").and_then(Value::as_array_mut) {
        for season in seasons {
            scale_dates(season, threshold);
        }
    }
}

fn scale_dates(object: &mut Value, threshold: i64) {
    for field in DATE_FIELDS {
        let Some(slot) = object.get_mut(*field) else {
            continue;
        };
        // Fractional values from old exports are truncated to whole units.
        let raw = slot.as_i64().or_else(|| slot.as_f64().map(|f| f as i64));
        if let Some(raw) = raw {
            let millis = if raw > 0 && raw < threshold {
                raw.saturating_mul(1000)
            } else {
                raw
            };
            *slot = Value::from(millis);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{ExternalLink, Season};

    const THRESHOLD: i64 = 100_000_000_000;

    #[test]
    fn test_export_then_import() {
        let mut show = Show::new("Mushishi", ExternalLink::mal(457));
        let _ = show.add_seasons(vec![Season::new("Season 1", ["The Green Seat"])], None);
        let _ = show.set_all_watched(true);
        let _ = show.set_date_finished(chrono::DateTime::from_timestamp_millis(1_700_000_000_000));

        let json = export_shows([&show]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert!(value[0].get("watched").is_none());
        assert_eq!(value[0]["seasons"][0]["episodes"][0]["watched"], true);

        let batch = parse_import(&json, THRESHOLD).unwrap();
        assert!(batch.rejected.is_empty());
        assert_eq!(batch.shows, vec![show]);
    }

    #[test]
    fn test_one_invalid_one_valid() {
        let json = json!([
            { "seasons": [] },
            { "title": "Valid", "seasons": [], "order": 0 }
        ])
        .to_string();
        let batch = parse_import(&json, THRESHOLD).unwrap();
        assert_eq!(batch.shows.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].position, 0);
    }

    #[test]
    fn test_wrong_types_are_rejected_per_record() {
        let json = json!([
            { "title": 5, "seasons": [] },
            { "title": "Fine", "seasons": [] }
        ])
        .to_string();
        let batch = parse_import(&json, THRESHOLD).unwrap();
        assert_eq!(batch.shows.len(), 1);
        assert_eq!(batch.rejected[0].error.issues[0].path, "record");
    }

    #[test]
    fn test_not_an_array() {
        assert!(matches!(
            parse_import("{\"title\": \"x\"}", THRESHOLD),
            Err(KirokuError::Import(_))
        ));
        assert!(matches!(parse_import("[", THRESHOLD), Err(KirokuError::Json(_))));
    }

    #[test]
    fn test_sorted_by_recorded_order() {
        let json = json!([
            { "title": "C", "seasons": [], "order": 9 },
            { "title": "A", "seasons": [], "order": 1 },
            { "title": "B", "seasons": [], "order": 1 }
        ])
        .to_string();
        let batch = parse_import(&json, THRESHOLD).unwrap();
        let titles: Vec<&str> = batch.shows.iter().map(Show::title).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_first_copy_of_a_key_wins() {
        let json = json!([
            { "title": "Kept", "externalLink": { "type": "A", "id": 1 }, "seasons": [], "order": 5 },
            { "title": "Dropped", "externalLink": { "type": "A", "id": 1 }, "seasons": [], "order": 0 },
            { "title": "Other", "seasons": [], "order": 1 }
        ])
        .to_string();
        let batch = parse_import(&json, THRESHOLD).unwrap();
        let titles: Vec<&str> = batch.shows.iter().map(Show::title).collect();
        assert_eq!(titles, vec!["Other", "Kept"]);
        assert_eq!(batch.duplicates, vec!["A1".to_string()]);
    }

    #[test]
    fn test_legacy_season_id_migrates() {
        let mut value = json!({
            "title": "Old",
            "seasons": [{
                "title": "S1",
                "episodes": [],
                "externalLink": { "type": "B", "id": 42, "season": { "id": 7 } }
            }]
        });
        migrate_legacy(&mut value);
        assert_eq!(
            value["seasons"][0]["externalLink"],
            json!({ "type": "B", "id": 42, "seasonId": 7 })
        );

        let record: ShowRecord = serde_json::from_value(value).unwrap();
        let show = Show::from_record(record).unwrap();
        assert_eq!(
            show.seasons()[0].external_link(),
            &ExternalLink::tmdb(42, None, Some(7))
        );
    }

    #[test]
    fn test_legacy_seconds_are_scaled() {
        let mut value = json!({
            "title": "Dates",
            "dateStarted": 1_600_000_000,
            "dateFinished": 1_700_000_000_000_i64,
            "seasons": [{ "dateStarted": 1_650_000_000.0, "dateFinished": null }]
        });
        normalize_dates(&mut value, THRESHOLD);
        assert_eq!(value["dateStarted"], 1_600_000_000_000_i64);
        assert_eq!(value["dateFinished"], 1_700_000_000_000_i64);
        assert_eq!(value["seasons"][0]["dateStarted"], 1_650_000_000_000_i64);
        assert!(value["seasons"][0]["dateFinished"].is_null());
    }
}
