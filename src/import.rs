//! Import Phish.net setlist JSON into the record store.
//!
//! The input is either a bare array of setlist entries or the API envelope
//! `{"error": false, "error_message": "", "data": [...]}`. Each entry is one
//! song performance; entries are grouped into shows by `showid`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::db::Database;
use crate::db::models::{Performance, SetLabel, Show, ShowId};
use crate::store::Catalog;

/// Phish.net artist id for Phish.
pub const PHISH_ARTIST_ID: i64 = 1;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Keep only entries by this artist. `None` keeps everything.
    pub artist_id: Option<i64>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            artist_id: Some(PHISH_ARTIST_ID),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub entries: usize,
    pub skipped_other_artists: usize,
    pub shows: usize,
    pub performances: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Bare(Vec<SetlistEntry>),
    Envelope {
        #[serde(default)]
        error: Value,
        #[serde(default)]
        error_message: Option<String>,
        data: Vec<SetlistEntry>,
    },
}

/// One row of a Phish.net setlist response.
#[derive(Debug, Deserialize)]
struct SetlistEntry {
    #[serde(default, deserialize_with = "lenient_i64")]
    showid: Option<i64>,
    showdate: String,
    song: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    artistid: Option<i64>,
    #[serde(default)]
    set: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    position: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    gap: Option<i64>,
    #[serde(default, deserialize_with = "lenient_duration")]
    tracktime: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    isjamchart: Option<i64>,
    #[serde(default)]
    footnote: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    venueid: Option<i64>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    tourid: Option<i64>,
    #[serde(default)]
    tourname: Option<String>,
}

/// Integers arrive as numbers, numeric strings, empty strings or null.
fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(b)),
        _ => None,
    })
}

/// Track time in seconds, or "m:ss" / "h:mm:ss".
fn lenient_duration<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_clock(s.trim()),
        _ => None,
    })
}

fn parse_clock(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    s.split(':')
        .try_fold(0i64, |acc, part| part.parse::<i64>().ok().map(|v| acc * 60 + v))
}

/// Parse a setlist JSON document into shows, applying the artist filter.
fn parse_shows(json: &str, opts: &ImportOptions) -> Result<(Vec<Show>, ImportResult)> {
    let entries = match serde_json::from_str::<Payload>(json).context("Invalid setlist JSON")? {
        Payload::Envelope {
            error,
            error_message,
            data,
        } => {
            if error.as_bool().unwrap_or(false) || error.as_i64().is_some_and(|e| e != 0) {
                bail!(
                    "Setlist response reports an error: {}",
                    error_message.unwrap_or_default()
                );
            }
            data
        }
        Payload::Bare(data) => data,
    };

    let mut result = ImportResult {
        entries: entries.len(),
        ..Default::default()
    };

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} entries {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut shows: BTreeMap<ShowId, Show> = BTreeMap::new();
    let mut unpositioned: Vec<(ShowId, usize)> = Vec::new();
    for (i, entry) in entries.into_iter().enumerate() {
        pb.inc(1);
        if let (Some(wanted), Some(artist)) = (opts.artist_id, entry.artistid) {
            if artist != wanted {
                result.skipped_other_artists += 1;
                continue;
            }
        }

        let show_id = entry
            .showid
            .with_context(|| format!("Entry {i} ({}) has no showid", entry.song))?;
        let date = NaiveDate::parse_from_str(entry.showdate.trim(), "%Y-%m-%d").with_context(
            || format!("Malformed showdate {:?} for show {show_id}", entry.showdate),
        )?;

        let show = shows.entry(show_id).or_insert_with(|| Show {
            id: show_id,
            date,
            venue_id: entry.venueid,
            venue: entry.venue.clone().unwrap_or_else(|| "Unknown".to_string()),
            city: entry.city.clone().unwrap_or_default(),
            state: entry.state.clone().unwrap_or_default(),
            country: entry.country.clone().unwrap_or_else(|| "USA".to_string()),
            tour_id: entry.tourid,
            tour_name: entry.tourname.clone(),
            performances: Vec::new(),
        });
        if show.date != date {
            bail!(
                "Show {show_id} appears with two dates: {} and {date}",
                show.date
            );
        }

        let position = entry.position.and_then(|p| u32::try_from(p).ok());
        if position.is_none() {
            unpositioned.push((show_id, show.performances.len()));
        }
        let Ok(set) = entry
            .set
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("1")
            .parse::<SetLabel>();
        let slug = entry
            .slug
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| entry.song.to_lowercase().replace(' ', "-"));

        show.performances.push(Performance {
            song: entry.song,
            slug,
            show_id,
            date,
            set,
            position: position.unwrap_or(0),
            gap: entry.gap.and_then(|g| u32::try_from(g).ok()),
            duration_secs: entry.tracktime.and_then(|t| u32::try_from(t).ok()),
            is_jamchart: entry.isjamchart.unwrap_or(0) != 0,
            footnote: entry.footnote.filter(|f| !f.trim().is_empty()),
        });
    }
    pb.finish_and_clear();

    // Missing positions go after the last known position in the same set,
    // in order of appearance.
    for (show_id, idx) in unpositioned {
        let Some(show) = shows.get_mut(&show_id) else {
            continue;
        };
        let set = show.performances[idx].set.clone();
        let next = show
            .performances
            .iter()
            .filter(|p| p.set == set)
            .map(|p| p.position)
            .max()
            .unwrap_or(0)
            + 1;
        show.performances[idx].position = next;
    }

    let shows: Vec<Show> = shows.into_values().collect();
    result.shows = shows.len();
    result.performances = shows.iter().map(|s| s.performances.len()).sum();
    Ok((shows, result))
}

/// Import a setlist JSON file into `db`, replacing the setlists of any
/// shows already stored.
pub fn import_file(db: &Database, path: &Path, opts: &ImportOptions) -> Result<ImportResult> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (shows, result) =
        parse_shows(&json, opts).with_context(|| format!("Failed to parse {}", path.display()))?;

    if result.skipped_other_artists > 0 {
        log::info!(
            "Skipped {} entries from other artists",
            result.skipped_other_artists
        );
    }

    // Validate the same way analysis will before anything is written.
    let catalog = Catalog::from_shows(shows).context("Setlist data failed validation")?;
    db.store_shows(catalog.shows())
        .context("Failed to store shows")?;

    log::info!(
        "Imported {} shows ({} performances) from {}",
        result.shows,
        result.performances,
        path.display()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DateRange;

    const ENVELOPE: &str = r#"{
        "error": false,
        "error_message": "",
        "data": [
            {"showid": 1252698446, "showdate": "1997-11-22", "artistid": 1, "song": "Tweezer",
             "slug": "tweezer", "set": "1", "position": "3", "gap": "4", "tracktime": "",
             "isjamchart": "1", "venueid": 157, "venue": "Hampton Coliseum",
             "city": "Hampton", "state": "VA", "country": "USA",
             "tourid": 23, "tourname": "1997 Fall Tour", "footnote": ""},
            {"showid": 1252698446, "showdate": "1997-11-22", "artistid": 1,
             "song": "Halley's Comet", "set": "2", "position": 1, "gap": 12, "isjamchart": 0},
            {"showid": 1252698446, "showdate": "1997-11-22", "artistid": 1,
             "song": "Tweezer Reprise", "set": "e", "position": "1", "gap": null,
             "tracktime": "4:05"},
            {"showid": 999, "showdate": "1997-11-22", "artistid": 2, "song": "Sidecar"},
            {"showid": 1252698447, "showdate": "1997-11-23", "artistid": "1", "song": "Tweezer",
             "set": "2", "gap": 1}
        ]
    }"#;

    #[test]
    fn test_parse_envelope() {
        let (shows, result) = parse_shows(ENVELOPE, &ImportOptions::default()).unwrap();
        assert_eq!(result.entries, 5);
        assert_eq!(result.skipped_other_artists, 1);
        assert_eq!(result.shows, 2);
        assert_eq!(result.performances, 4);

        let hampton = &shows[0];
        assert_eq!(hampton.venue, "Hampton Coliseum");
        assert_eq!(hampton.tour_name.as_deref(), Some("1997 Fall Tour"));
        assert_eq!(hampton.venue_id, Some(157));

        let tweezer = &hampton.performances[0];
        assert_eq!(tweezer.position, 3);
        assert_eq!(tweezer.gap, Some(4));
        assert!(tweezer.is_jamchart);
        assert_eq!(tweezer.duration_secs, None);
        assert_eq!(tweezer.footnote, None);

        let comet = &hampton.performances[1];
        assert_eq!(comet.slug, "halley's-comet");
        assert_eq!(comet.set, SetLabel::Set(2));

        let reprise = &hampton.performances[2];
        assert_eq!(reprise.set, SetLabel::Encore);
        assert_eq!(reprise.gap, None);
        assert_eq!(reprise.duration_secs, Some(245));

        // Missing position: order of appearance.
        assert_eq!(shows[1].performances[0].position, 1);
    }

    #[test]
    fn test_missing_position_follows_explicit_ones() {
        let json = r#"[
            {"showid": 7, "showdate": "2003-02-28", "song": "Ghost", "set": "1"},
            {"showid": 7, "showdate": "2003-02-28", "song": "Sand", "set": "1", "position": 1},
            {"showid": 7, "showdate": "2003-02-28", "song": "Wolfman's Brother", "set": "1"},
            {"showid": 7, "showdate": "2003-02-28", "song": "Possum", "set": "2"}
        ]"#;
        let (shows, _) = parse_shows(json, &ImportOptions::default()).unwrap();
        let positions: Vec<(&str, u32)> = shows[0]
            .performances
            .iter()
            .map(|p| (p.song.as_str(), p.position))
            .collect();
        assert_eq!(
            positions,
            vec![("Ghost", 2), ("Sand", 1), ("Wolfman's Brother", 3), ("Possum", 1)]
        );

        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.store_shows(&shows).unwrap(), 4);
    }

    #[test]
    fn test_all_artists() {
        let opts = ImportOptions { artist_id: None };
        let (shows, result) = parse_shows(ENVELOPE, &opts).unwrap();
        assert_eq!(result.skipped_other_artists, 0);
        assert_eq!(shows.len(), 3);
    }

    #[test]
    fn test_bare_array() {
        let json = r#"[{"showid": "7", "showdate": "2003-02-28", "song": "Ghost", "position": 2}]"#;
        let (shows, _) = parse_shows(json, &ImportOptions::default()).unwrap();
        assert_eq!(shows[0].id, 7);
        assert_eq!(shows[0].venue, "Unknown");
        assert_eq!(shows[0].performances[0].set, SetLabel::Set(1));
    }

    #[test]
    fn test_malformed_date_fails() {
        let json = r#"[{"showid": 7, "showdate": "2003-02-31", "song": "Ghost"}]"#;
        let err = parse_shows(json, &ImportOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Malformed showdate"));
    }

    #[test]
    fn test_missing_showid_fails() {
        let json = r#"[{"showid": "", "showdate": "2003-02-28", "song": "Ghost"}]"#;
        assert!(parse_shows(json, &ImportOptions::default()).is_err());
    }

    #[test]
    fn test_api_error_envelope() {
        let json = r#"{"error": true, "error_message": "Invalid API key", "data": []}"#;
        let err = parse_shows(json, &ImportOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn test_clock_parsing() {
        assert_eq!(parse_clock("4:05"), Some(245));
        assert_eq!(parse_clock("1:02:03"), Some(3723));
        assert_eq!(parse_clock("600"), Some(600));
        assert_eq!(parse_clock("n/a"), None);
        assert_eq!(parse_clock(""), None);
    }

    #[test]
    fn test_import_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("tourbreak-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("setlists.json");
        std::fs::write(&path, ENVELOPE).unwrap();

        let db = Database::open_in_memory().unwrap();
        let result = import_file(&db, &path, &ImportOptions::default()).unwrap();
        assert_eq!(result.shows, 2);

        let shows = db.load_shows(&DateRange::all()).unwrap();
        assert_eq!(shows.len(), 2);
        assert_eq!(db.song_history("Tweezer").unwrap().len(), 2);

        // Re-import replaces rather than duplicates.
        import_file(&db, &path, &ImportOptions::default()).unwrap();
        assert_eq!(db.stats().unwrap().performances, 4);

        std::fs::remove_dir_all(&dir).ok();
    }
}
