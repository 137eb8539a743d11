//! Performance record store: the boundary between persisted setlist data and
//! the analysis core.
//!
//! A [`RecordStore`] hands out typed, validated [`Show`]s for a date range.
//! The analyzer materializes them once into a [`Catalog`], which is immutable
//! for the rest of the run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::db::models::{Performance, Show, ShowId, Song};
use crate::db::{Database, DbError};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Duplicate show id {0}")]
    DuplicateShow(ShowId),
    #[error(
        "Performance of {song:?} claims show {claimed} ({date}) but is listed under show {parent}"
    )]
    MismatchedPerformance {
        song: String,
        parent: ShowId,
        claimed: ShowId,
        date: NaiveDate,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Invalid record: {0}")]
    Catalog(#[from] CatalogError),
    #[error("No shows found for {0}")]
    EmptyRange(DateRange),
    #[error("Invalid date range {0:?} (expected YYYY, YYYY-YYYY or YYYY-MM-DD..YYYY-MM-DD)")]
    InvalidRange(String),
}

/// Inclusive calendar range; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn years(start: i32, end: i32) -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(start, 1, 1),
            end: NaiveDate::from_ymd_opt(end, 12, 31),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    /// `WHERE` clause on `s.show_date` plus its ISO date parameters.
    /// Open sides add no condition, so an unbounded range filters nothing.
    pub(crate) fn sql_filter(&self) -> (String, Vec<String>) {
        let mut conds = Vec::new();
        let mut params = Vec::new();
        for (bound, op) in [(self.start, ">="), (self.end, "<=")] {
            if let Some(d) = bound {
                params.push(d.format("%Y-%m-%d").to_string());
                conds.push(format!("s.show_date {op} ?{}", params.len()));
            }
        }
        if conds.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conds.join(" AND ")), params)
        }
    }
}

impl FromStr for DateRange {
    type Err = StoreError;

    /// Supports "2015", "2010-2024" and "2019-06-01..2019-12-31" (either side may be empty).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || StoreError::InvalidRange(s.to_string());

        if let Some((from, to)) = s.split_once("..") {
            let parse = |v: &str| -> Result<Option<NaiveDate>, StoreError> {
                if v.trim().is_empty() {
                    Ok(None)
                } else {
                    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                        .map(Some)
                        .map_err(|_| invalid())
                }
            };
            return Ok(Self {
                start: parse(from)?,
                end: parse(to)?,
            });
        }

        if let Some((start, end)) = s.split_once('-') {
            if start.len() == 4 && end.len() == 4 {
                if let (Ok(a), Ok(b)) = (start.parse::<i32>(), end.parse::<i32>()) {
                    if a <= b {
                        return Ok(Self::years(a, b));
                    }
                }
            }
            return Err(invalid());
        }

        match s.parse::<i32>() {
            Ok(y) if s.len() == 4 => Ok(Self::years(y, y)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => write!(f, "all dates"),
            (Some(s), None) => write!(f, "{s} onward"),
            (None, Some(e)) => write!(f, "through {e}"),
            (Some(s), Some(e)) => write!(f, "{s} to {e}"),
        }
    }
}

/// Source of typed performance records.
pub trait RecordStore {
    /// All shows (with setlists) in `range`. Order is not guaranteed.
    fn shows_in_range(&self, range: &DateRange) -> Result<Vec<Show>, StoreError>;

    /// Every performance of `song` in chronological order.
    fn song_history(&self, song: &str) -> Result<Vec<Performance>, StoreError>;
}

impl RecordStore for Database {
    fn shows_in_range(&self, range: &DateRange) -> Result<Vec<Show>, StoreError> {
        Ok(self.load_shows(range)?)
    }

    fn song_history(&self, song: &str) -> Result<Vec<Performance>, StoreError> {
        Ok(Database::song_history(self, song)?)
    }
}

/// Validated, chronologically sorted shows plus the derived song index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    shows: Vec<Show>,
    songs: BTreeMap<String, Song>,
    index: HashMap<ShowId, usize>,
}

impl Catalog {
    /// Validate and index a set of shows.
    ///
    /// Shows are sorted by (date, id) and each setlist by (set, position).
    /// Duplicate show ids and performances that disagree with their parent
    /// show are rejected.
    pub fn from_shows(mut shows: Vec<Show>) -> Result<Self, CatalogError> {
        shows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let mut index = HashMap::with_capacity(shows.len());
        for (i, show) in shows.iter_mut().enumerate() {
            if index.insert(show.id, i).is_some() {
                return Err(CatalogError::DuplicateShow(show.id));
            }
            if let Some(p) = show
                .performances
                .iter()
                .find(|p| p.show_id != show.id || p.date != show.date)
            {
                return Err(CatalogError::MismatchedPerformance {
                    song: p.song.clone(),
                    parent: show.id,
                    claimed: p.show_id,
                    date: p.date,
                });
            }
            show.sort_performances();
        }

        let mut songs: BTreeMap<String, Song> = BTreeMap::new();
        for show in &shows {
            for perf in &show.performances {
                songs
                    .entry(perf.song.clone())
                    .or_insert_with(|| Song {
                        name: perf.song.clone(),
                        slug: perf.slug.clone(),
                        performances: Vec::new(),
                    })
                    .performances
                    .push(perf.clone());
            }
        }

        log::debug!("Catalog: {} shows, {} songs", shows.len(), songs.len());
        Ok(Self { shows, songs, index })
    }

    /// Pull `range` from a record store and build a catalog from it.
    pub fn load(store: &dyn RecordStore, range: &DateRange) -> Result<Self, StoreError> {
        let shows = store.shows_in_range(range)?;
        if shows.is_empty() {
            return Err(StoreError::EmptyRange(*range));
        }
        Ok(Self::from_shows(shows)?)
    }

    /// Shows in chronological order.
    pub fn shows(&self) -> &[Show] {
        &self.shows
    }

    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.songs.values()
    }

    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    /// Exact name first, then a case-insensitive exact match.
    pub fn song(&self, name: &str) -> Option<&Song> {
        self.songs.get(name).or_else(|| {
            let lower = name.to_lowercase();
            self.songs.values().find(|s| s.name.to_lowercase() == lower)
        })
    }

    /// Chronological position of a show.
    pub fn show_index(&self, id: ShowId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn show(&self, id: ShowId) -> Option<&Show> {
        self.show_index(id).map(|i| &self.shows[i])
    }
}

impl RecordStore for Catalog {
    fn shows_in_range(&self, range: &DateRange) -> Result<Vec<Show>, StoreError> {
        Ok(self
            .shows
            .iter()
            .filter(|s| range.contains(s.date))
            .cloned()
            .collect())
    }

    fn song_history(&self, song: &str) -> Result<Vec<Performance>, StoreError> {
        Ok(self
            .songs
            .get(song)
            .map(|s| s.performances.clone())
            .unwrap_or_default())
    }
}
