use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter};

use super::models::{Performance, SetLabel, Show, ShowId, StoreStats};
use super::{Database, DbError, Result};
use crate::store::DateRange;

/// Raw show row before date validation.
struct ShowRow {
    id: ShowId,
    show_date: String,
    venue_id: Option<i64>,
    venue: String,
    city: String,
    state: String,
    country: String,
    tour_id: Option<i64>,
    tour_name: Option<String>,
}

/// Raw performance row before date validation.
struct PerformanceRow {
    show_id: ShowId,
    show_date: String,
    song: String,
    slug: String,
    set_label: String,
    position: u32,
    gap: Option<u32>,
    duration_secs: Option<u32>,
    is_jamchart: bool,
    footnote: Option<String>,
}

impl PerformanceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            show_id: row.get(0)?,
            show_date: row.get(1)?,
            song: row.get(2)?,
            slug: row.get(3)?,
            set_label: row.get(4)?,
            position: row.get(5)?,
            gap: row.get(6)?,
            duration_secs: row.get(7)?,
            is_jamchart: row.get(8)?,
            footnote: row.get(9)?,
        })
    }

    fn into_performance(self) -> Result<Performance> {
        let date = parse_show_date(self.show_id, &self.show_date)?;
        let Ok(set) = self.set_label.parse::<SetLabel>();
        Ok(Performance {
            song: self.song,
            slug: self.slug,
            show_id: self.show_id,
            date,
            set,
            position: self.position,
            gap: self.gap,
            duration_secs: self.duration_secs,
            is_jamchart: self.is_jamchart,
            footnote: self.footnote,
        })
    }
}

const PERFORMANCE_COLUMNS: &str = "p.show_id, s.show_date, p.song, p.slug, p.set_label, \
     p.position, p.gap, p.duration_secs, p.is_jamchart, p.footnote";

/// Parse a stored `YYYY-MM-DD` show date. Malformed dates are a hard failure.
pub(crate) fn parse_show_date(show_id: ShowId, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| DbError::MalformedDate {
        show_id,
        value: value.to_string(),
    })
}

impl Database {
    /// Insert or replace shows and their setlists in a single transaction.
    /// A show's previous performances are replaced wholesale.
    pub fn store_shows(&self, shows: &[Show]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut performances = 0;

        {
            let mut show_stmt = tx.prepare_cached(
                "INSERT INTO shows (
                    id, show_date, venue_id, venue, city, state, country, tour_id, tour_name
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    show_date = excluded.show_date,
                    venue_id = excluded.venue_id,
                    venue = excluded.venue,
                    city = excluded.city,
                    state = excluded.state,
                    country = excluded.country,
                    tour_id = excluded.tour_id,
                    tour_name = excluded.tour_name,
                    imported_at = datetime('now')",
            )?;
            let mut clear_stmt = tx.prepare_cached("DELETE FROM performances WHERE show_id = ?1")?;
            let mut perf_stmt = tx.prepare_cached(
                "INSERT INTO performances (
                    show_id, song, slug, set_label, position, gap, duration_secs,
                    is_jamchart, footnote
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for show in shows {
                show_stmt.execute(params![
                    show.id,
                    show.date.format("%Y-%m-%d").to_string(),
                    show.venue_id,
                    show.venue,
                    show.city,
                    show.state,
                    show.country,
                    show.tour_id,
                    show.tour_name,
                ])?;
                clear_stmt.execute(params![show.id])?;
                for p in &show.performances {
                    perf_stmt.execute(params![
                        show.id,
                        p.song,
                        p.slug,
                        p.set.code(),
                        p.position,
                        p.gap,
                        p.duration_secs,
                        p.is_jamchart,
                        p.footnote,
                    ])?;
                    performances += 1;
                }
            }
        }

        tx.commit()?;
        log::debug!("Stored {} shows ({} performances)", shows.len(), performances);
        Ok(performances)
    }

    /// Load every show (with setlist) whose date falls in `range`, sorted by date then id.
    pub fn load_shows(&self, range: &DateRange) -> Result<Vec<Show>> {
        let (filter, bounds) = range.sql_filter();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT s.id, s.show_date, s.venue_id, s.venue, s.city, s.state, s.country,
                    s.tour_id, s.tour_name
             FROM shows s
             {filter}
             ORDER BY s.show_date, s.id"
        ))?;
        let raw = stmt
            .query_map(params_from_iter(&bounds), |row| {
                Ok(ShowRow {
                    id: row.get(0)?,
                    show_date: row.get(1)?,
                    venue_id: row.get(2)?,
                    venue: row.get(3)?,
                    city: row.get(4)?,
                    state: row.get(5)?,
                    country: row.get(6)?,
                    tour_id: row.get(7)?,
                    tour_name: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut perf_stmt = self.conn.prepare(&format!(
            "SELECT {PERFORMANCE_COLUMNS}
             FROM performances p
             JOIN shows s ON s.id = p.show_id
             {filter}"
        ))?;
        let rows = perf_stmt
            .query_map(params_from_iter(&bounds), PerformanceRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut by_show: HashMap<ShowId, Vec<Performance>> = HashMap::new();
        for row in rows {
            let perf = row.into_performance()?;
            by_show.entry(perf.show_id).or_default().push(perf);
        }

        let mut shows = Vec::with_capacity(raw.len());
        for row in raw {
            let mut show = Show {
                id: row.id,
                date: parse_show_date(row.id, &row.show_date)?,
                venue_id: row.venue_id,
                venue: row.venue,
                city: row.city,
                state: row.state,
                country: row.country,
                tour_id: row.tour_id,
                tour_name: row.tour_name,
                performances: by_show.remove(&row.id).unwrap_or_default(),
            };
            show.sort_performances();
            shows.push(show);
        }

        log::debug!("Loaded {} shows for {}", shows.len(), range);
        Ok(shows)
    }

    /// Every stored performance of `song` (exact name), in chronological order.
    pub fn song_history(&self, song: &str) -> Result<Vec<Performance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERFORMANCE_COLUMNS}
             FROM performances p
             JOIN shows s ON s.id = p.show_id
             WHERE p.song = ?1
             ORDER BY s.show_date, s.id"
        ))?;
        let rows = stmt
            .query_map(params![song], PerformanceRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut perfs = rows
            .into_iter()
            .map(PerformanceRow::into_performance)
            .collect::<Result<Vec<_>>>()?;
        perfs.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.show_id.cmp(&b.show_id))
                .then(a.set.cmp(&b.set))
                .then(a.position.cmp(&b.position))
        });
        Ok(perfs)
    }

    /// Record store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let shows: i64 = self.conn.query_row("SELECT COUNT(*) FROM shows", [], |row| row.get(0))?;
        let performances: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM performances", [], |row| row.get(0))?;
        let songs: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT song) FROM performances",
            [],
            |row| row.get(0),
        )?;
        let (first_date, last_date): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(show_date), MAX(show_date) FROM shows",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut top_stmt = self.conn.prepare(
            "SELECT song, COUNT(*) FROM performances
             GROUP BY song
             ORDER BY COUNT(*) DESC, song
             LIMIT 20",
        )?;
        let top_songs: Vec<(String, i64)> = top_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            shows,
            performances,
            songs,
            first_date,
            last_date,
            top_songs,
        })
    }
}
