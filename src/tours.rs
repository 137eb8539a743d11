//! Tour segmentation: split a chronological show sequence into tours at
//! every inter-show gap longer than the break threshold.
//!
//! The break list produced here is the single definition of "a tour break
//! lies between these two shows" used by the rest of the crate.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::{Show, ShowId};

/// Default gap (in days) above which consecutive shows belong to different tours.
pub const DEFAULT_BREAK_THRESHOLD_DAYS: i64 = 14;

/// Breaks longer than this are roughly a month off.
const SIGNIFICANT_BREAK_DAYS: i64 = 30;

/// A maximal run of shows with no gap above the threshold.
/// Indices refer to the chronological show sequence and are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tour {
    pub first_index: usize,
    pub last_index: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Tour {
    pub fn show_count(&self) -> usize {
        self.last_index - self.first_index + 1
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

/// The boundary between two adjacent tours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourBreak {
    /// Last show of the outgoing tour.
    pub end_show: ShowId,
    pub end_date: NaiveDate,
    /// First show of the incoming tour.
    pub start_show: ShowId,
    pub start_date: NaiveDate,
    /// Chronological index of `start_show`; the break sits just before it.
    pub start_index: usize,
    pub days_between: i64,
    pub shows_in_previous_tour: usize,
    pub shows_in_next_tour: usize,
}

impl TourBreak {
    pub fn is_significant(&self) -> bool {
        self.days_between > SIGNIFICANT_BREAK_DAYS
    }
}

/// Tours and breaks for one show sequence under one threshold.
#[derive(Debug, Clone, Serialize)]
pub struct TourSegmentation {
    pub threshold_days: i64,
    pub tours: Vec<Tour>,
    pub breaks: Vec<TourBreak>,
}

impl TourSegmentation {
    /// Segment `shows` (sorted by date) into tours.
    ///
    /// A break is emitted wherever the day gap between neighbours is strictly
    /// greater than `threshold_days`. With a threshold of zero or below every
    /// gap qualifies (a negative threshold also splits same-day double
    /// headers), so each show becomes its own tour. Fewer than two shows
    /// yields no tours and no breaks.
    pub fn new(shows: &[Show], threshold_days: i64) -> Self {
        if threshold_days <= 0 {
            log::warn!(
                "Tour break threshold of {threshold_days} days: \
                 every show gap counts as a tour break"
            );
        }

        let mut seg = Self {
            threshold_days,
            tours: Vec::new(),
            breaks: Vec::new(),
        };
        if shows.len() < 2 {
            return seg;
        }

        let mut tour_start = 0;
        for i in 1..shows.len() {
            let days = days_between(&shows[i - 1], &shows[i]);
            if days > threshold_days {
                seg.tours.push(make_tour(shows, tour_start, i - 1));
                seg.breaks.push(TourBreak {
                    end_show: shows[i - 1].id,
                    end_date: shows[i - 1].date,
                    start_show: shows[i].id,
                    start_date: shows[i].date,
                    start_index: i,
                    days_between: days,
                    shows_in_previous_tour: count_run_before(shows, i - 1, threshold_days),
                    shows_in_next_tour: count_run_after(shows, i, threshold_days),
                });
                tour_start = i;
            }
        }
        seg.tours.push(make_tour(shows, tour_start, shows.len() - 1));

        log::debug!(
            "Segmented {} shows into {} tours ({} breaks > {} days)",
            shows.len(),
            seg.tours.len(),
            seg.breaks.len(),
            threshold_days
        );
        seg
    }

    /// Does the show at `index` open a new tour (first show after a break)?
    pub fn is_tour_start(&self, index: usize) -> bool {
        self.breaks
            .binary_search_by_key(&index, |b| b.start_index)
            .is_ok()
    }

    /// Breaks lying between the shows at chronological indices `from` and `to`.
    pub fn breaks_between(&self, from: usize, to: usize) -> &[TourBreak] {
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        let first = self.breaks.partition_point(|b| b.start_index <= lo);
        let last = self.breaks.partition_point(|b| b.start_index <= hi);
        &self.breaks[first..last]
    }

    /// Is at least one tour break between the shows at `from` and `to`?
    pub fn crosses_break(&self, from: usize, to: usize) -> bool {
        !self.breaks_between(from, to).is_empty()
    }

    /// The tour containing the show at `index`.
    pub fn tour_of(&self, index: usize) -> Option<&Tour> {
        let pos = self.tours.partition_point(|t| t.last_index < index);
        self.tours
            .get(pos)
            .filter(|t| t.first_index <= index && index <= t.last_index)
    }
}

fn days_between(a: &Show, b: &Show) -> i64 {
    (b.date - a.date).num_days()
}

fn make_tour(shows: &[Show], first: usize, last: usize) -> Tour {
    Tour {
        first_index: first,
        last_index: last,
        start_date: shows[first].date,
        end_date: shows[last].date,
    }
}

/// Shows in the run ending at `idx`, scanning backward under the same threshold.
fn count_run_before(shows: &[Show], idx: usize, threshold: i64) -> usize {
    let mut count = 1;
    for i in (1..=idx).rev() {
        if days_between(&shows[i - 1], &shows[i]) > threshold {
            break;
        }
        count += 1;
    }
    count
}

/// Shows in the run starting at `idx`, scanning forward under the same threshold.
fn count_run_after(shows: &[Show], idx: usize, threshold: i64) -> usize {
    let mut count = 1;
    for i in idx..shows.len().saturating_sub(1) {
        if days_between(&shows[i], &shows[i + 1]) > threshold {
            break;
        }
        count += 1;
    }
    count
}
