//! Tour-break gap analysis over a loaded catalog: per-song comparisons, the
//! pooled aggregate, repeat patterns after tour starts, and the penalty
//! recommendation.

use std::collections::HashSet;

use serde::Serialize;

use crate::comparison::{GapComparison, MIN_TEST_OBSERVATIONS};
use crate::db::models::{ShowId, Song};
use crate::gaps::{self, ClassifiedGap, GapPopulations};
use crate::penalty::{self, PenaltyRecommendation};
use crate::stats::{self, ChiSquareTest, TTestKind};
use crate::store::{Catalog, DateRange, RecordStore, StoreError};
use crate::tours::TourSegmentation;

/// Minimum plays for a song to enter the pooled aggregate.
pub const DEFAULT_AGGREGATE_MIN_PERFORMANCES: usize = 30;
/// Minimum plays for a song to enter the per-song ranking.
pub const DEFAULT_RANKING_MIN_PERFORMANCES: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Repeat window must be at least one show")]
    InvalidWindow,
}

/// Pooled comparison across every qualifying song.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub min_performances: usize,
    pub songs_analyzed: usize,
    pub intra_observations: usize,
    pub cross_observations: usize,
    pub pooled: GapComparison,
    /// Per-song comparisons that went into the pool, most significant first.
    pub song_comparisons: Vec<GapComparison>,
}

/// Did a song played at one show come back within the next few shows?
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatObservation {
    pub song: String,
    pub show_id: ShowId,
    /// The originating show opened a tour.
    pub tour_start: bool,
    pub repeated: bool,
    /// Shows later (1 = the next show) when repeated.
    pub gap: Option<usize>,
    /// The window ran past the last loaded show.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepeatBucket {
    pub observations: usize,
    pub repeats: usize,
    pub repeat_probability: f64,
    pub avg_gap_when_repeated: f64,
    /// Observations whose window was cut short by the end of the data.
    pub truncated_windows: usize,
}

impl RepeatBucket {
    fn from_observations<'a>(obs: impl Iterator<Item = &'a RepeatObservation>) -> Self {
        let mut bucket = Self::default();
        let mut gaps = Vec::new();
        for o in obs {
            bucket.observations += 1;
            if o.truncated {
                bucket.truncated_windows += 1;
            }
            if let Some(g) = o.gap {
                bucket.repeats += 1;
                gaps.push(g as f64);
            }
        }
        if bucket.observations > 0 {
            bucket.repeat_probability = bucket.repeats as f64 / bucket.observations as f64;
        }
        bucket.avg_gap_when_repeated = stats::mean(&gaps);
        bucket
    }

    fn misses(&self) -> u64 {
        (self.observations - self.repeats) as u64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatPatternReport {
    pub window_size: usize,
    pub same_tour: RepeatBucket,
    pub tour_start: RepeatBucket,
    /// Tour start vs same tour by repeated vs not. `None` when a row or
    /// column of the table is empty.
    pub chi_square: Option<ChiSquareTest>,
}

/// Tour-break gap analysis bound to one catalog and one break threshold.
pub struct TourGapAnalyzer {
    catalog: Catalog,
    segmentation: TourSegmentation,
    t_test: TTestKind,
    aggregate_min: usize,
}

impl TourGapAnalyzer {
    pub fn new(catalog: Catalog, break_threshold_days: i64) -> Self {
        let segmentation = TourSegmentation::new(catalog.shows(), break_threshold_days);
        Self {
            catalog,
            segmentation,
            t_test: TTestKind::default(),
            aggregate_min: DEFAULT_AGGREGATE_MIN_PERFORMANCES,
        }
    }

    /// Load `range` from a record store and segment it.
    pub fn load(
        store: &dyn RecordStore,
        range: &DateRange,
        break_threshold_days: i64,
    ) -> Result<Self, AnalysisError> {
        let catalog = Catalog::load(store, range)?;
        log::info!(
            "Loaded {} shows and {} songs for {}",
            catalog.shows().len(),
            catalog.song_count(),
            range
        );
        Ok(Self::new(catalog, break_threshold_days))
    }

    pub fn with_t_test(mut self, kind: TTestKind) -> Self {
        self.t_test = kind;
        self
    }

    /// Minimum plays used by [`Self::calculate_optimal_penalty_adjustment`].
    pub fn with_aggregate_min(mut self, min_performances: usize) -> Self {
        self.aggregate_min = min_performances;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn segmentation(&self) -> &TourSegmentation {
        &self.segmentation
    }

    /// Classified gaps for one song; empty for unknown songs.
    pub fn song_gaps(&self, song: &str) -> Vec<ClassifiedGap> {
        self.catalog
            .song(song)
            .map(|s| self.classify(s))
            .unwrap_or_default()
    }

    fn classify(&self, song: &Song) -> Vec<ClassifiedGap> {
        gaps::classify(&song.performances, &self.catalog, &self.segmentation)
    }

    fn compare(&self, song: &Song) -> GapComparison {
        let pops = GapPopulations::from_gaps(&self.classify(song));
        GapComparison::compare(song.name.clone(), pops, self.t_test)
    }

    /// Intra-tour vs cross-tour comparison for one song.
    ///
    /// An unknown song yields empty populations and zero statistics.
    pub fn analyze_song(&self, song: &str) -> GapComparison {
        match self.catalog.song(song) {
            Some(s) => self.compare(s),
            None => {
                log::debug!("No performances of {song:?} in range");
                GapComparison::empty(song)
            }
        }
    }

    /// Comparisons for every song with at least `min_performances` plays and
    /// enough observations in both populations, most significant first.
    /// Ties in p-value are ordered by song name.
    pub fn analyze_all_songs(&self, min_performances: usize) -> Vec<GapComparison> {
        use rayon::prelude::*;

        let candidates: Vec<&Song> = self
            .catalog
            .songs()
            .filter(|s| s.times_played() >= min_performances)
            .collect();

        let mut comparisons: Vec<GapComparison> = candidates
            .par_iter()
            .map(|s| self.compare(s))
            .filter(|c| c.is_testable())
            .collect();

        log::debug!(
            "{} of {} songs with >= {} plays have >= {} gaps in both populations",
            comparisons.len(),
            candidates.len(),
            min_performances,
            MIN_TEST_OBSERVATIONS
        );

        comparisons.sort_by(|a, b| {
            a.mannwhitney_pvalue
                .total_cmp(&b.mannwhitney_pvalue)
                .then_with(|| a.song.cmp(&b.song))
        });
        comparisons
    }

    /// Pool the gap populations of every qualifying song into one comparison.
    pub fn aggregate_analysis(&self, min_performances: usize) -> AggregateReport {
        let song_comparisons = self.analyze_all_songs(min_performances);

        let mut pooled = GapPopulations::default();
        for c in &song_comparisons {
            pooled.intra_tour.extend(&c.intra_tour);
            pooled.cross_tour.extend(&c.cross_tour);
        }

        let report = AggregateReport {
            min_performances,
            songs_analyzed: song_comparisons.len(),
            intra_observations: pooled.intra_tour.len(),
            cross_observations: pooled.cross_tour.len(),
            pooled: GapComparison::compare("All songs", pooled, self.t_test),
            song_comparisons,
        };
        log::info!(
            "Aggregate: {} songs, {} intra-tour and {} cross-tour gaps",
            report.songs_analyzed,
            report.intra_observations,
            report.cross_observations
        );
        report
    }

    /// One observation per distinct song per show: did it come back within
    /// the next `window` shows?
    pub fn repeat_observations(
        &self,
        window: usize,
    ) -> Result<Vec<RepeatObservation>, AnalysisError> {
        if window == 0 {
            return Err(AnalysisError::InvalidWindow);
        }

        let shows = self.catalog.shows();
        let setlists: Vec<HashSet<&str>> = shows
            .iter()
            .map(|s| s.performances.iter().map(|p| p.song.as_str()).collect())
            .collect();

        let mut observations = Vec::new();
        for (i, show) in shows.iter().enumerate() {
            let tour_start = self.segmentation.is_tour_start(i);
            let last = (i + window).min(shows.len() - 1);
            let truncated = i + window > shows.len() - 1;

            let mut seen = HashSet::new();
            for perf in &show.performances {
                if !seen.insert(perf.song.as_str()) {
                    continue;
                }
                let gap = (i + 1..=last)
                    .find(|&j| setlists[j].contains(perf.song.as_str()))
                    .map(|j| j - i);
                observations.push(RepeatObservation {
                    song: perf.song.clone(),
                    show_id: show.id,
                    tour_start,
                    repeated: gap.is_some(),
                    gap,
                    truncated,
                });
            }
        }
        Ok(observations)
    }

    /// Repeat probability after tour-start shows vs all other shows.
    pub fn analyze_repeat_patterns(
        &self,
        window: usize,
    ) -> Result<RepeatPatternReport, AnalysisError> {
        let observations = self.repeat_observations(window)?;
        let tour_start =
            RepeatBucket::from_observations(observations.iter().filter(|o| o.tour_start));
        let same_tour =
            RepeatBucket::from_observations(observations.iter().filter(|o| !o.tour_start));

        let chi_square = stats::chi_square_2x2([
            [tour_start.repeats as u64, tour_start.misses()],
            [same_tour.repeats as u64, same_tour.misses()],
        ]);
        if chi_square.is_none() {
            log::debug!(
                "Window {window}: contingency table has an empty margin, skipping chi-square"
            );
        }

        Ok(RepeatPatternReport {
            window_size: window,
            same_tour,
            tour_start,
            chi_square,
        })
    }

    /// Penalty recommendation from the pooled aggregate at the configured
    /// minimum play count.
    pub fn calculate_optimal_penalty_adjustment(&self) -> PenaltyRecommendation {
        recommendation_for(&self.aggregate_analysis(self.aggregate_min))
    }
}

/// Penalty recommendation from an already computed aggregate.
pub fn recommendation_for(report: &AggregateReport) -> PenaltyRecommendation {
    penalty::recommend_penalty(
        report.pooled.intra_stats.shows.mean,
        report.pooled.cross_stats.shows.mean,
    )
}
