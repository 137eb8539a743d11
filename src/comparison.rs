//! Per-population statistics and intra-tour vs cross-tour significance tests.

use serde::Serialize;

use crate::gaps::{GapPopulations, GapSeries};
use crate::stats::{self, MannWhitney, Summary, TTest, TTestKind};

/// Both populations need this many observations before any test runs.
pub const MIN_TEST_OBSERVATIONS: usize = 5;

/// Reported p-value when a test was not run. Means "no evidence of a
/// difference", not "tested and found equal".
pub const NEUTRAL_P_VALUE: f64 = 1.0;

/// Show-count and day-count summaries for one population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PopulationStats {
    pub shows: Summary,
    pub days: Summary,
}

impl PopulationStats {
    pub fn of(series: &GapSeries) -> Self {
        Self {
            shows: Summary::of(&series.shows_f64()),
            days: Summary::of(&series.days_f64()),
        }
    }
}

/// Statistics of the tests that actually ran. A test can still be absent
/// here when its statistic is undefined (e.g. two constant samples with
/// the same value).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignificanceTests {
    pub t_test: Option<TTest>,
    pub mann_whitney: Option<MannWhitney>,
}

/// Intra-tour vs cross-tour gap comparison for one song (or a pooled set).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapComparison {
    pub song: String,
    pub intra_tour: GapSeries,
    pub cross_tour: GapSeries,
    pub intra_stats: PopulationStats,
    pub cross_stats: PopulationStats,
    pub ttest_pvalue: f64,
    pub mannwhitney_pvalue: f64,
    pub tests: Option<SignificanceTests>,
}

impl GapComparison {
    /// Summarize both populations and, when each has at least
    /// [`MIN_TEST_OBSERVATIONS`], test the show-count gaps.
    pub fn compare(song: impl Into<String>, pops: GapPopulations, t_kind: TTestKind) -> Self {
        let intra_stats = PopulationStats::of(&pops.intra_tour);
        let cross_stats = PopulationStats::of(&pops.cross_tour);

        let tests = (pops.intra_tour.len() >= MIN_TEST_OBSERVATIONS
            && pops.cross_tour.len() >= MIN_TEST_OBSERVATIONS)
            .then(|| {
                let intra = pops.intra_tour.shows_f64();
                let cross = pops.cross_tour.shows_f64();
                SignificanceTests {
                    t_test: stats::t_test(&intra, &cross, t_kind),
                    mann_whitney: stats::mann_whitney_u(&intra, &cross),
                }
            });

        let ttest_pvalue = tests
            .and_then(|t| t.t_test)
            .map_or(NEUTRAL_P_VALUE, |t| t.p_value);
        let mannwhitney_pvalue = tests
            .and_then(|t| t.mann_whitney)
            .map_or(NEUTRAL_P_VALUE, |m| m.p_value);

        Self {
            song: song.into(),
            intra_tour: pops.intra_tour,
            cross_tour: pops.cross_tour,
            intra_stats,
            cross_stats,
            ttest_pvalue,
            mannwhitney_pvalue,
            tests,
        }
    }

    /// Empty populations and zero statistics, for songs with no history.
    pub fn empty(song: impl Into<String>) -> Self {
        Self::compare(song, GapPopulations::default(), TTestKind::default())
    }

    pub fn was_tested(&self) -> bool {
        self.tests.is_some()
    }

    /// Both populations large enough for testing.
    pub fn is_testable(&self) -> bool {
        self.intra_tour.len() >= MIN_TEST_OBSERVATIONS
            && self.cross_tour.len() >= MIN_TEST_OBSERVATIONS
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.was_tested() && self.mannwhitney_pvalue < alpha
    }

    /// Cross-tour mean show gap over intra-tour mean show gap.
    pub fn gap_ratio(&self) -> Option<f64> {
        let intra = self.intra_stats.shows.mean;
        (intra > 0.0).then(|| self.cross_stats.shows.mean / intra)
    }

    pub fn mean_difference(&self) -> f64 {
        self.cross_stats.shows.mean - self.intra_stats.shows.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(shows: &[u32]) -> GapSeries {
        let mut s = GapSeries::default();
        for &g in shows {
            s.push(g, i64::from(g) * 2);
        }
        s
    }

    fn pops(intra: &[u32], cross: &[u32]) -> GapPopulations {
        GapPopulations {
            intra_tour: series(intra),
            cross_tour: series(cross),
        }
    }

    #[test]
    fn test_small_populations_are_not_tested() {
        let cmp = GapComparison::compare("Tweezer", pops(&[3, 0], &[10]), TTestKind::Student);
        assert!(!cmp.was_tested());
        assert_eq!(cmp.ttest_pvalue, 1.0);
        assert_eq!(cmp.mannwhitney_pvalue, 1.0);
        assert!((cmp.intra_stats.shows.mean - 1.5).abs() < 1e-12);
        assert!((cmp.intra_stats.shows.std - 1.5).abs() < 1e-12);
        assert_eq!(cmp.cross_stats.shows.median, 10.0);
        assert!((cmp.gap_ratio().unwrap() - 10.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_four_observations_stay_untested() {
        let cmp = GapComparison::compare(
            "Ghost",
            pops(&[1, 2, 3, 4], &[10, 11, 12, 13, 14]),
            TTestKind::Student,
        );
        assert!(!cmp.is_testable());
        assert_eq!(cmp.mannwhitney_pvalue, NEUTRAL_P_VALUE);
    }

    #[test]
    fn test_separated_populations_are_significant() {
        let cmp = GapComparison::compare(
            "Light",
            pops(&[1, 2, 3, 4, 5], &[10, 11, 12, 13, 14]),
            TTestKind::Student,
        );
        assert!(cmp.was_tested());
        let tests = cmp.tests.unwrap();
        assert!(tests.t_test.is_some());
        assert!(tests.mann_whitney.is_some());
        assert!(cmp.mannwhitney_pvalue < 0.05);
        assert!(cmp.ttest_pvalue < 0.001);
        assert!(cmp.is_significant(0.05));
        assert!((cmp.mean_difference() - 9.0).abs() < 1e-12);
        assert!((cmp.cross_stats.days.mean - 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_identical_constant_populations() {
        let cmp = GapComparison::compare(
            "Wilson",
            pops(&[2, 2, 2, 2, 2], &[2, 2, 2, 2, 2]),
            TTestKind::Welch,
        );
        assert!(cmp.was_tested());
        assert!(cmp.tests.unwrap().t_test.is_none());
        assert_eq!(cmp.ttest_pvalue, 1.0);
        assert_eq!(cmp.mannwhitney_pvalue, 1.0);
        assert!(!cmp.is_significant(0.05));
    }

    #[test]
    fn test_empty_comparison() {
        let cmp = GapComparison::empty("Unknown Song");
        assert!(cmp.intra_tour.is_empty());
        assert!(cmp.cross_tour.is_empty());
        assert_eq!(cmp.intra_stats, PopulationStats::default());
        assert_eq!(cmp.mannwhitney_pvalue, 1.0);
        assert!(cmp.gap_ratio().is_none());
    }
}
