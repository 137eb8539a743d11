//! Gap classification: split the gaps between consecutive performances of a
//! song into intra-tour and cross-tour populations.

use serde::Serialize;

use crate::db::models::{Performance, ShowId};
use crate::store::Catalog;
use crate::tours::TourSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    IntraTour,
    CrossTour,
}

/// One gap between two consecutive performances of the same song.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedGap {
    pub from_show: ShowId,
    pub to_show: ShowId,
    pub kind: GapKind,
    /// Other shows played in between.
    pub shows: u32,
    /// Calendar days between the two show dates.
    pub days: i64,
    /// Total length of the tour breaks crossed (0 for intra-tour gaps).
    pub break_days: i64,
}

/// Parallel show-count / day-count sequences for one population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapSeries {
    pub shows: Vec<u32>,
    pub days: Vec<i64>,
}

impl GapSeries {
    pub fn push(&mut self, shows: u32, days: i64) {
        self.shows.push(shows);
        self.days.push(days);
    }

    pub fn extend(&mut self, other: &GapSeries) {
        self.shows.extend_from_slice(&other.shows);
        self.days.extend_from_slice(&other.days);
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    pub fn shows_f64(&self) -> Vec<f64> {
        self.shows.iter().map(|&s| f64::from(s)).collect()
    }

    pub fn days_f64(&self) -> Vec<f64> {
        self.days.iter().map(|&d| d as f64).collect()
    }
}

/// Intra-tour and cross-tour gap populations for one song.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapPopulations {
    pub intra_tour: GapSeries,
    pub cross_tour: GapSeries,
}

impl GapPopulations {
    pub fn from_gaps(gaps: &[ClassifiedGap]) -> Self {
        let mut pops = Self::default();
        for g in gaps {
            match g.kind {
                GapKind::IntraTour => pops.intra_tour.push(g.shows, g.days),
                GapKind::CrossTour => pops.cross_tour.push(g.shows, g.days),
            }
        }
        pops
    }

    pub fn total(&self) -> usize {
        self.intra_tour.len() + self.cross_tour.len()
    }
}

/// Classify every consecutive pair in a song's chronological `history`.
///
/// A pair is cross-tour when at least one break of `segmentation` lies
/// between the two shows; the pair's own day gap is never compared with the
/// threshold. The show gap is the upstream value when present, otherwise the
/// number of catalog shows strictly between the two. Performances whose show
/// is not in `catalog` are skipped.
pub fn classify(
    history: &[Performance],
    catalog: &Catalog,
    segmentation: &TourSegmentation,
) -> Vec<ClassifiedGap> {
    let indexed: Vec<(usize, &Performance)> = history
        .iter()
        .filter_map(|p| match catalog.show_index(p.show_id) {
            Some(i) => Some((i, p)),
            None => {
                log::debug!("{}: show {} not in catalog, skipping", p.song, p.show_id);
                None
            }
        })
        .collect();

    indexed
        .windows(2)
        .map(|pair| {
            let (from_idx, prev) = pair[0];
            let (to_idx, cur) = pair[1];
            let crossed = segmentation.breaks_between(from_idx, to_idx);
            let shows = cur.gap.unwrap_or_else(|| derived_show_gap(from_idx, to_idx));

            ClassifiedGap {
                from_show: prev.show_id,
                to_show: cur.show_id,
                kind: if crossed.is_empty() {
                    GapKind::IntraTour
                } else {
                    GapKind::CrossTour
                },
                shows,
                days: (cur.date - prev.date).num_days(),
                break_days: crossed.iter().map(|b| b.days_between).sum(),
            }
        })
        .collect()
}

/// Shows strictly between two chronological indices.
fn derived_show_gap(from: usize, to: usize) -> u32 {
    u32::try_from(to.saturating_sub(from).saturating_sub(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{SetLabel, Show};
    use chrono::{Duration, NaiveDate};

    /// Twenty shows, one per day from 2023-07-01, except a 30-day break
    /// before show #20 (index 19).
    fn season(song_at: &[(usize, Option<u32>)]) -> Catalog {
        let base = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        let shows = (1..=20)
            .map(|n: usize| {
                let offset = if n == 20 { 19 + 30 } else { n as i64 - 1 };
                let date = base + Duration::days(offset);
                let id = n as ShowId;
                let performances = song_at
                    .iter()
                    .filter(|(show, _)| *show == n)
                    .map(|(_, gap)| Performance {
                        song: "Tweezer".to_string(),
                        slug: "tweezer".to_string(),
                        show_id: id,
                        date,
                        set: SetLabel::Set(2),
                        position: 1,
                        gap: *gap,
                        duration_secs: None,
                        is_jamchart: false,
                        footnote: None,
                    })
                    .collect();
                Show {
                    id,
                    date,
                    venue_id: None,
                    venue: String::new(),
                    city: String::new(),
                    state: String::new(),
                    country: String::new(),
                    tour_id: None,
                    tour_name: None,
                    performances,
                }
            })
            .collect();
        Catalog::from_shows(shows).unwrap()
    }

    fn classify_song(catalog: &Catalog) -> Vec<ClassifiedGap> {
        let seg = TourSegmentation::new(catalog.shows(), 14);
        let history = &catalog.song("Tweezer").unwrap().performances;
        classify(history, catalog, &seg)
    }

    #[test]
    fn test_intra_and_cross_partition() {
        let catalog = season(&[(1, None), (5, Some(3)), (6, Some(0)), (20, Some(10))]);
        let gaps = classify_song(&catalog);
        let pops = GapPopulations::from_gaps(&gaps);

        assert_eq!(pops.intra_tour.shows, vec![3, 0]);
        assert_eq!(pops.intra_tour.days, vec![4, 1]);
        assert_eq!(pops.cross_tour.shows, vec![10]);
        assert_eq!(pops.cross_tour.days, vec![44]);
        assert_eq!(gaps[2].break_days, 31);
        assert_eq!(gaps[0].break_days, 0);
    }

    #[test]
    fn test_partition_is_total() {
        let catalog = season(&[(1, None), (2, None), (9, None), (19, None), (20, None)]);
        let gaps = classify_song(&catalog);
        let pops = GapPopulations::from_gaps(&gaps);
        assert_eq!(gaps.len(), 4);
        assert_eq!(pops.total(), gaps.len());
        assert_eq!(pops.cross_tour.len(), 1);
    }

    #[test]
    fn test_derived_gap_when_upstream_missing() {
        let catalog = season(&[(1, None), (5, None), (20, None)]);
        let gaps = classify_song(&catalog);
        assert_eq!(gaps[0].shows, 3);
        assert_eq!(gaps[1].shows, 14);
    }

    #[test]
    fn test_long_gap_without_break_stays_intra_tour() {
        // Six shows ten days apart: every gap is under the threshold, but the
        // song's own gap (50 days) is well over it.
        let base = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        let mut shows = season(&[(1, None), (6, None)]).shows()[..6].to_vec();
        for (i, show) in shows.iter_mut().enumerate() {
            show.date = base + Duration::days(i as i64 * 10);
            for perf in &mut show.performances {
                perf.date = show.date;
            }
        }
        let catalog = Catalog::from_shows(shows).unwrap();

        assert!(TourSegmentation::new(catalog.shows(), 14).breaks.is_empty());
        let gaps = classify_song(&catalog);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::IntraTour);
        assert_eq!(gaps[0].days, 50);
        assert_eq!(gaps[0].shows, 4);
        assert_eq!(gaps[0].break_days, 0);
    }

    #[test]
    fn test_fewer_than_two_performances() {
        let catalog = season(&[(7, Some(2))]);
        assert!(classify_song(&catalog).is_empty());
        assert!(GapPopulations::from_gaps(&[]).intra_tour.is_empty());
    }

    #[test]
    fn test_repeat_within_one_show() {
        assert_eq!(derived_show_gap(4, 4), 0);
        assert_eq!(derived_show_gap(4, 5), 0);
        assert_eq!(derived_show_gap(4, 9), 4);
    }

    #[test]
    fn test_series_extend() {
        let mut a = GapSeries::default();
        a.push(1, 2);
        let mut b = GapSeries::default();
        b.push(3, 4);
        b.push(5, 6);
        a.extend(&b);
        assert_eq!(a.shows, vec![1, 3, 5]);
        assert_eq!(a.days_f64(), vec![2.0, 4.0, 6.0]);
    }
}
