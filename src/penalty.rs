//! Turn the pooled intra/cross gap ratio into a recency-penalty adjustment.

use serde::Serialize;

/// Ratios above this mean tour breaks lengthen gaps.
const LENGTHENS_ABOVE: f64 = 1.2;
/// Ratios below this mean tour breaks shorten gaps.
const SHORTENS_BELOW: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakEffect {
    LengthensGaps,
    ShortensGaps,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenaltyRecommendation {
    pub intra_tour_mean_gap: f64,
    pub cross_tour_mean_gap: f64,
    pub gap_ratio: f64,
    /// Multiplier for the cross-tour penalty. `None` when the ratio is zero
    /// or negative and `1 / ratio` has no finite value.
    pub recommended_adjustment: Option<f64>,
    pub effect: BreakEffect,
    pub interpretation: String,
}

impl PenaltyRecommendation {
    /// Worth applying: moves the penalty by more than 10%, or has no finite bound.
    pub fn is_actionable(&self) -> bool {
        self.recommended_adjustment.is_none_or(|adj| (adj - 1.0).abs() > 0.1)
    }
}

/// Recommend a penalty multiplier from the mean show gaps of both populations.
///
/// A non-positive intra-tour mean gives a ratio of 1.0.
pub fn recommend_penalty(intra_mean: f64, cross_mean: f64) -> PenaltyRecommendation {
    let gap_ratio = if intra_mean > 0.0 {
        cross_mean / intra_mean
    } else {
        1.0
    };
    let inverse = (gap_ratio > 0.0).then(|| 1.0 / gap_ratio);

    let (effect, recommended_adjustment, interpretation) = if gap_ratio > LENGTHENS_ABOVE {
        (
            BreakEffect::LengthensGaps,
            inverse,
            format!(
                "Songs take {gap_ratio:.2}x longer to come back across a tour break. \
                 Cross-tour gaps should be penalized less, by a factor of {:.3}.",
                1.0 / gap_ratio
            ),
        )
    } else if gap_ratio < SHORTENS_BELOW {
        let text = match inverse {
            Some(adj) => format!(
                "Songs return faster across a tour break ({gap_ratio:.2}x the intra-tour gap). \
                 Cross-tour gaps should be penalized more, by a factor of {adj:.3}."
            ),
            None => format!(
                "Songs return immediately across a tour break ({gap_ratio:.2}x the intra-tour \
                 gap). Cross-tour gaps should be penalized more; no finite factor applies."
            ),
        };
        (BreakEffect::ShortensGaps, inverse, text)
    } else {
        (
            BreakEffect::Neutral,
            Some(1.0),
            format!(
                "Tour breaks have little effect on gaps ({gap_ratio:.2}x). No adjustment needed."
            ),
        )
    };

    PenaltyRecommendation {
        intra_tour_mean_gap: intra_mean,
        cross_tour_mean_gap: cross_mean,
        gap_ratio,
        recommended_adjustment,
        effect,
        interpretation,
    }
}
