//! Descriptive statistics and two-sample significance tests.
//!
//! Distribution tails come from `statrs`; the test statistics follow the
//! textbook definitions (pooled/Welch t, Mann-Whitney U with tie and
//! continuity correction, Pearson chi-square with Yates' correction).

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

/// Mean / median / population standard deviation of a sample.
/// All zero for an empty sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self::default();
        }
        let mean = mean(values);
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        Self {
            n,
            mean,
            median: median(values),
            std: var.sqrt(),
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

/// Sample variance (n - 1 denominator).
fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Which two-sample t-test to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TTestKind {
    /// Pooled variance
    #[default]
    Student,
    /// Unequal variances (Welch–Satterthwaite degrees of freedom)
    Welch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TTest {
    pub kind: TTestKind,
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

/// Two-sided two-sample t-test of `a` against `b`.
///
/// Returns `None` when either sample has fewer than two values, or when both
/// samples are constant with the same mean (the statistic is undefined).
pub fn t_test(a: &[f64], b: &[f64], kind: TTestKind) -> Option<TTest> {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (sample_variance(a), sample_variance(b));

    let (se, df) = match kind {
        TTestKind::Student => {
            let pooled = ((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0);
            ((pooled * (1.0 / na + 1.0 / nb)).sqrt(), na + nb - 2.0)
        }
        TTestKind::Welch => {
            let (qa, qb) = (va / na, vb / nb);
            let denom = qa.powi(2) / (na - 1.0) + qb.powi(2) / (nb - 1.0);
            let df = if denom > 0.0 {
                (qa + qb).powi(2) / denom
            } else {
                na + nb - 2.0
            };
            ((qa + qb).sqrt(), df)
        }
    };

    let diff = ma - mb;
    if se <= 0.0 || !se.is_finite() {
        if diff == 0.0 {
            return None;
        }
        return Some(TTest {
            kind,
            statistic: diff.signum() * f64::INFINITY,
            df,
            p_value: 0.0,
        });
    }

    let statistic = diff / se;
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p_value = (2.0 * dist.sf(statistic.abs())).min(1.0);
    Some(TTest {
        kind,
        statistic,
        df,
        p_value,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MannWhitneyMethod {
    Exact,
    Asymptotic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MannWhitney {
    /// U statistic of the first sample.
    pub u: f64,
    pub p_value: f64,
    pub method: MannWhitneyMethod,
}

/// Exact null distribution is used when the smaller sample is at most this size...
const EXACT_MAX_SMALL: usize = 8;
/// ...and the distribution table stays small.
const EXACT_MAX_CELLS: usize = 10_000;

/// Two-sided Mann-Whitney U test of `a` against `b`.
///
/// Uses the exact distribution of U for small tie-free samples, otherwise
/// the normal approximation with tie and continuity correction. Returns
/// `None` when either sample is empty.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<MannWhitney> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return None;
    }

    let (ranks, tie_groups) = rank_pooled(a, b);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u = u1.max(u2);

    let has_ties = tie_groups.iter().any(|&t| t > 1);
    if !has_ties && n1.min(n2) <= EXACT_MAX_SMALL && n1 * n2 <= EXACT_MAX_CELLS {
        let counts = exact_u_counts(n1.min(n2), n1.max(n2));
        let total: i128 = counts.iter().sum();
        let at_least: i128 = counts[u.round() as usize..].iter().sum();
        let p_value = (2.0 * at_least as f64 / total as f64).min(1.0);
        return Some(MannWhitney {
            u: u1,
            p_value,
            method: MannWhitneyMethod::Exact,
        });
    }

    let n = (n1 + n2) as f64;
    let mu = (n1 * n2) as f64 / 2.0;
    let tie_term: f64 = tie_groups
        .iter()
        .map(|&t| {
            let t = t as f64;
            t.powi(3) - t
        })
        .sum();
    let sigma = ((n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();

    let p_value = if sigma > 0.0 && sigma.is_finite() {
        let z = (u - mu - 0.5) / sigma;
        (2.0 * Normal::standard().sf(z)).clamp(0.0, 1.0)
    } else {
        // Every value tied: no evidence of a location shift.
        1.0
    };

    Some(MannWhitney {
        u: u1,
        p_value,
        method: MannWhitneyMethod::Asymptotic,
    })
}

/// Average ranks (1-based) of `a` followed by `b` in the pooled sample,
/// plus the size of every tie group.
fn rank_pooled(a: &[f64], b: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let pooled: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    let mut order: Vec<usize> = (0..pooled.len()).collect();
    order.sort_by(|&i, &j| pooled[i].total_cmp(&pooled[j]));

    let mut ranks = vec![0.0; pooled.len()];
    let mut groups = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && pooled[order[end]] == pooled[order[start]] {
            end += 1;
        }
        // positions start..end share the average of ranks start+1..=end
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        groups.push(end - start);
        start = end;
    }
    (ranks, groups)
}

/// Number of arrangements giving each value of U for sample sizes `m` and `n`:
/// the coefficients of the Gaussian binomial `[m + n choose m]_q`.
fn exact_u_counts(m: usize, n: usize) -> Vec<i128> {
    let max = m * n;
    let mut c = vec![0i128; max + 1];
    c[0] = 1;
    for i in 1..=m {
        // multiply by (1 - q^(n+i))
        let shift = n + i;
        for k in (shift..=max).rev() {
            c[k] -= c[k - shift];
        }
        // divide by (1 - q^i)
        for k in i..=max {
            c[k] += c[k - i];
        }
    }
    c
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: u32,
    pub expected: [[f64; 2]; 2],
}

/// Chi-square test of independence on a 2×2 contingency table, with Yates'
/// continuity correction. `None` if any row or column total is zero.
pub fn chi_square_2x2(table: [[u64; 2]; 2]) -> Option<ChiSquareTest> {
    let rows = [table[0][0] + table[0][1], table[1][0] + table[1][1]];
    let cols = [table[0][0] + table[1][0], table[0][1] + table[1][1]];
    let total = rows[0] + rows[1];
    if rows.contains(&0) || cols.contains(&0) {
        return None;
    }

    let mut expected = [[0.0; 2]; 2];
    let mut statistic = 0.0;
    for r in 0..2 {
        for c in 0..2 {
            let exp = (rows[r] * cols[c]) as f64 / total as f64;
            expected[r][c] = exp;
            let obs = table[r][c] as f64;
            let diff = exp - obs;
            let corrected = obs + diff.signum() * diff.abs().min(0.5);
            statistic += (corrected - exp).powi(2) / exp;
        }
    }

    let p_value = ChiSquared::new(1.0).ok()?.sf(statistic);
    Some(ChiSquareTest {
        statistic,
        p_value,
        dof: 1,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_summary() {
        let s = Summary::of(&[3.0, 0.0, 10.0]);
        assert_eq!(s.n, 3);
        assert!(close(s.mean, 13.0 / 3.0, 1e-12));
        assert_eq!(s.median, 3.0);
        // population std (ddof = 0)
        assert!(close(s.std, (158.0_f64 / 9.0).sqrt(), 1e-12));

        let even = Summary::of(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(even.median, 2.5);
    }

    #[test]
    fn test_summary_empty_is_zero() {
        assert_eq!(Summary::of(&[]), Summary::default());
        assert_eq!(median(&[]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_student_t_known_value() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [6.0, 7.0, 8.0, 9.0, 10.0];
        let t = t_test(&a, &b, TTestKind::Student).unwrap();
        assert!(close(t.statistic, -5.0, 1e-12));
        assert_eq!(t.df, 8.0);
        assert!(close(t.p_value, 0.001053, 2e-5));
    }

    #[test]
    fn test_welch_matches_student_for_equal_variances() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [6.0, 7.0, 8.0, 9.0, 10.0];
        let s = t_test(&a, &b, TTestKind::Student).unwrap();
        let w = t_test(&a, &b, TTestKind::Welch).unwrap();
        assert!(close(s.p_value, w.p_value, 1e-9));
        assert!(close(w.df, 8.0, 1e-9));
    }

    #[test]
    fn test_welch_unequal_variances() {
        let a = [1.0, 1.1, 0.9, 1.0, 1.05];
        let b = [0.0, 5.0, 10.0, 2.0, 8.0, 12.0];
        let w = t_test(&a, &b, TTestKind::Welch).unwrap();
        // Welch df sits between min(n)-1 and n1+n2-2
        assert!(w.df > 4.0 && w.df < 9.0);
        assert!(w.p_value > 0.0 && w.p_value < 1.0);
    }

    #[test]
    fn test_t_degenerate_inputs() {
        assert!(t_test(&[1.0], &[2.0, 3.0], TTestKind::Student).is_none());
        assert!(t_test(&[2.0, 2.0], &[2.0, 2.0, 2.0], TTestKind::Student).is_none());
        let t = t_test(&[1.0, 1.0], &[3.0, 3.0], TTestKind::Student).unwrap();
        assert_eq!(t.p_value, 0.0);
        assert!(t.statistic.is_infinite() && t.statistic < 0.0);
    }

    #[test]
    fn test_mann_whitney_exact() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [6.0, 7.0, 8.0, 9.0, 10.0];
        let mw = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(mw.method, MannWhitneyMethod::Exact);
        assert_eq!(mw.u, 0.0);
        // only one of C(10, 5) = 252 arrangements is this extreme, each side
        assert!(close(mw.p_value, 2.0 / 252.0, 1e-12));
    }

    #[test]
    fn test_mann_whitney_asymptotic() {
        let a: Vec<f64> = (0..9).map(f64::from).collect();
        let b: Vec<f64> = (9..18).map(f64::from).collect();
        let mw = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(mw.method, MannWhitneyMethod::Asymptotic);
        assert_eq!(mw.u, 0.0);
        // z = 40 / sqrt(128.25)
        assert!(mw.p_value > 0.0003 && mw.p_value < 0.0005);
    }

    #[test]
    fn test_mann_whitney_ties_use_asymptotic() {
        let a = [1.0, 2.0, 2.0, 3.0, 4.0];
        let b = [2.0, 3.0, 5.0, 6.0, 7.0];
        let mw = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(mw.method, MannWhitneyMethod::Asymptotic);
        assert!(mw.p_value > 0.0 && mw.p_value < 1.0);
    }

    #[test]
    fn test_mann_whitney_identical_samples() {
        let a = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0];
        let mw = mann_whitney_u(&a, &a).unwrap();
        assert_eq!(mw.p_value, 1.0);

        let flat = [2.0; 6];
        assert_eq!(mann_whitney_u(&flat, &flat).unwrap().p_value, 1.0);
        assert!(mann_whitney_u(&[], &flat).is_none());
    }

    #[test]
    fn test_exact_u_counts() {
        assert_eq!(exact_u_counts(1, 1), vec![1, 1]);
        assert_eq!(exact_u_counts(2, 2), vec![1, 1, 2, 1, 1]);
        let c = exact_u_counts(5, 5);
        assert_eq!(c.iter().sum::<i128>(), 252);
        // symmetric about m*n/2
        assert!(c.iter().zip(c.iter().rev()).all(|(x, y)| x == y));
    }

    #[test]
    fn test_rank_pooled_averages_ties() {
        let (ranks, groups) = rank_pooled(&[1.0, 2.0], &[2.0, 3.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
        assert_eq!(groups, vec![1, 2, 1]);
    }

    #[test]
    fn test_chi_square_yates() {
        let chi = chi_square_2x2([[10, 20], [30, 40]]).unwrap();
        assert_eq!(chi.dof, 1);
        assert!(close(chi.expected[0][0], 12.0, 1e-12));
        assert!(close(chi.expected[1][1], 42.0, 1e-12));
        // (1.5^2) * (1/12 + 1/18 + 1/28 + 1/42)
        assert!(close(chi.statistic, 0.446_428_571, 1e-6));
        assert!(close(chi.p_value, 0.504, 1e-3));
    }

    #[test]
    fn test_chi_square_zero_margin() {
        assert!(chi_square_2x2([[0, 0], [3, 4]]).is_none());
        assert!(chi_square_2x2([[5, 0], [3, 0]]).is_none());
    }
}
