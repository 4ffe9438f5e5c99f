//! Independent two-sample t-tests.
//!
//! Two families of tests are run, each at the configured alpha:
//!   1. Elapsed hours of warrior vs. science users.
//!   2. Events per user for every pair of the four sources (6 tests).
//!
//! No multiple-comparison correction is applied: each pairwise test
//! stands alone at alpha. A comparison with a group of fewer than two
//! observations is reported as skipped rather than failing the run.

use crate::{
    aggregator::{UserDuration, UserEvents},
    error::{AnalysisError, AnalysisResult},
    types::{Source, UserId, VictoryPath},
};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;

/// Variance assumption of the two-sample test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variance {
    /// Student's test with pooled variance.
    Equal,
    /// Welch's test.
    Unequal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTest {
    /// `None` when both samples have zero variance.
    pub statistic: Option<f64>,
    pub df: f64,
    /// Two-sided p-value, always within [0, 1].
    pub p_value: f64,
    pub mean_a: f64,
    pub mean_b: f64,
}

/// One named comparison. A group with fewer than two observations leaves
/// the comparison untested; the rest of the run is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub group_a: String,
    pub group_b: String,
    pub n_a: usize,
    pub n_b: usize,
    /// Group means; `None` for an empty group.
    pub mean_a: Option<f64>,
    pub mean_b: Option<f64>,
    /// `None` when the test could not be run.
    pub test: Option<TTest>,
    /// Why the test was not run.
    pub skipped: Option<String>,
    pub alpha: f64,
    pub reject_null: bool,
}

impl TestOutcome {
    /// Run `t_test` on `a` and `b`. Too-small groups become a skipped outcome.
    fn decide(
        name: String,
        group_a: &str,
        group_b: &str,
        a: &[f64],
        b: &[f64],
        variance: Variance,
        alpha: f64,
    ) -> AnalysisResult<Self> {
        let (test, skipped) = match t_test(a, b, variance) {
            Ok(test) => (Some(test), None),
            Err(err @ AnalysisError::GroupTooSmall { .. }) => {
                let reason = rename_group(err, group_a, group_b).to_string();
                log::warn!("{name} not tested: {reason}");
                (None, Some(reason))
            }
            Err(other) => return Err(other),
        };
        Ok(Self {
            name,
            group_a: group_a.to_string(),
            group_b: group_b.to_string(),
            n_a: a.len(),
            n_b: b.len(),
            mean_a: mean_of(a),
            mean_b: mean_of(b),
            reject_null: test.is_some_and(|t| t.p_value < alpha),
            test,
            skipped,
            alpha,
        })
    }

    pub fn p_value(&self) -> Option<f64> {
        self.test.map(|t| t.p_value)
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn mean_of(xs: &[f64]) -> Option<f64> {
    (!xs.is_empty()).then(|| mean(xs))
}

/// Sample variance (ddof = 1). Callers guarantee `xs.len() >= 2`.
fn var_sample(xs: &[f64], mean: f64) -> f64 {
    let ss: f64 = xs.iter().map(|v| (v - mean) * (v - mean)).sum();
    ss / (xs.len() - 1) as f64
}

fn two_sided_p(statistic: f64, df: f64) -> AnalysisResult<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| anyhow::anyhow!("Student's t distribution with df={df}: {e}"))?;
    Ok((2.0 * dist.sf(statistic.abs())).clamp(0.0, 1.0))
}

/// Two-sided independent two-sample t-test of `a` against `b`.
///
/// When both samples have zero variance the statistic is undefined; p is 1
/// if the means match and 0 otherwise.
pub fn t_test(a: &[f64], b: &[f64], variance: Variance) -> AnalysisResult<TTest> {
    for (group, xs) in [("a", a), ("b", b)] {
        if xs.len() < 2 {
            return Err(AnalysisError::GroupTooSmall { group: group.into(), size: xs.len() });
        }
    }

    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let (mean_a, mean_b) = (mean(a), mean(b));
    let (var_a, var_b) = (var_sample(a, mean_a), var_sample(b, mean_b));

    let (se, df) = match variance {
        Variance::Equal => {
            let df = n_a + n_b - 2.0;
            let pooled = ((n_a - 1.0) * var_a + (n_b - 1.0) * var_b) / df;
            ((pooled * (1.0 / n_a + 1.0 / n_b)).sqrt(), df)
        }
        Variance::Unequal => {
            let (va, vb) = (var_a / n_a, var_b / n_b);
            let denom = va * va / (n_a - 1.0) + vb * vb / (n_b - 1.0);
            let df = if denom > 0.0 { (va + vb).powi(2) / denom } else { n_a + n_b - 2.0 };
            ((va + vb).sqrt(), df)
        }
    };

    let diff = mean_a - mean_b;
    if se == 0.0 {
        let p_value = if diff == 0.0 { 1.0 } else { 0.0 };
        return Ok(TTest { statistic: None, df, p_value, mean_a, mean_b });
    }

    let statistic = diff / se;
    let p_value = two_sided_p(statistic, df)?;
    Ok(TTest { statistic: Some(statistic), df, p_value, mean_a, mean_b })
}

/// Do warrior and science users take different times to finish?
/// Group a is warrior, group b is science.
pub fn victory_path_test(
    durations: &[UserDuration],
    paths: &BTreeMap<UserId, VictoryPath>,
    alpha: f64,
    variance: Variance,
) -> AnalysisResult<TestOutcome> {
    let mut warrior = Vec::new();
    let mut science = Vec::new();
    for d in durations {
        match paths.get(&d.user_id) {
            Some(VictoryPath::Warrior) => warrior.push(d.hours as f64),
            Some(VictoryPath::Science) => science.push(d.hours as f64),
            None => {}
        }
    }

    let outcome = TestOutcome::decide(
        "completion_hours_by_victory_path".into(),
        "warrior",
        "science",
        &warrior,
        &science,
        variance,
        alpha,
    )?;
    log::debug!("victory path test: p={:?}", outcome.p_value());
    Ok(outcome)
}

/// Every unordered pair of sources, in declaration order.
pub fn source_pairs() -> Vec<(Source, Source)> {
    let mut pairs = Vec::with_capacity(6);
    for (i, a) in Source::ALL.iter().enumerate() {
        for b in &Source::ALL[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}

/// Does the number of events per user differ between two sources?
/// One test per pair of sources.
pub fn source_pair_tests(
    events: &[UserEvents],
    alpha: f64,
    variance: Variance,
) -> AnalysisResult<Vec<TestOutcome>> {
    let mut by_source: BTreeMap<Source, Vec<f64>> = BTreeMap::new();
    for u in events {
        if let Some(source) = u.source {
            by_source.entry(source).or_default().push(u.events as f64);
        }
    }

    let empty = Vec::new();
    source_pairs()
        .into_iter()
        .map(|(a, b)| -> AnalysisResult<TestOutcome> {
            let xs = by_source.get(&a).unwrap_or(&empty);
            let ys = by_source.get(&b).unwrap_or(&empty);
            TestOutcome::decide(
                format!("events_per_user_{a}_vs_{b}"),
                a.as_str(),
                b.as_str(),
                xs,
                ys,
                variance,
                alpha,
            )
        })
        .collect()
}

fn rename_group(err: AnalysisError, a: &str, b: &str) -> AnalysisError {
    match err {
        AnalysisError::GroupTooSmall { group, size } => AnalysisError::GroupTooSmall {
            group: if group == "a" { a.to_string() } else { b.to_string() },
            size,
        },
        other => other,
    }
}
