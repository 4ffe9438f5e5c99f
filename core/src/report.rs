//! The assembled analysis report and its console rendering.

use crate::{
    aggregator::{CompletionCounts, DailySpend, DailyUsers, SourceBuildings, SourceCac, SourceUsers},
    hypothesis::TestOutcome,
    loader::{DatasetOverview, LoadOrigin},
    types::{RunId, Source},
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRank {
    pub rank: usize,
    pub source: Source,
    pub cac: Option<f64>,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: RunId,
    pub origin: LoadOrigin,
    pub location: String,
    pub overview: DatasetOverview,
    pub duplicates_removed: usize,
    pub total_users: usize,
    pub users_per_source: Vec<SourceUsers>,
    pub completions: CompletionCounts,
    pub buildings: Vec<SourceBuildings>,
    pub daily_users: Vec<DailyUsers>,
    pub daily_spend: Vec<DailySpend>,
    pub cac: Vec<SourceCac>,
    pub victory_test: TestOutcome,
    pub source_tests: Vec<TestOutcome>,
    pub channel_ranking: Vec<ChannelRank>,
}

impl AnalysisReport {
    /// `None` when nobody won as a warrior.
    pub fn mean_hours_warrior(&self) -> Option<f64> {
        self.victory_test.mean_a
    }

    pub fn mean_hours_science(&self) -> Option<f64> {
        self.victory_test.mean_b
    }

    pub fn users_for(&self, source: Source) -> usize {
        self.users_per_source
            .iter()
            .find(|u| u.source == source)
            .map_or(0, |u| u.users)
    }

    pub fn cac_for(&self, source: Source) -> Option<f64> {
        self.cac.iter().find(|c| c.source == source).and_then(|c| c.cac)
    }
}

/// Cheapest channel first. Sources with no CAC go last, ordered by users.
pub fn channel_ranking(cac: &[SourceCac], users: &[SourceUsers]) -> Vec<ChannelRank> {
    let users_of = |source: Source| users.iter().find(|u| u.source == source).map_or(0, |u| u.users);

    let mut rows: Vec<(Source, Option<f64>, usize)> = cac
        .iter()
        .map(|c| (c.source, c.cac, users_of(c.source)))
        .collect();
    rows.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y).then(b.2.cmp(&a.2)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.2.cmp(&a.2).then(a.0.cmp(&b.0)),
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, (source, cac, users))| ChannelRank { rank: i + 1, source, cac, users })
        .collect()
}

/// One-line verdict for a test outcome.
pub fn conclusion(outcome: &TestOutcome) -> String {
    let subject = if outcome.name.starts_with("completion_hours") {
        "completion time"
    } else {
        "events per user"
    };
    let Some(test) = outcome.test else {
        return format!(
            "Not tested: {subject} of {} vs {} ({})",
            outcome.group_a,
            outcome.group_b,
            outcome.skipped.as_deref().unwrap_or("no result"),
        );
    };
    if outcome.reject_null {
        format!(
            "Reject H0 (p={:.4} < {}): {subject} differs between {} and {} ({:.1} vs {:.1})",
            test.p_value,
            outcome.alpha,
            outcome.group_a,
            outcome.group_b,
            test.mean_a,
            test.mean_b,
        )
    } else {
        format!(
            "Fail to reject H0 (p={:.4} >= {}): no evidence that {subject} differs between {} and {}",
            test.p_value, outcome.alpha, outcome.group_a, outcome.group_b,
        )
    }
}

fn fmt_hours(hours: Option<f64>) -> String {
    hours.map_or_else(|| "n/a".to_string(), |v| format!("{v:.0}"))
}

fn fmt_cac(cac: Option<f64>) -> String {
    cac.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

impl AnalysisReport {
    pub fn render_text(&self) -> String {
        // Writing to a String cannot fail.
        let mut out = String::new();
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "=== DATA ===")?;
        writeln!(out, "  run_id:      {}", self.run_id)?;
        writeln!(out, "  origin:      {:?} ({})", self.origin, self.location)?;
        for profile in [&self.overview.actions, &self.overview.sources, &self.overview.costs] {
            let nulls: Vec<String> = profile
                .null_counts
                .iter()
                .filter(|(_, n)| *n > 0)
                .map(|(c, n)| format!("{c}={n}"))
                .collect();
            writeln!(
                out,
                "  {:<12} rows={} duplicates={} nulls=[{}]",
                profile.table,
                profile.rows,
                profile.duplicate_rows,
                nulls.join(", ")
            )?;
        }
        writeln!(out, "  duplicates removed: {}", self.duplicates_removed)?;
        writeln!(out)?;

        writeln!(out, "=== USERS PER SOURCE (total {}) ===", self.total_users)?;
        for u in &self.users_per_source {
            writeln!(out, "  {:<24} {}", u.source, u.users)?;
        }
        writeln!(out)?;

        writeln!(out, "=== FIRST LEVEL COMPLETIONS ===")?;
        writeln!(out, "  finished:        {}", self.completions.finished)?;
        writeln!(out, "  science victory: {}", self.completions.science)?;
        writeln!(out, "  warrior victory: {}", self.completions.warrior)?;
        writeln!(out)?;

        writeln!(out, "=== BUILDINGS PER SOURCE ===")?;
        for b in &self.buildings {
            writeln!(
                out,
                "  {:<24} total={} spaceport={} assembly_shop={} research_center={}",
                b.source, b.total, b.spaceport, b.assembly_shop, b.research_center
            )?;
        }
        writeln!(out)?;

        writeln!(out, "=== COST PER ACQUISITION ===")?;
        for c in &self.cac {
            writeln!(out, "  {:<24} {} ({} day(s))", c.source, fmt_cac(c.cac), c.days)?;
        }
        writeln!(out)?;

        writeln!(out, "=== HYPOTHESIS TESTS ===")?;
        writeln!(
            out,
            "  mean hours: warrior {}, science {}",
            fmt_hours(self.mean_hours_warrior()),
            fmt_hours(self.mean_hours_science())
        )?;
        writeln!(out, "  {}", conclusion(&self.victory_test))?;
        for t in &self.source_tests {
            writeln!(out, "  {}", conclusion(t))?;
        }
        writeln!(out)?;

        writeln!(out, "=== CHANNEL PRIORITY ===")?;
        for r in &self.channel_ranking {
            writeln!(out, "  {}. {:<24} cac={} users={}", r.rank, r.source, fmt_cac(r.cac), r.users)?;
        }
        Ok(())
    }
}
