//! Grouped counts, sums and the cost-per-acquisition metric.
//!
//! Every function here is pure: same inputs, same output, same order.
//! Ties in sorted outputs are broken by source declaration order.

use crate::{
    joiner::{ActivityWindow, CohortDay, EnrichedAction},
    types::{BuildingType, EventKind, ProjectType, Source, UserId, VictoryPath},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUsers {
    pub source: Source,
    pub users: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionCounts {
    /// Users with a `finished_stage_1` event.
    pub finished: usize,
    /// Users who completed the orbital assembly project.
    pub science: usize,
    /// `finished - science`, floored at zero.
    pub warrior: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBuildings {
    pub source: Source,
    pub total: usize,
    pub spaceport: usize,
    pub assembly_shop: usize,
    pub research_center: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDuration {
    pub user_id: UserId,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    /// Whole hours between first and last action, rounded down.
    pub hours: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvents {
    pub user_id: UserId,
    pub source: Option<Source>,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsers {
    pub date: NaiveDate,
    pub source: Source,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySpend {
    pub date: NaiveDate,
    pub source: Source,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCac {
    pub source: Source,
    /// Mean of daily spend ÷ daily new users; `None` when no day qualifies.
    pub cac: Option<f64>,
    /// Days that had both spend and at least one new user.
    pub days: usize,
}

// ── Counts ───────────────────────────────────────────────────────────────────

pub fn total_users(actions: &[EnrichedAction]) -> usize {
    actions
        .iter()
        .map(|e| e.action.user_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct users per source, largest first. Users without a source are not counted.
pub fn users_per_source(actions: &[EnrichedAction]) -> Vec<SourceUsers> {
    let mut users: BTreeMap<Source, HashSet<&str>> = BTreeMap::new();
    for e in actions {
        if let Some(source) = e.source {
            users.entry(source).or_default().insert(e.action.user_id.as_str());
        }
    }
    let mut out: Vec<SourceUsers> = users
        .into_iter()
        .map(|(source, ids)| SourceUsers { source, users: ids.len() })
        .collect();
    out.sort_by(|a, b| b.users.cmp(&a.users).then(a.source.cmp(&b.source)));
    out
}

/// Victory path of every user who finished the first level, by user id.
///
/// A completed orbital assembly project makes a science victory regardless
/// of other events; otherwise a `finished_stage_1` event makes a warrior victory.
pub fn victory_paths(actions: &[EnrichedAction]) -> BTreeMap<UserId, VictoryPath> {
    let mut science: BTreeSet<&str> = BTreeSet::new();
    let mut finished: BTreeSet<&str> = BTreeSet::new();
    for e in actions {
        let a = &e.action;
        if a.project_type == Some(ProjectType::SatelliteOrbitalAssembly) {
            science.insert(a.user_id.as_str());
        }
        if a.event == EventKind::FinishedStage1 {
            finished.insert(a.user_id.as_str());
        }
    }

    let mut paths: BTreeMap<UserId, VictoryPath> = science
        .iter()
        .map(|id| (id.to_string(), VictoryPath::Science))
        .collect();
    for id in finished.difference(&science) {
        paths.insert(id.to_string(), VictoryPath::Warrior);
    }
    paths
}

pub fn completion_counts(actions: &[EnrichedAction]) -> CompletionCounts {
    let finished = actions
        .iter()
        .filter(|e| e.action.event == EventKind::FinishedStage1)
        .map(|e| e.action.user_id.as_str())
        .collect::<HashSet<_>>()
        .len();
    let science = victory_paths(actions)
        .values()
        .filter(|p| **p == VictoryPath::Science)
        .count();
    CompletionCounts { finished, science, warrior: finished.saturating_sub(science) }
}

/// Buildings per source, split by type, most buildings first.
pub fn buildings_per_source(actions: &[EnrichedAction]) -> Vec<SourceBuildings> {
    let mut by_source: BTreeMap<Source, SourceBuildings> = BTreeMap::new();
    for e in actions {
        let Some(source) = e.source else { continue };
        if e.action.event != EventKind::Building {
            continue;
        }
        let row = by_source
            .entry(source)
            .or_insert_with(|| SourceBuildings {
                source,
                total: 0,
                spaceport: 0,
                assembly_shop: 0,
                research_center: 0,
            });
        row.total += 1;
        match e.action.building_type {
            Some(BuildingType::Spaceport)      => row.spaceport += 1,
            Some(BuildingType::AssemblyShop)   => row.assembly_shop += 1,
            Some(BuildingType::ResearchCenter) => row.research_center += 1,
            None => {}
        }
    }
    let mut out: Vec<SourceBuildings> = by_source.into_values().collect();
    out.sort_by(|a, b| b.total.cmp(&a.total).then(a.source.cmp(&b.source)));
    out
}

/// Elapsed whole hours between each user's first and last action.
pub fn user_durations(windows: &[ActivityWindow]) -> Vec<UserDuration> {
    windows
        .iter()
        .map(|w| UserDuration {
            user_id: w.user_id.clone(),
            first: w.first,
            last: w.last,
            hours: (w.last - w.first).num_hours().max(0),
        })
        .collect()
}

/// Number of action rows per user, sorted by user id.
pub fn events_per_user(actions: &[EnrichedAction]) -> Vec<UserEvents> {
    let mut counts: BTreeMap<&str, UserEvents> = BTreeMap::new();
    for e in actions {
        counts
            .entry(e.action.user_id.as_str())
            .or_insert_with(|| UserEvents {
                user_id: e.action.user_id.clone(),
                source: e.source,
                events: 0,
            })
            .events += 1;
    }
    counts.into_values().collect()
}

// ── Acquisition cost ─────────────────────────────────────────────────────────

/// Distinct users starting on each (date, source). Cells with no users are omitted.
pub fn daily_new_users(days: &[CohortDay]) -> Vec<DailyUsers> {
    days.iter()
        .filter(|d| !d.users.is_empty())
        .map(|d| DailyUsers { date: d.date, source: d.source, users: d.users.len() })
        .collect()
}

/// Spend per aligned (date, source). Cells with no spend row are omitted.
pub fn daily_spend(days: &[CohortDay]) -> Vec<DailySpend> {
    days.iter()
        .filter_map(|d| d.spend.map(|cost| DailySpend { date: d.date, source: d.source, cost }))
        .collect()
}

/// Cost per acquisition for each of the four sources.
///
/// For every day with spend and at least one new user, spend ÷ users is
/// taken; the CAC is the mean of those daily ratios. Days without users
/// have an undefined ratio and do not count.
pub fn acquisition_cost(days: &[CohortDay]) -> Vec<SourceCac> {
    Source::ALL
        .into_iter()
        .map(|source| {
            let ratios: Vec<f64> = days
                .iter()
                .filter(|d| d.source == source && !d.users.is_empty())
                .filter_map(|d| d.spend.map(|spend| spend / d.users.len() as f64))
                .collect();
            let cac = if ratios.is_empty() {
                None
            } else {
                Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
            };
            SourceCac { source, cac, days: ratios.len() }
        })
        .collect()
}
