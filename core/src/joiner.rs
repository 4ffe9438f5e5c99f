//! Joins between the cleaned tables.
//!
//! Actions are left-joined to user sources. Per-user activity windows
//! are outer-joined to spend on (source, date), where the spend day is
//! shifted by a fixed offset so that it lines up with the cohort start date.

use crate::{
    cleaner::{Action, AdCost, UserSource},
    types::{Source, UserId},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// An action with the acquisition source of its user, if known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAction {
    pub action: Action,
    pub source: Option<Source>,
}

/// First and last activity of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityWindow {
    pub user_id: UserId,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub source: Option<Source>,
}

impl ActivityWindow {
    /// The day the user joined the cohort.
    pub fn cohort_date(&self) -> NaiveDate {
        self.first.date()
    }
}

/// One (date, source) cell of the spend/cohort outer join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortDay {
    pub date: NaiveDate,
    pub source: Source,
    /// Users whose activity started on `date`, sorted.
    pub users: Vec<UserId>,
    /// Spend attributed to `date`; `None` when no spend row aligns with it.
    pub spend: Option<f64>,
}

/// Left join of actions to the user-source table on `user_id`.
/// Users missing from `sources` keep `source = None`. If a user is listed
/// twice, the first listing wins.
pub fn attach_sources(actions: &[Action], sources: &[UserSource]) -> Vec<EnrichedAction> {
    let mut by_user: HashMap<&str, Source> = HashMap::with_capacity(sources.len());
    for row in sources {
        if let Some(existing) = by_user.get(row.user_id.as_str()) {
            if *existing != row.source {
                log::warn!(
                    "User {} listed under both {} and {}; keeping {}",
                    row.user_id, existing, row.source, existing
                );
            }
            continue;
        }
        by_user.insert(row.user_id.as_str(), row.source);
    }

    let enriched: Vec<EnrichedAction> = actions
        .iter()
        .map(|a| EnrichedAction {
            action: a.clone(),
            source: by_user.get(a.user_id.as_str()).copied(),
        })
        .collect();

    let unmatched = enriched.iter().filter(|e| e.source.is_none()).count();
    if unmatched > 0 {
        log::warn!("{unmatched} action row(s) have no acquisition source");
    }
    enriched
}

/// Per-user first/last timestamp, sorted by user id.
pub fn activity_windows(actions: &[EnrichedAction]) -> Vec<ActivityWindow> {
    let mut windows: BTreeMap<&str, ActivityWindow> = BTreeMap::new();
    for e in actions {
        let ts = e.action.timestamp;
        windows
            .entry(e.action.user_id.as_str())
            .and_modify(|w| {
                w.first = w.first.min(ts);
                w.last = w.last.max(ts);
                if w.source.is_none() {
                    w.source = e.source;
                }
            })
            .or_insert_with(|| ActivityWindow {
                user_id: e.action.user_id.clone(),
                first: ts,
                last: ts,
                source: e.source,
            });
    }
    windows.into_values().collect()
}

/// Outer join of cohort starts and spend on (source, date).
///
/// A spend row for `day` lands on `day + offset_days`. Users without a
/// source cannot be attributed and are left out. Output is sorted by
/// (date, source).
pub fn align_spend(windows: &[ActivityWindow], costs: &[AdCost], offset_days: i64) -> Vec<CohortDay> {
    let mut cells: BTreeMap<(NaiveDate, Source), (BTreeSet<UserId>, Option<f64>)> = BTreeMap::new();

    for w in windows {
        let Some(source) = w.source else { continue };
        cells
            .entry((w.cohort_date(), source))
            .or_default()
            .0
            .insert(w.user_id.clone());
    }

    let offset = Duration::days(offset_days);
    for c in costs {
        let spend = &mut cells.entry((c.day + offset, c.source)).or_default().1;
        *spend = Some(spend.unwrap_or(0.0) + c.cost);
    }

    cells
        .into_iter()
        .map(|((date, source), (users, spend))| CohortDay {
            date,
            source,
            users: users.into_iter().collect(),
            spend,
        })
        .collect()
}
