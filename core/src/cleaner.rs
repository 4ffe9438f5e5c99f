//! Cleaning: turns raw string records into typed rows.
//!
//! Timestamps become `NaiveDateTime`, days become `NaiveDate`,
//! enumerations are parsed strictly, and exact duplicate actions are
//! dropped. Each action also gets its calendar date derived here.

use crate::{
    error::{AnalysisError, AnalysisResult},
    loader::{RawAction, RawAdCost, RawTables, RawUserSource},
    types::{BuildingType, EventKind, ProjectType, Source, UserId},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,
    pub event: EventKind,
    pub building_type: Option<BuildingType>,
    pub user_id: UserId,
    pub project_type: Option<ProjectType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSource {
    pub user_id: UserId,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdCost {
    pub day: NaiveDate,
    pub source: Source,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanTables {
    pub actions: Vec<Action>,
    pub sources: Vec<UserSource>,
    pub costs: Vec<AdCost>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanOutcome {
    pub tables: CleanTables,
    pub duplicates_removed: usize,
}

/// Keep the first occurrence of every row, preserving order.
/// Running it on its own output changes nothing.
pub fn drop_duplicates<T: Clone + Eq + Hash>(rows: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter()
        .filter(|row| seen.insert(*row))
        .cloned()
        .collect()
}

pub fn parse_datetime(value: &str) -> AnalysisResult<NaiveDateTime> {
    let mut last_err = match NaiveDateTime::parse_from_str(value, DATETIME_FORMATS[0]) {
        Ok(ts) => return Ok(ts),
        Err(e) => e,
    };
    for format in &DATETIME_FORMATS[1..] {
        match NaiveDateTime::parse_from_str(value, format) {
            Ok(ts) => return Ok(ts),
            Err(e) => last_err = e,
        }
    }
    // A bare date means midnight.
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(day.and_time(chrono::NaiveTime::default()));
    }
    Err(AnalysisError::DateTime { value: value.to_string(), source: last_err })
}

pub fn parse_day(value: &str) -> AnalysisResult<NaiveDate> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(day) => Ok(day),
        Err(_) => parse_datetime(value).map(|ts| ts.date()),
    }
}

fn required<'a>(value: &'a Option<String>, column: &'static str, row: usize) -> AnalysisResult<&'a str> {
    value
        .as_deref()
        .ok_or(AnalysisError::MissingValue { column, row })
}

fn optional<T: std::str::FromStr<Err = AnalysisError>>(value: &Option<String>) -> AnalysisResult<Option<T>> {
    value.as_deref().map(str::parse).transpose()
}

fn clean_action(raw: &RawAction, row: usize) -> AnalysisResult<Action> {
    let timestamp = parse_datetime(required(&raw.event_datetime, "event_datetime", row)?)?;
    Ok(Action {
        timestamp,
        date: timestamp.date(),
        event: required(&raw.event, "event", row)?.parse()?,
        building_type: optional(&raw.building_type)?,
        user_id: required(&raw.user_id, "user_id", row)?.to_string(),
        project_type: optional(&raw.project_type)?,
    })
}

fn clean_user_source(raw: &RawUserSource, row: usize) -> AnalysisResult<UserSource> {
    Ok(UserSource {
        user_id: required(&raw.user_id, "user_id", row)?.to_string(),
        source: required(&raw.source, "source", row)?.parse()?,
    })
}

fn clean_ad_cost(raw: &RawAdCost, row: usize) -> AnalysisResult<AdCost> {
    let cost_str = required(&raw.cost, "cost", row)?;
    let cost: f64 = cost_str.parse().map_err(|_| AnalysisError::InvalidNumber {
        column: "cost",
        value: cost_str.to_string(),
    })?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(AnalysisError::InvalidNumber { column: "cost", value: cost_str.to_string() });
    }
    Ok(AdCost {
        day: parse_day(required(&raw.day, "day", row)?)?,
        source: required(&raw.source, "source", row)?.parse()?,
        cost,
    })
}

/// Type every table and drop exact duplicate actions.
pub fn clean(raw: &RawTables) -> AnalysisResult<CleanOutcome> {
    let parsed_actions = raw
        .actions
        .iter()
        .enumerate()
        .map(|(i, r)| clean_action(r, i))
        .collect::<AnalysisResult<Vec<_>>>()?;
    let actions = drop_duplicates(&parsed_actions);
    let duplicates_removed = parsed_actions.len() - actions.len();
    if duplicates_removed > 0 {
        log::info!("Dropped {duplicates_removed} duplicate action row(s)");
    }

    let sources = raw
        .sources
        .iter()
        .enumerate()
        .map(|(i, r)| clean_user_source(r, i))
        .collect::<AnalysisResult<Vec<_>>>()?;

    let costs = raw
        .costs
        .iter()
        .enumerate()
        .map(|(i, r)| clean_ad_cost(r, i))
        .collect::<AnalysisResult<Vec<_>>>()?;

    Ok(CleanOutcome {
        tables: CleanTables { actions, sources, costs },
        duplicates_removed,
    })
}
