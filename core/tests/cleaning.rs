//! Cleaner tests: typing, duplicate removal, malformed input.

use adsource_core::{
    cleaner::{self, drop_duplicates},
    error::AnalysisError,
    loader::{LocalSource, RawAction, RawAdCost, RawTables, RawUserSource, load_tables},
    config::TableFiles,
    types::{BuildingType, EventKind, ProjectType, Source},
};
use chrono::{NaiveDate, NaiveDateTime};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fixture_tables() -> RawTables {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
    load_tables(&LocalSource::new(dir), &TableFiles::default()).expect("fixture tables")
}

fn raw_action(ts: &str, event: &str, building: Option<&str>, user: &str) -> RawAction {
    RawAction {
        event_datetime: Some(ts.into()),
        event: Some(event.into()),
        building_type: building.map(Into::into),
        user_id: Some(user.into()),
        project_type: None,
    }
}

fn one_action(action: RawAction) -> RawTables {
    RawTables {
        actions: vec![action],
        sources: vec![RawUserSource { user_id: Some("u1".into()), source: Some("facebook_ads".into()) }],
        costs: vec![],
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// The fixture carries one exact duplicate action, which must be dropped.
#[test]
fn exact_duplicate_actions_are_dropped() {
    let raw = fixture_tables();
    let cleaned = cleaner::clean(&raw).unwrap();

    assert_eq!(raw.actions.len(), 22);
    assert_eq!(cleaned.duplicates_removed, 1);
    assert_eq!(cleaned.tables.actions.len(), 21);
}

/// Running deduplication on its own output changes nothing.
#[test]
fn deduplication_is_idempotent() {
    let raw = fixture_tables();
    let once = drop_duplicates(&raw.actions);
    let twice = drop_duplicates(&once);

    assert_eq!(once.len(), twice.len());
    assert_eq!(once, twice);
}

/// The first occurrence is kept and order is preserved.
#[test]
fn deduplication_keeps_first_occurrence_order() {
    let rows = vec![3, 1, 3, 2, 1, 4];
    assert_eq!(drop_duplicates(&rows), vec![3, 1, 2, 4]);
}

#[test]
fn timestamps_and_dates_are_parsed() {
    let cleaned = cleaner::clean(&fixture_tables()).unwrap();
    let first = &cleaned.tables.actions[0];

    let expected = NaiveDateTime::parse_from_str("2020-05-04 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    assert_eq!(first.timestamp, expected);
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2020, 5, 4).unwrap());
    assert_eq!(first.event, EventKind::Building);
    assert_eq!(first.building_type, Some(BuildingType::AssemblyShop));
    assert_eq!(first.project_type, None);

    let project = cleaned
        .tables
        .actions
        .iter()
        .find(|a| a.event == EventKind::Project)
        .expect("a project row");
    assert_eq!(project.project_type, Some(ProjectType::SatelliteOrbitalAssembly));
    assert_eq!(project.building_type, None);
}

#[test]
fn ad_costs_are_typed() {
    let cleaned = cleaner::clean(&fixture_tables()).unwrap();
    let costs = &cleaned.tables.costs;

    assert_eq!(costs.len(), 7);
    assert_eq!(costs[0].source, Source::YandexDirect);
    assert_eq!(costs[0].day, NaiveDate::from_ymd_opt(2020, 5, 3).unwrap());
    assert!((costs[0].cost - 100.0).abs() < 1e-9);
}

#[test]
fn alternative_timestamp_layouts_are_accepted() {
    let iso = cleaner::parse_datetime("2020-05-04T00:00:01").unwrap();
    let frac = cleaner::parse_datetime("2020-05-04 00:00:01.250").unwrap();
    let bare = cleaner::parse_datetime("2020-05-04").unwrap();

    assert_eq!(iso.date(), NaiveDate::from_ymd_opt(2020, 5, 4).unwrap());
    assert_eq!(frac.date(), iso.date());
    assert_eq!(bare.format("%H:%M:%S").to_string(), "00:00:00");
}

#[test]
fn malformed_timestamp_is_fatal() {
    let raw = one_action(raw_action("04/05/2020 10:00", "building", Some("spaceport"), "u1"));
    let err = cleaner::clean(&raw).unwrap_err();
    assert!(matches!(err, AnalysisError::DateTime { .. }), "got {err}");
}

#[test]
fn unknown_event_kind_is_fatal() {
    let raw = one_action(raw_action("2020-05-04 10:00:00", "teleported", None, "u1"));
    let err = cleaner::clean(&raw).unwrap_err();
    assert!(
        matches!(err, AnalysisError::UnknownValue { column: "event", .. }),
        "got {err}"
    );
}

#[test]
fn missing_user_id_is_fatal() {
    let mut action = raw_action("2020-05-04 10:00:00", "building", Some("spaceport"), "u1");
    action.user_id = None;
    let err = cleaner::clean(&one_action(action)).unwrap_err();
    assert!(
        matches!(err, AnalysisError::MissingValue { column: "user_id", row: 0 }),
        "got {err}"
    );
}

#[test]
fn negative_cost_is_rejected() {
    let raw = RawTables {
        actions: vec![],
        sources: vec![],
        costs: vec![RawAdCost {
            day: Some("2020-05-03".into()),
            source: Some("yandex_direct".into()),
            cost: Some("-5".into()),
        }],
    };
    let err = cleaner::clean(&raw).unwrap_err();
    assert!(
        matches!(err, AnalysisError::InvalidNumber { column: "cost", .. }),
        "got {err}"
    );
}

#[test]
fn unknown_source_is_rejected() {
    let raw = RawTables {
        actions: vec![],
        sources: vec![RawUserSource { user_id: Some("u1".into()), source: Some("tiktok".into()) }],
        costs: vec![],
    };
    assert!(cleaner::clean(&raw).is_err());
}
