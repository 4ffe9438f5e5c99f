//! Loader tests: parsing, primary/fallback behaviour, dataset overview.

use adsource_core::{
    config::TableFiles,
    error::{AnalysisError, AnalysisResult},
    loader::{
        count_duplicates, load_tables, load_with_fallback, parse_table, profile_tables,
        DataSource, LoadOrigin, LocalSource, RawUserSource,
    },
};
use std::cell::Cell;

// ── Helpers ──────────────────────────────────────────────────────────────────

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// A primary source that is always unreachable.
struct Unreachable {
    calls: Cell<usize>,
}

impl DataSource for Unreachable {
    fn describe(&self) -> String {
        "unreachable://datasets".into()
    }

    fn fetch(&self, file: &str) -> AnalysisResult<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        Err(AnalysisError::FetchStatus {
            origin: self.describe(),
            file: file.to_string(),
            status: 503,
        })
    }
}

/// Serves the real actions table but nothing else.
struct PartialPrimary;

impl DataSource for PartialPrimary {
    fn describe(&self) -> String {
        "partial".into()
    }

    fn fetch(&self, file: &str) -> AnalysisResult<Vec<u8>> {
        if file == "game_actions.csv" {
            LocalSource::new(FIXTURES).fetch(file)
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, file.to_string()).into())
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn local_source_reads_all_three_tables() {
    let tables = load_tables(&LocalSource::new(FIXTURES), &TableFiles::default()).unwrap();

    assert_eq!(tables.actions.len(), 22);
    assert_eq!(tables.sources.len(), 8);
    assert_eq!(tables.costs.len(), 7);
    assert_eq!(tables.actions[2].building_type, None, "empty field must read as null");
}

#[test]
fn columns_are_matched_by_header_name() {
    let csv = b"source,user_id\nfacebook_ads,abc\n";
    let rows: Vec<RawUserSource> = parse_table(csv).unwrap();

    assert_eq!(rows[0].user_id.as_deref(), Some("abc"));
    assert_eq!(rows[0].source.as_deref(), Some("facebook_ads"));
}

#[test]
fn primary_is_used_when_it_works() {
    let primary = LocalSource::new(FIXTURES);
    let fallback = LocalSource::new("/nonexistent/fallback");

    let loaded = load_with_fallback(Some(&primary), &fallback, &TableFiles::default()).unwrap();
    assert_eq!(loaded.origin, LoadOrigin::Primary);
    assert_eq!(loaded.location, FIXTURES);
}

#[test]
fn failing_primary_falls_back_to_local_files() {
    let primary = Unreachable { calls: Cell::new(0) };
    let fallback = LocalSource::new(FIXTURES);

    let loaded = load_with_fallback(Some(&primary), &fallback, &TableFiles::default()).unwrap();

    assert_eq!(loaded.origin, LoadOrigin::Fallback);
    assert_eq!(loaded.tables.actions.len(), 22);
    assert_eq!(primary.calls.get(), 1, "first failure must stop the primary attempt");
}

/// A primary that serves only some tables is not mixed with the fallback.
#[test]
fn partial_primary_falls_back_for_every_table() {
    let fallback = LocalSource::new(FIXTURES);
    let loaded = load_with_fallback(Some(&PartialPrimary), &fallback, &TableFiles::default()).unwrap();

    assert_eq!(loaded.origin, LoadOrigin::Fallback);
    assert_eq!(loaded.location, FIXTURES);
}

#[test]
fn fallback_failure_is_fatal() {
    let primary = Unreachable { calls: Cell::new(0) };
    let fallback = LocalSource::new("/nonexistent/fallback");

    let err = load_with_fallback(Some(&primary), &fallback, &TableFiles::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::Io(_)), "got {err}");
}

#[test]
fn no_primary_goes_straight_to_fallback() {
    let loaded = load_with_fallback(None, &LocalSource::new(FIXTURES), &TableFiles::default()).unwrap();
    assert_eq!(loaded.origin, LoadOrigin::Fallback);
}

#[test]
fn overview_counts_nulls_and_duplicates() {
    let tables = load_tables(&LocalSource::new(FIXTURES), &TableFiles::default()).unwrap();
    let overview = profile_tables(&tables);

    assert_eq!(overview.actions.rows, 22);
    assert_eq!(overview.actions.duplicate_rows, 1);

    let nulls = |column: &str| {
        overview
            .actions
            .null_counts
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, n)| *n)
            .unwrap()
    };
    // 5 finished_stage_1 rows + 2 project rows carry no building type.
    assert_eq!(nulls("building_type"), 7);
    assert_eq!(nulls("project_type"), 20);
    assert_eq!(nulls("user_id"), 0);

    assert_eq!(overview.sources.duplicate_rows, 0);
    assert_eq!(overview.costs.rows, 7);
    assert_eq!(
        overview.spend_sources,
        vec!["yandex_direct", "facebook_ads", "instagram_new_adverts", "youtube_channel_reklama"]
    );
}

#[test]
fn duplicate_counter_counts_extra_copies() {
    assert_eq!(count_duplicates(&["a", "b", "a", "a", "c"]), 2);
    assert_eq!(count_duplicates::<u8>(&[]), 0);
}
