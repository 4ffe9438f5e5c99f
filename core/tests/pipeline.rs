//! End-to-end pipeline tests: fixture run, stage log, report store.

use adsource_core::{
    config::{AnalysisConfig, TableFiles},
    event::PipelineEvent,
    loader::{load_tables, LoadOrigin, LoadedTables, LocalSource, RawTables},
    pipeline::AnalysisPipeline,
    report::{channel_ranking, conclusion},
    aggregator::{SourceCac, SourceUsers},
    store::ReportStore,
    types::Source,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn offline_pipeline(run_id: &str) -> AnalysisPipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    AnalysisPipeline::in_memory(run_id.into(), AnalysisConfig::offline(FIXTURES)).expect("pipeline")
}

/// Fixture tables with every action of `users` removed.
fn fixture_without(users: &[&str]) -> LoadedTables {
    let mut tables: RawTables = load_tables(&LocalSource::new(FIXTURES), &TableFiles::default()).unwrap();
    tables
        .actions
        .retain(|a| !users.contains(&a.user_id.as_deref().unwrap_or_default()));
    LoadedTables { tables, origin: LoadOrigin::Fallback, location: FIXTURES.into() }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn fixture_run_reproduces_hand_checked_figures() {
    let mut pipeline = offline_pipeline("fixture-run");
    let report = pipeline.run().unwrap();

    assert_eq!(report.origin, LoadOrigin::Fallback);
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.total_users, 8);
    assert_eq!(report.completions.finished, 5);
    assert_eq!(report.completions.science, 2);
    assert_eq!(report.completions.warrior, 3);
    assert!((report.mean_hours_warrior().unwrap() - 41.0).abs() < 1e-9);
    assert!((report.mean_hours_science().unwrap() - 85.0).abs() < 1e-9);
    assert!(report.victory_test.reject_null);
    assert_eq!(report.source_tests.len(), 6);
    assert_eq!(report.cac_for(Source::InstagramNewAdverts), Some(30.0));
    assert_eq!(report.users_for(Source::FacebookAds), 2);
}

#[test]
fn channels_are_ranked_cheapest_first() {
    let mut pipeline = offline_pipeline("ranking-run");
    let report = pipeline.run().unwrap();

    let order: Vec<Source> = report.channel_ranking.iter().map(|r| r.source).collect();
    assert_eq!(
        order,
        vec![
            Source::InstagramNewAdverts,
            Source::YandexDirect,
            Source::FacebookAds,
            Source::YoutubeChannelReklama,
        ]
    );
    assert_eq!(report.channel_ranking[0].rank, 1);
}

#[test]
fn sources_without_cac_rank_last() {
    let cac = vec![
        SourceCac { source: Source::YandexDirect, cac: None, days: 0 },
        SourceCac { source: Source::FacebookAds, cac: Some(12.0), days: 3 },
        SourceCac { source: Source::InstagramNewAdverts, cac: None, days: 0 },
    ];
    let users = vec![
        SourceUsers { source: Source::InstagramNewAdverts, users: 9 },
        SourceUsers { source: Source::YandexDirect, users: 4 },
    ];
    let ranking = channel_ranking(&cac, &users);

    assert_eq!(ranking[0].source, Source::FacebookAds);
    assert_eq!(ranking[1].source, Source::InstagramNewAdverts, "more users first among unpriced");
    assert_eq!(ranking[2].source, Source::YandexDirect);
}

#[test]
fn every_stage_is_logged_in_order() {
    let mut pipeline = offline_pipeline("stage-log-run");
    pipeline.run().unwrap();

    let entries = pipeline.store_stage_events().unwrap();
    let stages: Vec<&str> = entries.iter().map(|e| e.stage.as_str()).collect();

    // 1 init + load + clean + join + aggregate + 7 tests + report
    assert_eq!(entries.len(), 13);
    assert_eq!(stages[..5], ["engine", "load", "clean", "join", "aggregate"]);
    assert!(stages[5..12].iter().all(|s| *s == "test"));
    assert_eq!(stages[12], "report");

    for (i, e) in entries.iter().enumerate() {
        assert_eq!(e.seq as usize, i);
        let event: PipelineEvent = serde_json::from_str(&e.payload).unwrap();
        assert_eq!(event.type_name(), e.event_type);
    }

    let cleaned: PipelineEvent = serde_json::from_str(&entries[2].payload).unwrap();
    assert_eq!(cleaned, PipelineEvent::TablesCleaned { actions: 21, duplicates_removed: 1 });
}

#[test]
fn report_is_persisted_and_reloadable() {
    let mut pipeline = offline_pipeline("persist-run");
    let report = pipeline.run().unwrap();
    let store = pipeline.store();

    let reloaded = store.load_report("persist-run").unwrap().expect("stored report");
    assert_eq!(reloaded.run_id, report.run_id);
    assert_eq!(reloaded.completions, report.completions);
    assert_eq!(reloaded.channel_ranking.len(), report.channel_ranking.len());
    assert_eq!(reloaded.overview, report.overview);
    assert!((reloaded.victory_test.p_value().unwrap() - report.victory_test.p_value().unwrap()).abs() < 1e-12);

    let summaries = store.source_summaries("persist-run").unwrap();
    assert_eq!(summaries.len(), 4);
    assert_eq!(summaries[0].source, "instagram_new_adverts");
    assert_eq!(summaries[0].priority_rank, 1);
    assert_eq!(summaries[0].cac, Some(30.0));

    let tests = store.test_results("persist-run").unwrap();
    assert_eq!(tests.len(), 7);
    assert_eq!(tests[0].name, "completion_hours_by_victory_path");
    assert!(tests[0].reject_null);
    assert!(tests.iter().all(|t| t.p_value.is_some_and(|p| (0.0..=1.0).contains(&p))));
    assert!(tests.iter().all(|t| t.skipped.is_none()));
    assert_eq!(store.report_origin("persist-run").unwrap().as_deref(), Some("fallback"));

    assert!(store.load_report("missing-run").unwrap().is_none());
}

#[test]
fn runs_share_one_store() {
    let store = ReportStore::in_memory().unwrap();
    store.migrate().unwrap();
    let mut pipeline = AnalysisPipeline::new("shared-a".into(), AnalysisConfig::offline(FIXTURES), store).unwrap();
    pipeline.run().unwrap();

    assert_eq!(pipeline.store().run_count().unwrap(), 1);
}

#[test]
fn explicit_sources_are_honoured() {
    let mut pipeline = offline_pipeline("explicit-run");
    let primary = LocalSource::new(FIXTURES);
    let fallback = LocalSource::new("/nonexistent");

    let report = pipeline.run_with_sources(Some(&primary), &fallback).unwrap();
    assert_eq!(report.origin, LoadOrigin::Primary);
}

#[test]
fn missing_data_everywhere_is_fatal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut pipeline =
        AnalysisPipeline::in_memory("no-data".into(), AnalysisConfig::offline("/nonexistent")).unwrap();
    assert!(pipeline.run().is_err());
}

#[test]
fn text_report_carries_conclusions() {
    let mut pipeline = offline_pipeline("text-run");
    let report = pipeline.run().unwrap();
    let text = report.render_text();

    assert!(text.contains("science victory: 2"));
    assert!(text.contains("mean hours: warrior 41, science 85"));
    assert!(text.contains(&conclusion(&report.victory_test)));
    assert!(conclusion(&report.victory_test).starts_with("Reject H0"));
    assert!(conclusion(&report.source_tests[0]).starts_with("Fail to reject H0"));
}

#[test]
fn cohort_without_science_users_still_reports() {
    let mut pipeline = offline_pipeline("no-science-run");
    let report = pipeline.run_loaded(fixture_without(&["u2", "u5"])).unwrap();

    assert_eq!(report.total_users, 6);
    assert_eq!(report.completions.science, 0);
    assert_eq!(report.completions.warrior, 3);
    assert_eq!(report.users_per_source.len(), 4);
    assert_eq!(report.cac.len(), 4);
    assert_eq!(report.mean_hours_science(), None);
    assert!((report.mean_hours_warrior().unwrap() - 41.0).abs() < 1e-9);

    let victory = &report.victory_test;
    assert_eq!(victory.test, None);
    assert!(!victory.reject_null);
    assert!(victory.skipped.as_deref().unwrap().contains("'science'"));
    assert!(conclusion(victory).starts_with("Not tested"));
    assert!(report.render_text().contains("mean hours: warrior 41, science n/a"));

    let entries = pipeline.store_stage_events().unwrap();
    assert_eq!(entries.len(), 13);
    let first_test: PipelineEvent = serde_json::from_str(&entries[5].payload).unwrap();
    match first_test {
        PipelineEvent::HypothesisTested { p_value, reject_null, skipped, .. } => {
            assert_eq!(p_value, None);
            assert!(!reject_null);
            assert!(skipped.is_some());
        }
        other => panic!("unexpected event {other:?}"),
    }

    let stored = pipeline.store().test_results("no-science-run").unwrap();
    assert_eq!(stored[0].p_value, None);
    assert!(stored[0].skipped.is_some());
    assert_eq!(stored[0].mean_b, None);
}

#[test]
fn single_user_source_skips_only_its_pairs() {
    let mut pipeline = offline_pipeline("lone-youtube-run");
    let report = pipeline.run_loaded(fixture_without(&["u8"])).unwrap();

    assert_eq!(report.users_for(Source::YoutubeChannelReklama), 1);
    assert!(report.victory_test.test.is_some());
    assert_eq!(report.source_tests.len(), 6);

    let skipped: Vec<&str> = report
        .source_tests
        .iter()
        .filter(|t| t.test.is_none())
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(
        skipped,
        vec![
            "events_per_user_yandex_direct_vs_youtube_channel_reklama",
            "events_per_user_facebook_ads_vs_youtube_channel_reklama",
            "events_per_user_instagram_new_adverts_vs_youtube_channel_reklama",
        ]
    );
    for t in report.source_tests.iter().filter(|t| t.test.is_none()) {
        assert!(t.skipped.as_deref().unwrap().contains("1 observations"));
    }

    let stored = pipeline.store().test_results("lone-youtube-run").unwrap();
    assert_eq!(stored.len(), 7);
    assert_eq!(stored.iter().filter(|t| t.p_value.is_none()).count(), 3);
    assert_eq!(pipeline.store().source_summaries("lone-youtube-run").unwrap().len(), 4);
}
