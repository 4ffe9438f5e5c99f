//! The analysis pipeline: runs every stage in a fixed order.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Load       (primary source, then fallback)
//!   2. Clean      (types, duplicates, event date)
//!   3. Join       (sources onto actions, cohorts onto spend)
//!   4. Aggregate  (counts, durations, CAC)
//!   5. Test       (victory path, source pairs)
//!   6. Report     (assemble, rank channels, persist)
//!
//! RULES:
//!   - Each stage reads only the output of the stages before it.
//!   - Every stage records a PipelineEvent in the stage log.
//!   - Only the load stage has a recovery path.

use crate::{
    aggregator,
    cleaner,
    config::AnalysisConfig,
    error::AnalysisResult,
    event::{PipelineEvent, StageLogEntry},
    hypothesis,
    joiner,
    loader::{self, DataSource, LoadedTables},
    report::{self, AnalysisReport},
    store::ReportStore,
    types::RunId,
};

/// Fresh run identifier.
pub fn new_run_id() -> RunId {
    format!("run-{}", uuid::Uuid::new_v4())
}

pub struct AnalysisPipeline {
    pub run_id: RunId,
    pub config: AnalysisConfig,
    store:      ReportStore,
    seq:        u32,
}

impl AnalysisPipeline {
    /// Register the run in `store` and return a pipeline ready to execute.
    /// The store must already be migrated.
    pub fn new(run_id: RunId, config: AnalysisConfig, store: ReportStore) -> AnalysisResult<Self> {
        store.insert_run(&run_id, &config, env!("CARGO_PKG_VERSION"))?;
        let mut pipeline = Self { run_id: run_id.clone(), config, store, seq: 0 };
        pipeline.record("engine", PipelineEvent::RunInitialized { run_id })?;
        Ok(pipeline)
    }

    /// Pipeline over a fresh, migrated in-memory store.
    pub fn in_memory(run_id: RunId, config: AnalysisConfig) -> AnalysisResult<Self> {
        let store = ReportStore::in_memory()?;
        store.migrate()?;
        Self::new(run_id, config, store)
    }

    /// Load through the sources named in the config, then run every stage.
    pub fn run(&mut self) -> AnalysisResult<AnalysisReport> {
        let loaded = loader::load_from_config(&self.config)?;
        self.run_loaded(loaded)
    }

    /// Load through explicit sources, then run every stage.
    pub fn run_with_sources(
        &mut self,
        primary: Option<&dyn DataSource>,
        fallback: &dyn DataSource,
    ) -> AnalysisResult<AnalysisReport> {
        let loaded = loader::load_with_fallback(primary, fallback, &self.config.files)?;
        self.run_loaded(loaded)
    }

    /// Run stages 2 to 6 over tables that are already loaded.
    pub fn run_loaded(&mut self, loaded: LoadedTables) -> AnalysisResult<AnalysisReport> {
        let raw = &loaded.tables;
        self.record("load", PipelineEvent::TablesLoaded {
            origin:   loaded.origin,
            location: loaded.location.clone(),
            actions:  raw.actions.len(),
            sources:  raw.sources.len(),
            costs:    raw.costs.len(),
        })?;
        let overview = loader::profile_tables(raw);

        // ── Clean ───────────────────────────────────────────────
        let cleaned = cleaner::clean(raw)?;
        let tables = &cleaned.tables;
        log::info!(
            "Cleaned {} actions, {} sources, {} cost rows",
            tables.actions.len(), tables.sources.len(), tables.costs.len()
        );
        self.record("clean", PipelineEvent::TablesCleaned {
            actions:            tables.actions.len(),
            duplicates_removed: cleaned.duplicates_removed,
        })?;

        // ── Join ────────────────────────────────────────────────
        let enriched = joiner::attach_sources(&tables.actions, &tables.sources);
        let windows = joiner::activity_windows(&enriched);
        let cohort_days = joiner::align_spend(&windows, &tables.costs, self.config.spend_offset_days);
        self.record("join", PipelineEvent::TablesJoined {
            unmatched_actions: enriched.iter().filter(|e| e.source.is_none()).count(),
            users:             windows.len(),
            cohort_days:       cohort_days.len(),
        })?;

        // ── Aggregate ───────────────────────────────────────────
        let users_per_source = aggregator::users_per_source(&enriched);
        let completions = aggregator::completion_counts(&enriched);
        let paths = aggregator::victory_paths(&enriched);
        let buildings = aggregator::buildings_per_source(&enriched);
        let durations = aggregator::user_durations(&windows);
        let events = aggregator::events_per_user(&enriched);
        let cac = aggregator::acquisition_cost(&cohort_days);
        log::info!(
            "{} users; {} finished ({} science, {} warrior)",
            windows.len(), completions.finished, completions.science, completions.warrior
        );
        self.record("aggregate", PipelineEvent::AggregatesComputed {
            sources:          users_per_source.len(),
            sources_with_cac: cac.iter().filter(|c| c.cac.is_some()).count(),
        })?;

        // ── Test ────────────────────────────────────────────────
        // A degenerate group skips that one test; descriptive results stand.
        let alpha = self.config.alpha;
        let variance = self.config.variance;
        let victory_test = hypothesis::victory_path_test(&durations, &paths, alpha, variance)?;
        let source_tests = hypothesis::source_pair_tests(&events, alpha, variance)?;
        for t in std::iter::once(&victory_test).chain(source_tests.iter()) {
            self.record("test", PipelineEvent::HypothesisTested {
                name:        t.name.clone(),
                p_value:     t.p_value(),
                reject_null: t.reject_null,
                skipped:     t.skipped.clone(),
            })?;
        }

        // ── Report ──────────────────────────────────────────────
        let channel_ranking = report::channel_ranking(&cac, &users_per_source);
        let report = AnalysisReport {
            run_id: self.run_id.clone(),
            origin: loaded.origin,
            location: loaded.location.clone(),
            overview,
            duplicates_removed: cleaned.duplicates_removed,
            total_users: aggregator::total_users(&enriched),
            users_per_source,
            completions,
            buildings,
            daily_users: aggregator::daily_new_users(&cohort_days),
            daily_spend: aggregator::daily_spend(&cohort_days),
            cac,
            victory_test,
            source_tests,
            channel_ranking,
        };
        self.store.save_report(&report)?;
        self.record("report", PipelineEvent::ReportSaved { run_id: self.run_id.clone() })?;
        log::info!("Report {} saved", self.run_id);

        Ok(report)
    }

    /// Stage log of this pipeline's run, in emission order.
    pub fn store_stage_events(&self) -> AnalysisResult<Vec<StageLogEntry>> {
        self.store.stage_events(&self.run_id)
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    fn record(&mut self, stage: &str, event: PipelineEvent) -> AnalysisResult<()> {
        let entry = StageLogEntry {
            id:         None,
            run_id:     self.run_id.clone(),
            seq:        self.seq,
            stage:      stage.to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(&event)?,
        };
        self.store.append_stage_event(&entry)?;
        self.seq += 1;
        log::debug!("[{stage}] {}", entry.event_type);
        Ok(())
    }
}
