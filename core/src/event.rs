//! Stage events: what each pipeline stage reports when it completes.
//!
//! Every event is persisted to the stage log in emission order, so a
//! stored run can be audited stage by stage.

use crate::{loader::LoadOrigin, types::RunId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunInitialized {
        run_id: RunId,
    },
    TablesLoaded {
        origin: LoadOrigin,
        location: String,
        actions: usize,
        sources: usize,
        costs: usize,
    },
    TablesCleaned {
        actions: usize,
        duplicates_removed: usize,
    },
    TablesJoined {
        unmatched_actions: usize,
        users: usize,
        cohort_days: usize,
    },
    AggregatesComputed {
        sources: usize,
        sources_with_cac: usize,
    },
    HypothesisTested {
        name: String,
        /// `None` when the test was skipped.
        p_value: Option<f64>,
        reject_null: bool,
        skipped: Option<String>,
    },
    ReportSaved {
        run_id: RunId,
    },
}

impl PipelineEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineEvent::RunInitialized { .. }     => "run_initialized",
            PipelineEvent::TablesLoaded { .. }       => "tables_loaded",
            PipelineEvent::TablesCleaned { .. }      => "tables_cleaned",
            PipelineEvent::TablesJoined { .. }       => "tables_joined",
            PipelineEvent::AggregatesComputed { .. } => "aggregates_computed",
            PipelineEvent::HypothesisTested { .. }   => "hypothesis_tested",
            PipelineEvent::ReportSaved { .. }        => "report_saved",
        }
    }
}

/// A persisted row of the stage log.
#[derive(Debug, Clone, PartialEq)]
pub struct StageLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub seq:        u32,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String,
}
