//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The pipeline calls store methods; it never executes SQL directly.

use rusqlite::{params, Connection, OptionalExtension};
use crate::{
    config::AnalysisConfig,
    error::AnalysisResult,
    event::StageLogEntry,
    hypothesis::Variance,
    loader::LoadOrigin,
    report::AnalysisReport,
};

pub struct ReportStore {
    conn: Connection,
}

/// One row of `source_summary`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummaryRow {
    pub source:          String,
    pub users:           i64,
    pub buildings:       i64,
    pub spaceport:       i64,
    pub assembly_shop:   i64,
    pub research_center: i64,
    pub cac:             Option<f64>,
    pub cac_days:        i64,
    pub priority_rank:   i64,
}

/// One row of `hypothesis_test`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResultRow {
    pub name:        String,
    pub group_a:     String,
    pub group_b:     String,
    pub n_a:         i64,
    pub n_b:         i64,
    pub mean_a:      Option<f64>,
    pub mean_b:      Option<f64>,
    /// `None` for a skipped test.
    pub p_value:     Option<f64>,
    pub reject_null: bool,
    pub skipped:     Option<String>,
}

impl ReportStore {
    /// Open (or create) the report database at `path`.
    pub fn open(path: &str) -> AnalysisResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests and by default).
    pub fn in_memory() -> AnalysisResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalysisResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_analysis.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, config: &AnalysisConfig, version: &str) -> AnalysisResult<()> {
        let variance = match config.variance {
            Variance::Equal   => "equal",
            Variance::Unequal => "unequal",
        };
        self.conn.execute(
            "INSERT INTO run (run_id, alpha, variance, spend_offset_days, version, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                config.alpha,
                variance,
                config.spend_offset_days,
                version,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn run_count(&self) -> AnalysisResult<i64> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM run", [], |row| row.get(0))?;
        Ok(n)
    }

    // ── Stage log ──────────────────────────────────────────────

    pub fn append_stage_event(&self, entry: &StageLogEntry) -> AnalysisResult<()> {
        self.conn.execute(
            "INSERT INTO stage_log (run_id, seq, stage, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.seq,
                entry.stage,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn stage_events(&self, run_id: &str) -> AnalysisResult<Vec<StageLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM stage_log WHERE run_id = ?1
             ORDER BY seq ASC, id ASC"
        )?;
        let entries = stmt.query_map(params![run_id], |row| {
            Ok(StageLogEntry {
                id:         Some(row.get(0)?),
                run_id:     row.get(1)?,
                seq:        row.get(2)?,
                stage:      row.get(3)?,
                event_type: row.get(4)?,
                payload:    row.get(5)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Report ─────────────────────────────────────────────────

    /// Persist the report and its per-source and per-test tables in one transaction.
    pub fn save_report(&self, report: &AnalysisReport) -> AnalysisResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        for rank in &report.channel_ranking {
            let source = rank.source;
            let buildings = report.buildings.iter().find(|b| b.source == source);
            let cac_days = report
                .cac
                .iter()
                .find(|c| c.source == source)
                .map_or(0, |c| c.days);
            tx.execute(
                "INSERT INTO source_summary (
                    run_id, source, users, buildings, spaceport, assembly_shop,
                    research_center, cac, cac_days, priority_rank
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    report.run_id,
                    source.as_str(),
                    report.users_for(source) as i64,
                    buildings.map_or(0, |b| b.total) as i64,
                    buildings.map_or(0, |b| b.spaceport) as i64,
                    buildings.map_or(0, |b| b.assembly_shop) as i64,
                    buildings.map_or(0, |b| b.research_center) as i64,
                    rank.cac,
                    cac_days as i64,
                    rank.rank as i64,
                ],
            )?;
        }

        for t in std::iter::once(&report.victory_test).chain(report.source_tests.iter()) {
            tx.execute(
                "INSERT INTO hypothesis_test (
                    run_id, name, group_a, group_b, n_a, n_b, mean_a, mean_b,
                    statistic, df, p_value, alpha, reject_null, skipped
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
                params![
                    report.run_id,
                    t.name,
                    t.group_a,
                    t.group_b,
                    t.n_a as i64,
                    t.n_b as i64,
                    t.mean_a,
                    t.mean_b,
                    t.test.and_then(|x| x.statistic),
                    t.test.map(|x| x.df),
                    t.p_value(),
                    t.alpha,
                    t.reject_null,
                    t.skipped,
                ],
            )?;
        }

        let origin = match report.origin {
            LoadOrigin::Primary   => "primary",
            LoadOrigin::Fallback  => "fallback",
            LoadOrigin::Synthetic => "synthetic",
        };
        tx.execute(
            "INSERT INTO report (run_id, origin, location, report_json) VALUES (?1, ?2, ?3, ?4)",
            params![report.run_id, origin, report.location, serde_json::to_string(report)?],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn load_report(&self, run_id: &str) -> AnalysisResult<Option<AnalysisReport>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT report_json FROM report WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Where the stored report's tables came from.
    pub fn report_origin(&self, run_id: &str) -> AnalysisResult<Option<String>> {
        let origin = self
            .conn
            .query_row(
                "SELECT origin FROM report WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(origin)
    }

    /// Per-source rows in channel priority order.
    pub fn source_summaries(&self, run_id: &str) -> AnalysisResult<Vec<SourceSummaryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, users, buildings, spaceport, assembly_shop, research_center,
                    cac, cac_days, priority_rank
             FROM source_summary WHERE run_id = ?1
             ORDER BY priority_rank ASC"
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(SourceSummaryRow {
                source:          row.get(0)?,
                users:           row.get(1)?,
                buildings:       row.get(2)?,
                spaceport:       row.get(3)?,
                assembly_shop:   row.get(4)?,
                research_center: row.get(5)?,
                cac:             row.get(6)?,
                cac_days:        row.get(7)?,
                priority_rank:   row.get(8)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn test_results(&self, run_id: &str) -> AnalysisResult<Vec<TestResultRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, group_a, group_b, n_a, n_b, mean_a, mean_b, p_value, reject_null, skipped
             FROM hypothesis_test WHERE run_id = ?1
             ORDER BY rowid ASC"
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(TestResultRow {
                name:        row.get(0)?,
                group_a:     row.get(1)?,
                group_b:     row.get(2)?,
                n_a:         row.get(3)?,
                n_b:         row.get(4)?,
                mean_a:      row.get(5)?,
                mean_b:      row.get(6)?,
                p_value:     row.get(7)?,
                reject_null: row.get(8)?,
                skipped:     row.get(9)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
