//! Table loading: fetches the three input tables and parses them into raw
//! string records.
//!
//! RULE: The primary source is tried for all three tables together.
//! If any of them fails, all three are read from the fallback instead,
//! so a run never mixes tables from two origins.
//! A fallback failure is fatal.

use crate::{
    config::{AnalysisConfig, TableFiles},
    error::{AnalysisError, AnalysisResult},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;
use std::time::Duration;

// ── Raw records ──────────────────────────────────────────────────────────────

/// One row of `game_actions.csv`, exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAction {
    pub event_datetime: Option<String>,
    pub event: Option<String>,
    pub building_type: Option<String>,
    pub user_id: Option<String>,
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawUserSource {
    pub user_id: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAdCost {
    pub day: Option<String>,
    pub source: Option<String>,
    pub cost: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTables {
    pub actions: Vec<RawAction>,
    pub sources: Vec<RawUserSource>,
    pub costs: Vec<RawAdCost>,
}

// ── Sources ──────────────────────────────────────────────────────────────────

/// Somewhere the input tables can be read from.
pub trait DataSource {
    /// Human-readable location, used in logs and the report.
    fn describe(&self) -> String;

    /// Read the whole named file.
    fn fetch(&self, file: &str) -> AnalysisResult<Vec<u8>>;
}

/// Tables served over HTTP(S) under a common base URL.
pub struct HttpSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> AnalysisResult<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.to_string(), client })
    }

    fn url_for(&self, file: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{file}", self.base_url)
        } else {
            format!("{}/{file}", self.base_url)
        }
    }
}

impl DataSource for HttpSource {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    fn fetch(&self, file: &str) -> AnalysisResult<Vec<u8>> {
        let url = self.url_for(file);
        log::debug!("GET {url}");
        let response = self.client.get(&url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::FetchStatus {
                origin: self.base_url.clone(),
                file: file.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// Tables stored as files in a local directory.
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DataSource for LocalSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn fetch(&self, file: &str) -> AnalysisResult<Vec<u8>> {
        Ok(std::fs::read(self.dir.join(file))?)
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
    Primary,
    Fallback,
    /// Generated by `synth`, never read from disk or network.
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct LoadedTables {
    pub tables: RawTables,
    pub origin: LoadOrigin,
    /// `describe()` of the source that served the tables.
    pub location: String,
}

/// Parse a headed, comma-separated table. Columns are matched by header name.
pub fn parse_table<T: DeserializeOwned>(bytes: &[u8]) -> AnalysisResult<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

/// Read and parse all three tables from one source.
pub fn load_tables(source: &dyn DataSource, files: &TableFiles) -> AnalysisResult<RawTables> {
    let actions = parse_table(&source.fetch(&files.actions)?)?;
    let sources = parse_table(&source.fetch(&files.sources)?)?;
    let costs = parse_table(&source.fetch(&files.costs)?)?;
    Ok(RawTables { actions, sources, costs })
}

/// Load from `primary` if given, falling back to `fallback` on any failure.
pub fn load_with_fallback(
    primary: Option<&dyn DataSource>,
    fallback: &dyn DataSource,
    files: &TableFiles,
) -> AnalysisResult<LoadedTables> {
    if let Some(primary) = primary {
        match load_tables(primary, files) {
            Ok(tables) => {
                log::info!("Loaded tables from {}", primary.describe());
                return Ok(LoadedTables {
                    tables,
                    origin: LoadOrigin::Primary,
                    location: primary.describe(),
                });
            }
            Err(e) => {
                log::warn!(
                    "Primary source {} failed ({e}); reading from {}",
                    primary.describe(),
                    fallback.describe()
                );
            }
        }
    }

    let tables = load_tables(fallback, files)?;
    log::info!("Loaded tables from {}", fallback.describe());
    Ok(LoadedTables {
        tables,
        origin: LoadOrigin::Fallback,
        location: fallback.describe(),
    })
}

/// Build the sources named in `config` and load through them.
pub fn load_from_config(config: &AnalysisConfig) -> AnalysisResult<LoadedTables> {
    let fallback = LocalSource::new(&config.fallback_dir);
    let primary = match &config.primary_url {
        Some(url) => Some(HttpSource::new(url, Duration::from_secs(config.http_timeout_secs))?),
        None => None,
    };
    load_with_fallback(
        primary.as_ref().map(|p| p as &dyn DataSource),
        &fallback,
        &config.files,
    )
}

// ── Overview ─────────────────────────────────────────────────────────────────

/// Shape of one input table, before any cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub table: String,
    pub rows: usize,
    /// (column, null count) in header order.
    pub null_counts: Vec<(String, usize)>,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetOverview {
    pub actions: TableProfile,
    pub sources: TableProfile,
    pub costs: TableProfile,
    /// Distinct source labels in the spend table, in first-seen order.
    pub spend_sources: Vec<String>,
}

/// Rows that repeat an earlier row exactly.
pub fn count_duplicates<T: Eq + Hash>(rows: &[T]) -> usize {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter().filter(|row| !seen.insert(*row)).count()
}

fn nulls<T>(rows: &[T], column: &str, field: impl Fn(&T) -> &Option<String>) -> (String, usize) {
    (column.to_string(), rows.iter().filter(|r| field(r).is_none()).count())
}

pub fn profile_tables(raw: &RawTables) -> DatasetOverview {
    let actions = TableProfile {
        table: "game_actions".into(),
        rows: raw.actions.len(),
        null_counts: vec![
            nulls(&raw.actions, "event_datetime", |r| &r.event_datetime),
            nulls(&raw.actions, "event", |r| &r.event),
            nulls(&raw.actions, "building_type", |r| &r.building_type),
            nulls(&raw.actions, "user_id", |r| &r.user_id),
            nulls(&raw.actions, "project_type", |r| &r.project_type),
        ],
        duplicate_rows: count_duplicates(&raw.actions),
    };

    let sources = TableProfile {
        table: "user_source".into(),
        rows: raw.sources.len(),
        null_counts: vec![
            nulls(&raw.sources, "user_id", |r| &r.user_id),
            nulls(&raw.sources, "source", |r| &r.source),
        ],
        duplicate_rows: count_duplicates(&raw.sources),
    };

    let costs = TableProfile {
        table: "ad_costs".into(),
        rows: raw.costs.len(),
        null_counts: vec![
            nulls(&raw.costs, "source", |r| &r.source),
            nulls(&raw.costs, "day", |r| &r.day),
            nulls(&raw.costs, "cost", |r| &r.cost),
        ],
        duplicate_rows: count_duplicates(&raw.costs),
    };

    let mut spend_sources: Vec<String> = Vec::new();
    for source in raw.costs.iter().filter_map(|c| c.source.as_ref()) {
        if !spend_sources.contains(source) {
            spend_sources.push(source.clone());
        }
    }

    DatasetOverview { actions, sources, costs, spend_sources }
}
