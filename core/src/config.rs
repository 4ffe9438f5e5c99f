use crate::hypothesis::Variance;
use serde::{Deserialize, Serialize};

/// File names of the three input tables, relative to a source root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableFiles {
    pub actions: String,
    pub sources: String,
    pub costs: String,
}

impl Default for TableFiles {
    fn default() -> Self {
        Self {
            actions: "game_actions.csv".into(),
            sources: "user_source.csv".into(),
            costs: "ad_costs.csv".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL the tables are fetched from first. `None` skips straight to the fallback.
    pub primary_url: Option<String>,
    /// Local directory read when the primary source fails.
    pub fallback_dir: String,
    pub files: TableFiles,
    /// Significance level for every t-test.
    pub alpha: f64,
    /// Days added to a spend day to align it with the cohort start date.
    pub spend_offset_days: i64,
    pub variance: Variance,
    /// Timeout for each remote fetch.
    pub http_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            primary_url: Some("https://code.s3.yandex.net/datasets/".into()),
            fallback_dir: ".".into(),
            files: TableFiles::default(),
            alpha: 0.05,
            spend_offset_days: 1,
            variance: Variance::Equal,
            http_timeout_secs: 30,
        }
    }
}

impl AnalysisConfig {
    /// Load from a JSON file. Missing keys take their default values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            anyhow::bail!("alpha must lie in (0, 1), got {}", config.alpha);
        }
        Ok(config)
    }

    /// Config that never touches the network; reads tables from `dir`.
    pub fn offline(dir: &str) -> Self {
        Self {
            primary_url: None,
            fallback_dir: dir.into(),
            ..Self::default()
        }
    }
}
