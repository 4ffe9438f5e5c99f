//! Shared primitive types used across the entire analysis.

use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A player identifier as it appears in the source tables.
pub type UserId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Advertising channel a player was acquired through.
/// Declaration order is the order pairwise tests are run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    YandexDirect,
    FacebookAds,
    InstagramNewAdverts,
    YoutubeChannelReklama,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::YandexDirect,
        Source::FacebookAds,
        Source::InstagramNewAdverts,
        Source::YoutubeChannelReklama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::YandexDirect          => "yandex_direct",
            Source::FacebookAds           => "facebook_ads",
            Source::InstagramNewAdverts   => "instagram_new_adverts",
            Source::YoutubeChannelReklama => "youtube_channel_reklama",
        }
    }
}

impl FromStr for Source {
    type Err = AnalysisError;

    fn from_str(s: &str) -> AnalysisResult<Self> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str() == s)
            .ok_or_else(|| AnalysisError::UnknownValue { column: "source", value: s.to_string() })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Building,
    #[serde(rename = "finished_stage_1")]
    FinishedStage1,
    Project,
}

impl FromStr for EventKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> AnalysisResult<Self> {
        match s {
            "building"         => Ok(EventKind::Building),
            "finished_stage_1" => Ok(EventKind::FinishedStage1),
            "project"          => Ok(EventKind::Project),
            other => Err(AnalysisError::UnknownValue { column: "event", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    AssemblyShop,
    Spaceport,
    ResearchCenter,
}

impl FromStr for BuildingType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> AnalysisResult<Self> {
        match s {
            "assembly_shop"   => Ok(BuildingType::AssemblyShop),
            "spaceport"       => Ok(BuildingType::Spaceport),
            "research_center" => Ok(BuildingType::ResearchCenter),
            other => Err(AnalysisError::UnknownValue {
                column: "building_type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    SatelliteOrbitalAssembly,
}

impl FromStr for ProjectType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> AnalysisResult<Self> {
        match s {
            "satellite_orbital_assembly" => Ok(ProjectType::SatelliteOrbitalAssembly),
            other => Err(AnalysisError::UnknownValue {
                column: "project_type",
                value: other.to_string(),
            }),
        }
    }
}

/// How a player completed the first level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryPath {
    /// Completed the orbital assembly project.
    Science,
    /// Finished the stage by defeating another player.
    Warrior,
}
