use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const MINIMAL: &[&str] = &[
    "Heartbeat",
    "SessionInfo",
    "TrackStatus",
    "LapCount",
    "RaceControlMessages",
];

const STANDARD_EXTRA: &[&str] = &[
    "SessionData",
    "ExtrapolatedClock",
    "DriverList",
    "TimingData",
    "TimingAppData",
    "TimingStats",
    "TopThree",
    "WeatherData",
];

const FULL_EXTRA: &[&str] = &[
    "CarData.z",
    "Position.z",
    "TeamRadio",
    "PitLaneTimeCollection",
    "ChampionshipPrediction",
    "RcmSeries",
    "TlaRcm",
    "DriverRaceInfo",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown stream set: {0}")]
pub struct UnknownStreamSet(pub String);

/// Predefined stream sets, each a superset of the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSet {
    Minimal,
    Standard,
    Full,
}

impl StreamSet {
    pub fn streams(&self) -> Vec<String> {
        let groups: &[&[&str]] = match self {
            StreamSet::Minimal => &[MINIMAL],
            StreamSet::Standard => &[MINIMAL, STANDARD_EXTRA],
            StreamSet::Full => &[MINIMAL, STANDARD_EXTRA, FULL_EXTRA],
        };
        groups
            .iter()
            .flat_map(|g| g.iter())
            .map(|s| s.to_string())
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamSet::Minimal => "minimal",
            StreamSet::Standard => "standard",
            StreamSet::Full => "full",
        }
    }
}

impl FromStr for StreamSet {
    type Err = UnknownStreamSet;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(StreamSet::Minimal),
            "standard" => Ok(StreamSet::Standard),
            "full" => Ok(StreamSet::Full),
            other => Err(UnknownStreamSet(other.to_string())),
        }
    }
}

/// Which streams to subscribe to on the next connect.
///
/// Deserializes from either a set name (`"standard"`) or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamSelection {
    Named(StreamSet),
    Explicit(Vec<String>),
}

impl Default for StreamSelection {
    fn default() -> Self {
        StreamSelection::Named(StreamSet::Standard)
    }
}

impl StreamSelection {
    /// Resolve to an ordered list of unique stream names
    pub fn resolve(&self) -> Vec<String> {
        let streams = match self {
            StreamSelection::Named(set) => set.streams(),
            StreamSelection::Explicit(list) => list.clone(),
        };

        let mut seen = std::collections::HashSet::new();
        streams
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }

    /// Parse `"standard"` or `"TrackStatus,LapCount"`
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<StreamSet>() {
            Ok(set) => StreamSelection::Named(set),
            Err(_) => StreamSelection::Explicit(
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        }
    }
}

impl From<StreamSet> for StreamSelection {
    fn from(set: StreamSet) -> Self {
        StreamSelection::Named(set)
    }
}

impl From<Vec<String>> for StreamSelection {
    fn from(list: Vec<String>) -> Self {
        StreamSelection::Explicit(list)
    }
}
