use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// Distinguishes `"key": null` from an absent key.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Raw entry of a `/metrics/find/` JSON response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FindResultEntry {
    pub name: String,
    #[serde(default)]
    pub leaf: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub leaf_data: Option<Value>,
}

/// A discovered metric name, classified once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEntry {
    Leaf { name: String, leaf_data: Value },
    Branch { name: String },
}

impl DiscoveryEntry {
    pub fn name(&self) -> &str {
        match self {
            DiscoveryEntry::Leaf { name, .. } | DiscoveryEntry::Branch { name } => name,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, DiscoveryEntry::Leaf { .. })
    }

    /// Parses a JSON find response, preserving backend order.
    pub fn parse_json(body: &[u8]) -> Result<Vec<Self>, serde_json::Error> {
        let entries: Vec<FindResultEntry> = serde_json::from_slice(body)?;
        Ok(entries.into_iter().map(DiscoveryEntry::from).collect())
    }
}

impl From<FindResultEntry> for DiscoveryEntry {
    fn from(entry: FindResultEntry) -> Self {
        // A leaf without metadata cannot be fetched, so it is listed as a branch.
        match entry.leaf_data {
            Some(leaf_data) if entry.leaf => DiscoveryEntry::Leaf {
                name: entry.name,
                leaf_data,
            },
            _ => DiscoveryEntry::Branch { name: entry.name },
        }
    }
}

/// One leaf of a `/series_multi/` request body.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeafRequest {
    pub leaf_name: String,
    pub leaf_data: Value,
}

#[derive(Debug, Serialize)]
pub struct SeriesMultiRequest<'a> {
    pub names: &'a [LeafRequest],
    pub start: i64,
    pub end: i64,
    pub database_rollups: bool,
}

/// Decoded `/series_multi/` response, shared by the JSON and binary paths.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct FetchResult {
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
    #[serde(default)]
    pub step: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<HashMap<String, Vec<Option<f64>>>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<Value>,
}

impl FetchResult {
    pub fn time_info(&self) -> TimeInfo {
        TimeInfo {
            start: self.from,
            end: self.to,
            step: self.step,
        }
    }

    /// True when the payload cannot provide data for any leaf.
    pub fn is_unusable(&self) -> bool {
        self.error.is_some() || self.series.as_ref().map_or(true, HashMap::is_empty)
    }

    /// Number of samples covering `[from, to)` at `step` resolution.
    pub fn slot_count(&self) -> usize {
        if self.step <= 0 || self.to <= self.from {
            return 0;
        }
        usize::try_from((self.to - self.from) / self.step).unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

/// Samples of a single leaf over the batch's time range.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SeriesData {
    pub time_info: TimeInfo,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}
