//! Core data models used throughout package-metrics.
//!
//! These types represent the validated batch items and the observations that
//! flow from the HTTP/CLI surface through the orchestrator into a store.

use chrono::{DateTime, Utc};

use crate::purl::PackageUrl;

/// What a batch item does to its (package, key) partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Append values.
    Insert,
    /// Delete every stored observation for the partition, then append values.
    Replace,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Operation::Insert),
            "replace" => Some(Operation::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Replace => "replace",
        }
    }
}

/// One value to be stored, as submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEntry {
    /// `None` when absent or unparsable; the ingestion time is used instead.
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw textual form of the submitted JSON scalar.
    pub value: String,
    pub properties: Option<serde_json::Value>,
}

/// A validated batch element.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub package_url: PackageUrl,
    pub key: String,
    pub operation: Operation,
    pub values: Vec<ValueEntry>,
}

/// A row to be inserted into the metrics table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation<'a> {
    pub package_url: &'a PackageUrl,
    pub key: &'a str,
    pub value: &'a str,
    pub timestamp: DateTime<Utc>,
    pub properties: Option<&'a serde_json::Value>,
}

/// A stored metric data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub package_url: String,
    pub key: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
    pub properties: Option<serde_json::Value>,
}

impl From<&NewObservation<'_>> for Observation {
    fn from(obs: &NewObservation<'_>) -> Self {
        Self {
            package_url: obs.package_url.to_string(),
            key: obs.key.to_string(),
            value: obs.value.to_string(),
            timestamp: obs.timestamp,
            properties: obs.properties.cloned(),
        }
    }
}
