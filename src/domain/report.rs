//! The unified result of one collection: an insertion-ordered mapping from
//! metric name to normalized value, handed as-is to the renderers.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Key under which the service pass stores its result.
pub const SERVICES_KEY: &str = "Services";

/// Prefix marking a value that failed to collect.
pub const FAILURE_PREFIX: &str = "Error Collecting";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(String),
    Lines(Vec<String>),
    Services(BTreeMap<String, String>),
}

impl MetricValue {
    /// Trimmed output containing a newline becomes a line list, anything
    /// else a scalar. Lines keep their own spacing so aligned columns survive.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains('\n') {
            MetricValue::Lines(trimmed.lines().map(str::to_string).collect())
        } else {
            MetricValue::Scalar(trimmed.to_string())
        }
    }
}

/// A metric that was attempted and failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{metric}: {cause}")]
pub struct MetricFailure {
    pub metric: String,
    pub cause: String,
}

impl MetricFailure {
    pub fn new(metric: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            cause: cause.into(),
        }
    }

    /// The error-tagged text renderers show in place of a value.
    pub fn display_value(&self) -> String {
        format!("{FAILURE_PREFIX}: {}", self.cause)
    }
}

pub type Outcome = Result<MetricValue, MetricFailure>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<(String, Outcome)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, outcome: Outcome) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = outcome,
            None => self.entries.push((key, outcome)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Outcome> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &MetricFailure> {
        self.entries.iter().filter_map(|(_, v)| v.as_ref().err())
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, outcome) in &self.entries {
            match outcome {
                Ok(value) => map.serialize_entry(key, value)?,
                Err(failure) => map.serialize_entry(key, &failure.display_value())?,
            }
        }
        map.end()
    }
}
