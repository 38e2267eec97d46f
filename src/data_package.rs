//! Global variable data package
//!
//! The controller publishes names and values as separate, partial range
//! updates. The package merges them into one name to value snapshot.

use crate::variables::VariableValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Merged name and value tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPackage {
    names: Option<Vec<String>>,
    values: Option<Vec<VariableValue>>,
    variables: BTreeMap<String, VariableValue>,
    updated_at: Option<DateTime<Utc>>,
}

/// Published view of a data package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPackageMessage {
    pub names: Vec<String>,
    pub values: Vec<VariableValue>,
    pub variables: BTreeMap<String, VariableValue>,
    pub updated_at: DateTime<Utc>,
}

/// Replace `incoming.len()` entries of `table` starting at `start`.
/// A start past the end appends; the table grows as needed.
fn splice<T>(table: &mut Vec<T>, start: usize, incoming: Vec<T>) {
    let start = start.min(table.len());
    let end = (start + incoming.len()).min(table.len());
    table.splice(start..end, incoming);
}

impl DataPackage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splice names in at `start`. Values and the derived mapping are
    /// dropped since their positions may no longer match.
    pub fn apply_name_update(&mut self, start: usize, names: Vec<String>) {
        match &mut self.names {
            Some(table) => splice(table, start, names),
            None => self.names = Some(names),
        }
        self.values = None;
        self.variables.clear();
        self.updated_at = Some(Utc::now());
    }

    /// Splice values in at `start` and rebuild the mapping
    pub fn apply_value_update(&mut self, start: usize, values: Vec<VariableValue>) {
        match &mut self.values {
            Some(table) => splice(table, start, values),
            None => self.values = Some(values),
        }
        self.rebuild_variables();
        self.updated_at = Some(Utc::now());
    }

    fn rebuild_variables(&mut self) {
        let names = self.names.as_deref().unwrap_or_default();
        self.variables = self
            .values
            .iter()
            .flatten()
            .enumerate()
            .map(|(index, value)| {
                let key = names.get(index).cloned().unwrap_or_else(|| index.to_string());
                (key, value.clone())
            })
            .collect();
    }

    /// Current name to value mapping
    pub fn snapshot(&self) -> BTreeMap<String, VariableValue> {
        self.variables.clone()
    }

    pub fn names(&self) -> &[String] {
        self.names.as_deref().unwrap_or_default()
    }

    pub fn values(&self) -> &[VariableValue] {
        self.values.as_deref().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_none() && self.values.is_none()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn to_message(&self) -> DataPackageMessage {
        DataPackageMessage {
            names: self.names().to_vec(),
            values: self.values().to_vec(),
            variables: self.snapshot(),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}
