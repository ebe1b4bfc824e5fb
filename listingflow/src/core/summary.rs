//! Human-readable counts over a record sequence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Record;

/// Counts produced by a step's `summarize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Records in the output.
    pub total: usize,
    /// Records still active.
    pub active: usize,
    /// Records excluded by a filter.
    pub excluded: usize,
    /// Records whose external call failed.
    pub failed: usize,
    /// Step-specific breakdown (per source, per label).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, usize>,
}

impl StepSummary {
    /// Counts records by status.
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            if record.is_active() {
                summary.active += 1;
            } else if record.is_excluded() {
                summary.excluded += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    /// Adds a detail counter.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, count: usize) -> Self {
        self.details.insert(key.into(), count);
        self
    }
}

impl fmt::Display for StepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} active, {} excluded, {} failed",
            self.total, self.active, self.excluded, self.failed
        )?;
        if !self.details.is_empty() {
            let parts: Vec<String> = self
                .details
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}
