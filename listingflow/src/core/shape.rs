//! Record shapes: the derived fields an artifact guarantees.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The set of derived-field keys present on every active record.
///
/// The empty shape describes the initial query, before any step ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(BTreeSet<String>);

impl Shape {
    /// The shape of the initial query.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a shape from field keys.
    #[must_use]
    pub fn of(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| (*f).to_string()).collect())
    }

    /// Returns a new shape containing the fields of both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// Returns true if this shape provides every field in `required`.
    #[must_use]
    pub fn satisfies(&self, required: &Self) -> bool {
        required.0.is_subset(&self.0)
    }

    /// Fields of `required` this shape lacks, in sorted order.
    #[must_use]
    pub fn missing(&self, required: &Self) -> Vec<String> {
        required.0.difference(&self.0).cloned().collect()
    }

    /// Returns true if the shape contains `field`.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    /// Returns true for the initial-query shape.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over field keys in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "{{{}}}", fields.join(", "))
    }
}
