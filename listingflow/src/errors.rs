//! Error types for listingflow.
//!
//! Every failure the orchestrator can surface to an operator maps onto one
//! member of this taxonomy. Each member is its own error struct so callers can
//! match precisely, and [`ListingflowError`] wraps them for propagation.

use serde_json::json;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ListingflowError> = std::result::Result<T, E>;

/// The main error type for listingflow operations.
#[derive(Debug, Error)]
pub enum ListingflowError {
    /// A run-scope parameter is missing or invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A single external call failed in a recoverable way.
    #[error("{0}")]
    TransientSource(#[from] TransientSourceError),

    /// A restart artifact does not carry the fields a step requires.
    #[error("{0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    /// The registry has no implementation for a step identifier.
    #[error("{0}")]
    UnknownStep(#[from] UnknownStepError),

    /// A country-scoped step was requested without a country.
    #[error("{0}")]
    UnsupportedScope(#[from] UnsupportedScopeError),

    /// Too many records failed inside one step.
    #[error("{0}")]
    ExcessiveFailure(#[from] ExcessiveFailureError),

    /// No artifact exists for the requested run and step.
    #[error("{0}")]
    ArtifactNotFound(#[from] ArtifactNotFoundError),

    /// A step tried to overwrite a derived field owned by another step.
    #[error("{0}")]
    FieldOwnership(#[from] FieldOwnershipError),

    /// An external collaborator reported a non-recoverable error.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// The run was cancelled or timed out.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListingflowError {
    /// Stable code reported to operators and persisted in run manifests.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::TransientSource(_) => "TRANSIENT_SOURCE",
            Self::ShapeMismatch(_) => "SHAPE_MISMATCH",
            Self::UnknownStep(_) => "UNKNOWN_STEP",
            Self::UnsupportedScope(_) => "UNSUPPORTED_SCOPE",
            Self::ExcessiveFailure(_) => "EXCESSIVE_FAILURE",
            Self::ArtifactNotFound(_) => "NOT_FOUND",
            Self::FieldOwnership(_) => "FIELD_OWNERSHIP",
            Self::Source(_) => "SOURCE",
            Self::Cancelled(_) => "CANCELLED",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Io(_) => "IO",
        }
    }

    /// The step the error is attributed to, when known.
    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Configuration(e) => e.step_id.as_deref(),
            Self::TransientSource(e) => Some(&e.step_id),
            Self::ShapeMismatch(e) => Some(&e.step_id),
            Self::UnknownStep(e) => Some(&e.step_id),
            Self::UnsupportedScope(e) => Some(&e.step_id),
            Self::ExcessiveFailure(e) => Some(&e.step_id),
            Self::ArtifactNotFound(e) => Some(&e.step_id),
            Self::FieldOwnership(e) => Some(&e.writer),
            _ => None,
        }
    }

    /// Returns true if the error came from cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// JSON form persisted alongside an aborted run.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
            "step_id": self.step_id(),
        })
    }
}

impl From<serde_json::Error> for ListingflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ListingflowError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(ConfigurationError::new(format!("invalid settings: {err}")))
    }
}

/// Raised when a run-scope parameter or step configuration is missing or invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The step whose configuration failed, if any.
    pub step_id: Option<String>,
    /// The offending parameter, if known.
    pub parameter: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step_id: None,
            parameter: None,
        }
    }

    /// Attributes the error to a step.
    #[must_use]
    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Names the parameter that was missing or invalid.
    #[must_use]
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

/// A single external call failed while processing one record.
///
/// These never escape a step: the record is annotated and the step moves on.
#[derive(Debug, Clone, Error)]
#[error("step '{step_id}' record {record_id}: {message}")]
pub struct TransientSourceError {
    /// The step that issued the call.
    pub step_id: String,
    /// The record being processed.
    pub record_id: String,
    /// What went wrong.
    pub message: String,
}

impl TransientSourceError {
    /// Creates a new transient source error.
    #[must_use]
    pub fn new(
        step_id: impl Into<String>,
        record_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            record_id: record_id.into(),
            message: message.into(),
        }
    }
}

/// Raised when an input artifact lacks fields a step requires.
#[derive(Debug, Clone, Error)]
#[error("step '{step_id}' cannot consume {origin}: missing fields [{}]", missing.join(", "))]
pub struct ShapeMismatchError {
    /// The step whose input requirement failed.
    pub step_id: String,
    /// Where the input came from (an artifact or a pipeline position).
    pub origin: String,
    /// Required fields absent from the input shape.
    pub missing: Vec<String>,
}

impl ShapeMismatchError {
    /// Creates a new shape mismatch error.
    #[must_use]
    pub fn new(step_id: impl Into<String>, origin: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            step_id: step_id.into(),
            origin: origin.into(),
            missing,
        }
    }
}

/// Raised when a step identifier has no registered implementation.
#[derive(Debug, Clone, Error)]
#[error("unknown step '{step_id}' (registered: {})", registered.join(", "))]
pub struct UnknownStepError {
    /// The requested identifier.
    pub step_id: String,
    /// Identifiers the registry does know.
    pub registered: Vec<String>,
}

/// Raised when a country-scoped step is resolved without a country.
#[derive(Debug, Clone, Error)]
#[error("step '{step_id}' is country-scoped but the run has no country")]
pub struct UnsupportedScopeError {
    /// The step that needs a country.
    pub step_id: String,
}

/// Raised when the per-record failure ratio of a step exceeds its threshold.
#[derive(Debug, Clone, Error)]
#[error("step '{step_id}' failed {failed} of {attempted} records (threshold {threshold})")]
pub struct ExcessiveFailureError {
    /// The failing step.
    pub step_id: String,
    /// Number of failed units of work.
    pub failed: usize,
    /// Number of attempted units of work.
    pub attempted: usize,
    /// Configured maximum failure ratio.
    pub threshold: f64,
}

/// Raised when an artifact cannot be found.
#[derive(Debug, Clone, Error)]
#[error("no artifact for step '{step_id}' in run '{run_id}'")]
pub struct ArtifactNotFoundError {
    /// The run that was searched.
    pub run_id: String,
    /// The step whose artifact was requested.
    pub step_id: String,
}

/// Raised when a step writes a derived field owned by another step.
#[derive(Debug, Clone, Error)]
#[error("field '{field}' is owned by step '{owner}', step '{writer}' may not overwrite it")]
pub struct FieldOwnershipError {
    /// The contested field.
    pub field: String,
    /// The step that first wrote the field.
    pub owner: String,
    /// The step attempting the write.
    pub writer: String,
}

/// Error reported by an external collaborator.
///
/// Adapters must say whether a failure is worth retrying. Transient errors
/// are absorbed per record; fatal ones abort the step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Retryable failure (timeouts, 5xx, throttling, connection loss).
    #[error("transient error from {adapter}: {message}")]
    Transient {
        /// Name of the adapter.
        adapter: String,
        /// Error detail.
        message: String,
    },

    /// Non-retryable failure (client errors, malformed responses).
    #[error("fatal error from {adapter}: {message}")]
    Fatal {
        /// Name of the adapter.
        adapter: String,
        /// Error detail.
        message: String,
    },
}

impl SourceError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Name of the adapter that raised the error.
    #[must_use]
    pub fn adapter(&self) -> &str {
        match self {
            Self::Transient { adapter, .. } | Self::Fatal { adapter, .. } => adapter,
        }
    }
}
