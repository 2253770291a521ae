use thiserror::Error;

// ---------------------------------------------------------------------------
// Core error taxonomy
// ---------------------------------------------------------------------------

/// Validation failures raised by the filter and aggregation engines.
///
/// All variants describe a problem with the caller's input; none of them are
/// transient, so retrying the same call yields the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    /// An age range whose lower bound exceeds its upper bound.
    #[error("invalid age range: lower bound {lo} exceeds upper bound {hi}")]
    InvalidRange { lo: u32, hi: u32 },

    /// A mean was requested over a table with no rows.
    #[error("cannot compute {metric} over an empty table")]
    EmptyAggregate { metric: &'static str },

    /// A required column is absent or holds values of the wrong kind.
    #[error("schema violation in column `{column}`: {reason}")]
    SchemaViolation { column: String, reason: String },
}

impl DashboardError {
    pub(crate) fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        DashboardError::SchemaViolation {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
