//! Failure taxonomy of one forwarding cycle.
//!
//! Each variant names the step that failed. None of them stops the loop:
//! the row stays unsent (or, for [`ForwardError::AggregateRefresh`], stays
//! sent with stale statistics) and the next cycle tries again.

use std::fmt;

use crate::materializer::MaterializeError;
use crate::store::StoreError;

/// Step of the cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Looking for the oldest unsent row.
    Selecting,
    /// Writing the artifact.
    Materializing,
    /// Flipping the `sent` flag.
    Marking,
    /// Recomputing daily statistics.
    Refreshing,
}

impl Stage {
    /// Lower-case name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Materializing => "materializing",
            Self::Marking => "marking",
            Self::Refreshing => "refreshing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure caught at the forwarding loop boundary.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The row query failed; the cycle is treated as empty.
    #[error("selection failed: {0}")]
    Selection(#[source] StoreError),

    /// The primary artifact could not be written; the row stays unsent.
    #[error("materialization failed: {0}")]
    Materialization(#[from] MaterializeError),

    /// The conditional update could not be executed; the row stays unsent.
    #[error("marking failed: {0}")]
    Marking(#[source] StoreError),

    /// Statistics could not be refreshed after a successful mark.
    #[error("aggregate refresh failed: {0}")]
    AggregateRefresh(#[source] StoreError),
}

impl ForwardError {
    /// The step this failure belongs to.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Selection(_) => Stage::Selecting,
            Self::Materialization(_) => Stage::Materializing,
            Self::Marking(_) => Stage::Marking,
            Self::AggregateRefresh(_) => Stage::Refreshing,
        }
    }

    /// Whether the store was unreachable rather than the statement failing.
    pub const fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Selection(StoreError::Connection(_))
                | Self::Marking(StoreError::Connection(_))
                | Self::AggregateRefresh(StoreError::Connection(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_follows_variant() {
        let err = ForwardError::Marking(StoreError::Query("bad column".to_owned()));
        assert_eq!(err.stage(), Stage::Marking);
        assert!(!err.is_connection());
        assert!(err.to_string().contains("bad column"));
    }

    #[test]
    fn connection_errors_are_recognised() {
        let err = ForwardError::Selection(StoreError::Connection("refused".to_owned()));
        assert!(err.is_connection());
        assert_eq!(err.stage().to_string(), "selecting");
    }
}
