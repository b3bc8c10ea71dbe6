//! Error taxonomy for the assembly pipeline.
//!
//! Stage failures carry enough detail to report every broken constraint at
//! once. [`Error::is_recoverable`] tells the orchestrator which failures are
//! worth a fresh assembly attempt.

use crate::validate::Violation;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The catalog or requested paragraph range cannot hold the simple-block
    /// invariants. Retrying with the same inputs will not help.
    #[error("structure unsatisfiable: {0}")]
    StructureUnsatisfiable(String),

    /// Complex blocks cannot all be placed on the assembled structure.
    #[error("coverage unsatisfiable: {0}")]
    CoverageUnsatisfiable(String),

    /// The validator rejected a structure or document.
    #[error("{} constraint violation(s): {}", .0.len(), join_violations(.0))]
    ConstraintViolation(Vec<Violation>),

    /// One or more verbatim spans could not be found in the populated document.
    #[error("verbatim span(s) lost during population: {}", .0.join(" | "))]
    VerbatimLoss(Vec<String>),

    /// Tool names survived into the populated document.
    #[error("tool name(s) leaked into document: {}", .0.join(", "))]
    ToolLeak(Vec<String>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid user context: {0}")]
    InvalidUserContext(String),

    #[error("markup error on line {line}: {message}")]
    Markup { line: usize, message: String },

    #[error("run cancelled")]
    Cancelled,

    /// A batch worker panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a fresh assembly attempt may clear this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CoverageUnsatisfiable(_) | Self::ConstraintViolation(_)
        )
    }

    /// Whether re-running only the populator (with strict anchoring) may
    /// clear this failure.
    pub fn is_population_failure(&self) -> bool {
        matches!(self, Self::VerbatimLoss(_) | Self::ToolLeak(_))
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Constraint;

    #[test]
    fn recoverable_kinds() {
        assert!(Error::CoverageUnsatisfiable("x".into()).is_recoverable());
        assert!(Error::ConstraintViolation(vec![]).is_recoverable());
        assert!(!Error::StructureUnsatisfiable("x".into()).is_recoverable());
        assert!(!Error::ToolLeak(vec!["grep".into()]).is_recoverable());
    }

    #[test]
    fn population_failures() {
        assert!(Error::VerbatimLoss(vec!["a".into()]).is_population_failure());
        assert!(Error::ToolLeak(vec!["grep".into()]).is_population_failure());
        assert!(!Error::Cancelled.is_population_failure());
    }

    #[test]
    fn violation_list_in_message() {
        let err = Error::ConstraintViolation(vec![
            Violation::new(Constraint::ParagraphCount, "5 paragraphs"),
            Violation::new(Constraint::FormatRatio, "1 of 7 merged"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 constraint violation(s)"));
        assert!(msg.contains("paragraph_count: 5 paragraphs"));
        assert!(msg.contains("format_ratio: 1 of 7 merged"));
    }
}
