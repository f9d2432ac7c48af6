//! Error taxonomy for the scheduling core

use thiserror::Error;

/// A single problem found while validating a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Zero-based position of the target in the input list.
    pub index: usize,
    /// Target name, or "<unnamed>" when the name itself is missing.
    pub name: String,
    pub problem: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target #{} ({}): {}", self.index + 1, self.name, self.problem)
    }
}

/// Aggregated validation failure. Every problem found in the input is
/// collected before the queue build fails, so the operator sees the full
/// list in one pass.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} validation error(s):", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Meridian transit computation could not produce a usable answer.
///
/// Fatal for the affected target only; the run moves on.
#[derive(Debug, Clone, Error)]
pub enum PredictionError {
    #[error("no transit found within 24 sidereal hours of {reference}")]
    NoSolution { reference: String },

    #[error("non-finite input to transit computation: {0}")]
    BadInput(String),
}

/// How a controller error should be treated by the retry machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerErrorKind {
    /// Network-class failure (timeout, refused connection, 5xx). Retried
    /// with bounded exponential backoff.
    Transient,
    /// The observatory reports itself offline. Retried like a transient
    /// failure; exhaustion fails the target with the reported reason.
    Offline,
    /// Authentication, protocol or device fault. Never retried.
    Fatal,
}

/// Error from the remote imaging controller, as seen through the
/// [`crate::controller::ControllerOps`] seam.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ControllerError {
    pub kind: ControllerErrorKind,
    pub message: String,
}

impl ControllerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: ControllerErrorKind::Transient, message: message.into() }
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self { kind: ControllerErrorKind::Offline, message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { kind: ControllerErrorKind::Fatal, message: message.into() }
    }

    /// Whether the retry loop is allowed to try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ControllerErrorKind::Transient | ControllerErrorKind::Offline)
    }
}
