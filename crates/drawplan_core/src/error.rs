//! Error types for plan construction and solving.
//!
//! Failures are classified: input validation and rate-model errors are
//! reported before any LP is built; solver failures become the case
//! status; size mismatches inside the LP builder are programmer errors
//! and panic.

use std::fmt;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// Bad user input caught at the orchestrator boundary.
    Input { field: &'static str, message: String },
    /// Rate model parameter or range problem, detected before the LP build.
    RateModel { model: &'static str, message: String },
    /// Household financial profile ingest problem.
    Profile { message: String },
    /// Configuration tree problem (missing/invalid section or key).
    Config { key: String, message: String },
    /// The external solver failed or returned a non-optimal status.
    Solver(SolverFailure),
    /// A batch operation was cancelled through its token.
    Cancelled,
    /// The per-plan wall-clock budget expired.
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolverFailure {
    Infeasible,
    Unbounded,
    Numerical(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Input { field, message } => {
                write!(f, "invalid input '{}': {}", field, message)
            }
            PlanError::RateModel { model, message } => {
                write!(f, "rate model '{}': {}", model, message)
            }
            PlanError::Profile { message } => {
                write!(f, "household financial profile: {}", message)
            }
            PlanError::Config { key, message } => {
                write!(f, "configuration '{}': {}", key, message)
            }
            PlanError::Solver(failure) => write!(f, "solver: {}", failure),
            PlanError::Cancelled => write!(f, "operation cancelled"),
            PlanError::Timeout => write!(f, "wall-clock budget expired"),
        }
    }
}

impl fmt::Display for SolverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverFailure::Infeasible => write!(f, "problem is infeasible"),
            SolverFailure::Unbounded => write!(f, "problem is unbounded"),
            SolverFailure::Numerical(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for PlanError {}

impl From<SolverFailure> for PlanError {
    fn from(failure: SolverFailure) -> Self {
        PlanError::Solver(failure)
    }
}

/// Orchestrator-level exit status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CaseStatus {
    Unsolved,
    Solved,
    Infeasible,
    Unbounded,
    Timeout,
    SolverError,
    Cancelled,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Unsolved => "unsolved",
            CaseStatus::Solved => "solved",
            CaseStatus::Infeasible => "infeasible",
            CaseStatus::Unbounded => "unbounded",
            CaseStatus::Timeout => "timeout",
            CaseStatus::SolverError => "solver_error",
            CaseStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
