//! Tax-aware retirement drawdown planning library
//!
//! This crate computes multi-year drawdown plans for one or two
//! individuals by formulating the problem as a mixed-integer linear
//! program and iterating it to a fixed point over the quantities the LP
//! cannot express linearly. It supports:
//! - Three account types (taxable, tax-deferred, tax-free) with
//!   per-year withdrawals, deposits, and Roth conversions
//! - Federal bracket stacking across the TCJA/post-TCJA boundary,
//!   dividend-adjusted capital gains, NIIT, and Social Security
//!   taxability
//! - Medicare Part B / IRMAA with the two-year MAGI lookback, either
//!   recomputed between solves or optimized inside the MILP
//! - A polymorphic rate-model family (fixed presets, historical replay
//!   and averages, multivariate-normal stochastic, bootstrap variants,
//!   tabular) with reproducible seeding and sequence transforms
//! - Batch distributions over historical start years and Monte Carlo
//!   draws, with cooperative cancellation
//!
//! The LP/MILP solver itself is an external collaborator consumed
//! through the [`milp::MilpSolver`] trait.

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod allocation;
pub mod error;
pub mod medicare;
pub mod milp;
pub mod pension;
pub mod plan;
pub mod profile;
pub mod rates;
pub mod results;
pub mod rmd;
pub mod scloop;
pub mod social_security;
pub mod spending;
pub mod tax;
pub mod utils;
pub mod varmap;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::Config;
pub use error::{CaseStatus, PlanError, Result};
pub use milp::{MilpProblem, MilpSolver, SolverOutcome, SolverStatus};
pub use plan::{
    BatchResult, BatchRun, CancelToken, MedicareMode, Objective, Plan, SolveOptions,
    SsTaxability,
};
pub use rates::{RateGenerator, RateModel, RateSource};
pub use results::PlanResult;
pub use scloop::ConvergenceType;
