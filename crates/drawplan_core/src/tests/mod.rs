//! Cross-module tests for the drawdown planner.
//!
//! Tests are organized by topic:
//! - `builder` - structure of the emitted MILP
//! - `scloop_control` - self-consistent loop control flow
//! - `config_roundtrip` - configuration serialization
//! - `batch` - historical-range and Monte Carlo distributions

mod builder;
mod config_roundtrip;
mod scloop_control;

use std::sync::Mutex;

use crate::allocation::AllocationRatios;
use crate::milp::{MilpProblem, MilpSolver, SolverOutcome};
use crate::plan::Plan;
use crate::rates::RateModel;
use crate::spending::ProfileKind;

pub const TEST_YEAR: i32 = 2026;

/// A scripted solver double: every solve returns a vector filled with
/// one constant. The real solver is an external collaborator, so loop
/// and aggregation behavior is exercised against known vectors.
pub struct ScriptedSolver {
    fill: f64,
    pub calls: Mutex<usize>,
}

impl ScriptedSolver {
    pub fn constant(fill: f64) -> Self {
        ScriptedSolver {
            fill,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl MilpSolver for ScriptedSolver {
    fn solve(&self, problem: &MilpProblem) -> SolverOutcome {
        *self.calls.lock().unwrap() += 1;
        SolverOutcome::optimal(self.fill, vec![self.fill; problem.nvars])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// An oscillating solver: alternates between two fills forever.
pub struct AlternatingSolver {
    fills: [f64; 2],
    pub calls: Mutex<usize>,
}

impl AlternatingSolver {
    pub fn new(a: f64, b: f64) -> Self {
        AlternatingSolver {
            fills: [a, b],
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl MilpSolver for AlternatingSolver {
    fn solve(&self, problem: &MilpProblem) -> SolverOutcome {
        let mut calls = self.calls.lock().unwrap();
        let fill = self.fills[*calls % 2];
        *calls += 1;
        SolverOutcome::optimal(fill, vec![fill; problem.nvars])
    }
}

/// A Jack-and-Jill couple plan with fixed user rates, ready to solve.
pub fn couple_plan(name: &str) -> Plan {
    let mut plan = Plan::with_start_year(
        &["Jack", "Jill"],
        &["1964-01-15", "1967-01-16"],
        &[82, 79],
        name,
        TEST_YEAR,
    )
    .unwrap();
    plan.set_spending_profile(ProfileKind::Flat, 60.0).unwrap();
    plan.set_account_balances(
        &[90_000.0, 60_000.0],
        &[600_000.0, 150_000.0],
        &[70_000.0, 40_000.0],
    )
    .unwrap();
    plan.set_allocation_ratios(AllocationRatios::Individual(vec![
        [[60.0, 40.0, 0.0, 0.0], [70.0, 30.0, 0.0, 0.0]],
        [[50.0, 50.0, 0.0, 0.0], [70.0, 30.0, 0.0, 0.0]],
    ]))
    .unwrap();
    plan.set_pension(&[0.0, 10.0], &[65.0, 65.0], &[false, false])
        .unwrap();
    plan.set_social_security(&[2_333.0, 2_083.0], &[67.0, 70.0])
        .unwrap();
    plan.set_rates(
        RateModel::User {
            values: [6.0, 4.0, 3.3, 2.8],
        },
        None,
    )
    .unwrap();
    plan
}
