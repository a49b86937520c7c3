//! Control-flow tests for the self-consistent loop.
//!
//! A scripted solver stands in for the external MILP solver so the loop
//! semantics (convergence, oscillation exit, damping continuation, exit
//! statuses) can be pinned without a real optimization.

use crate::error::CaseStatus;
use crate::milp::{MilpProblem, MilpSolver, SolverOutcome, SolverStatus};
use crate::plan::{CancelToken, Objective, SolveOptions};
use crate::scloop::ConvergenceType;

use super::{AlternatingSolver, ScriptedSolver, couple_plan};

#[test]
fn test_constant_solution_converges() {
    let mut plan = couple_plan("converges");
    let solver = ScriptedSolver::constant(1_000.0);
    plan.solve(Objective::MaxSpending, &SolveOptions::default(), &solver)
        .unwrap();

    assert_eq!(plan.case_status(), CaseStatus::Solved);
    assert_eq!(plan.convergence(), ConvergenceType::Converged);
    assert_eq!(plan.exit_status(), "solved");
    // Identical solutions produce identical coefficients: the loop
    // needs the initial solve plus one refinement.
    assert_eq!(solver.call_count(), 2);
    let result = plan.result().unwrap();
    assert_eq!(result.iterations, 2);
}

#[test]
fn test_oscillation_breaks_without_damping() {
    let mut plan = couple_plan("oscillates");
    let solver = AlternatingSolver::new(1.0e6, 2.0e6);
    let options = SolveOptions {
        sc_damping_on_osc: 0.0,
        abs_tol: 1.0,
        rel_tol: 0.0,
        ..SolveOptions::default()
    };
    plan.solve(Objective::MaxSpending, &options, &solver).unwrap();

    assert_eq!(plan.case_status(), CaseStatus::Solved);
    assert_eq!(plan.convergence(), ConvergenceType::Oscillatory(2));
    assert_eq!(plan.exit_status(), "oscillatory");
    // The last iterate is returned as best effort.
    assert!(plan.result().is_some());
}

#[test]
fn test_oscillation_continues_with_damping() {
    let mut plan = couple_plan("damped");
    let solver = AlternatingSolver::new(1.0e6, 2.0e6);
    let options = SolveOptions {
        sc_damping_on_osc: 0.5,
        abs_tol: 1.0,
        rel_tol: 0.0,
        max_iterations: 4,
        ..SolveOptions::default()
    };
    plan.solve(Objective::MaxSpending, &options, &solver).unwrap();

    assert_eq!(plan.convergence(), ConvergenceType::MaxIteration);
    assert_eq!(plan.exit_status(), "max_iteration");
    // Initial solve plus one per loop iteration.
    assert_eq!(solver.call_count(), options.max_iterations + 1);
}

#[test]
fn test_sc_loop_disabled_is_single_solve() {
    let mut plan = couple_plan("single_solve");
    let solver = ScriptedSolver::constant(500.0);
    let options = SolveOptions {
        with_sc_loop: false,
        ..SolveOptions::default()
    };
    plan.solve(Objective::MaxSpending, &options, &solver).unwrap();

    assert_eq!(plan.convergence(), ConvergenceType::SingleSolve);
    assert_eq!(solver.call_count(), 1);
    // Reporting coefficients are still populated.
    let result = plan.result().unwrap();
    assert_eq!(result.ss_taxable_fraction.len(), plan.horizon());
}

struct InfeasibleSolver;

impl MilpSolver for InfeasibleSolver {
    fn solve(&self, _problem: &MilpProblem) -> SolverOutcome {
        SolverOutcome::failed(SolverStatus::Infeasible)
    }
}

#[test]
fn test_infeasible_status_reported() {
    let mut plan = couple_plan("infeasible");
    let err = plan
        .solve(Objective::MaxSpending, &SolveOptions::default(), &InfeasibleSolver)
        .unwrap_err();
    assert_eq!(plan.case_status(), CaseStatus::Infeasible);
    assert_eq!(plan.exit_status(), "infeasible");
    assert!(err.to_string().contains("infeasible"));
    assert!(plan.result().is_none());
}

struct WrongLengthSolver;

impl MilpSolver for WrongLengthSolver {
    fn solve(&self, _problem: &MilpProblem) -> SolverOutcome {
        SolverOutcome::optimal(0.0, vec![0.0; 3])
    }
}

#[test]
fn test_solver_length_mismatch_is_solver_error() {
    let mut plan = couple_plan("bad_solver");
    let err = plan
        .solve(Objective::MaxSpending, &SolveOptions::default(), &WrongLengthSolver)
        .unwrap_err();
    assert_eq!(plan.case_status(), CaseStatus::SolverError);
    assert!(err.to_string().contains("variables"));
}

#[test]
fn test_cancellation_between_iterations() {
    let mut plan = couple_plan("cancelled");
    let solver = ScriptedSolver::constant(1_000.0);
    let token = CancelToken::new();
    token.cancel();
    let err = plan
        .solve_with_progress(
            Objective::MaxSpending,
            &SolveOptions::default(),
            &solver,
            None,
            Some(&token),
        )
        .unwrap_err();
    assert_eq!(plan.case_status(), CaseStatus::Cancelled);
    assert!(matches!(err, crate::error::PlanError::Cancelled));
    assert_eq!(solver.call_count(), 0);
}

#[test]
fn test_progress_callback_sees_each_iteration() {
    use std::sync::Mutex;
    let mut plan = couple_plan("progress");
    let solver = ScriptedSolver::constant(1_000.0);
    let seen: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    let callback = |iteration: usize, _objective: f64| {
        seen.lock().unwrap().push(iteration);
    };
    plan.solve_with_progress(
        Objective::MaxSpending,
        &SolveOptions::default(),
        &solver,
        Some(&callback),
        None,
    )
    .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}
