//! Self-consistent loop state and control flow.
//!
//! Medicare premiums, Social Security taxability, dividend income,
//! capital-gain rates, and NIIT cannot be expressed linearly inside the
//! LP. They enter as coefficients, recomputed from each solution until
//! they stop moving. This module owns the coefficient state, the
//! convergence metric, damping, and ring-buffer oscillation detection;
//! the orchestrator drives the solve itself.

use std::collections::VecDeque;
use std::fmt;

/// Maximum number of coefficient snapshots kept for cycle detection.
pub const OSCILLATION_WINDOW: usize = 15;

/// How the self-consistent loop terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceType {
    /// A single LP solve with the loop disabled.
    SingleSolve,
    Converged,
    MaxIteration,
    /// A cycle of the given length was detected with damping off.
    Oscillatory(usize),
}

impl fmt::Display for ConvergenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceType::SingleSolve => write!(f, "single solve"),
            ConvergenceType::Converged => write!(f, "converged"),
            ConvergenceType::MaxIteration => write!(f, "max iteration"),
            ConvergenceType::Oscillatory(k) => write!(f, "oscillatory (cycle length {k})"),
        }
    }
}

/// Non-linear coefficient state carried across loop iterations. All
/// series are per plan year and enter the LP as constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ScState {
    /// Modified adjusted gross income.
    pub magi: Vec<f64>,
    /// Provisional income for Social Security taxability.
    pub provisional: Vec<f64>,
    /// Medicare + IRMAA cost per year.
    pub medicare: Vec<f64>,
    /// Taxable fraction of Social Security benefits.
    pub psi: Vec<f64>,
    /// Effective long-term capital gain rate after stacking.
    pub cg_rate: Vec<f64>,
    /// Share of taxable-account withdrawals that is realized gain.
    pub gain_fraction: Vec<f64>,
    /// Net investment income tax, held as a constant per year.
    pub niit: Vec<f64>,
    /// Dividend income on the taxable stock allocation.
    pub dividends: Vec<f64>,
}

impl ScState {
    /// Initial coefficients: the 0.85 taxability baseline and the 15%
    /// middle capital-gain tier, everything else zero.
    pub fn initial(n_n: usize) -> Self {
        ScState {
            magi: vec![0.0; n_n],
            provisional: vec![0.0; n_n],
            medicare: vec![0.0; n_n],
            psi: vec![0.85; n_n],
            cg_rate: vec![0.15; n_n],
            gain_fraction: vec![0.0; n_n],
            niit: vec![0.0; n_n],
            dividends: vec![0.0; n_n],
        }
    }

    /// Concatenated view of the series the convergence metric watches.
    pub fn snapshot(&self) -> Vec<f64> {
        let mut snap = Vec::with_capacity(3 * self.magi.len());
        snap.extend_from_slice(&self.magi);
        snap.extend_from_slice(&self.medicare);
        snap.extend_from_slice(&self.psi);
        snap
    }

    /// Blend the previous state into this one:
    /// `coeff <- (1 - alpha) * previous + alpha * self`.
    /// `alpha = 1` keeps the fresh values (full replacement at
    /// `damping = 0` in the caller's convention).
    pub fn damp_from(&mut self, previous: &ScState, alpha: f64) {
        let blend = |new: &mut Vec<f64>, old: &[f64]| {
            for (v, &o) in new.iter_mut().zip(old) {
                *v = (1.0 - alpha) * o + alpha * *v;
            }
        };
        blend(&mut self.magi, &previous.magi);
        blend(&mut self.provisional, &previous.provisional);
        blend(&mut self.medicare, &previous.medicare);
        blend(&mut self.psi, &previous.psi);
        blend(&mut self.cg_rate, &previous.cg_rate);
        blend(&mut self.gain_fraction, &previous.gain_fraction);
        blend(&mut self.niit, &previous.niit);
        blend(&mut self.dividends, &previous.dividends);
    }
}

/// Element-wise convergence: each watched coefficient must move less
/// than `abs_tol` absolutely or `rel_tol` relatively.
pub fn converged(previous: &ScState, current: &ScState, abs_tol: f64, rel_tol: f64) -> bool {
    let old = previous.snapshot();
    let new = current.snapshot();
    old.iter().zip(&new).all(|(&a, &b)| {
        let diff = (a - b).abs();
        diff <= abs_tol || diff <= rel_tol * a.abs().max(1e-12)
    })
}

/// Ring buffer of coefficient snapshots for oscillation detection.
#[derive(Debug, Default)]
pub struct SnapshotHistory {
    entries: VecDeque<Vec<f64>>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        SnapshotHistory::default()
    }

    pub fn push(&mut self, snapshot: Vec<f64>) {
        if self.entries.len() == OSCILLATION_WINDOW {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detect a cycle: the latest snapshot matching (within `tol`) a
    /// non-adjacent earlier snapshot means the loop revisits states.
    /// Returns the cycle length, smallest first.
    pub fn detect_cycle(&self, tol: f64) -> Option<usize> {
        let latest = self.entries.back()?;
        let count = self.entries.len();
        for lag in 2..count {
            let earlier = &self.entries[count - 1 - lag];
            let matches = earlier
                .iter()
                .zip(latest)
                .all(|(&a, &b)| (a - b).abs() <= tol);
            if matches {
                return Some(lag);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(value: f64, n: usize) -> ScState {
        let mut state = ScState::initial(n);
        state.magi = vec![value; n];
        state.medicare = vec![value; n];
        state.psi = vec![0.1; n];
        state
    }

    #[test]
    fn test_initial_baseline() {
        let state = ScState::initial(4);
        assert!(state.psi.iter().all(|&v| v == 0.85));
        assert!(state.cg_rate.iter().all(|&v| v == 0.15));
        assert!(state.medicare.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_convergence_absolute_and_relative() {
        let a = state_with(100.0, 3);
        let mut b = state_with(100.0, 3);
        assert!(converged(&a, &b, 0.0, 0.0));

        b.magi[1] = 100.4;
        assert!(converged(&a, &b, 0.5, 0.0));
        assert!(converged(&a, &b, 0.0, 0.01));
        assert!(!converged(&a, &b, 0.1, 1e-5));
    }

    #[test]
    fn test_damping_blends_states() {
        let previous = state_with(100.0, 2);
        let mut current = state_with(200.0, 2);
        current.damp_from(&previous, 0.25);
        assert_eq!(current.magi, vec![125.0, 125.0]);
        // alpha = 1 keeps the fresh values.
        let mut replace = state_with(200.0, 2);
        replace.damp_from(&previous, 1.0);
        assert_eq!(replace.magi, vec![200.0, 200.0]);
    }

    #[test]
    fn test_cycle_detection_period_two() {
        let mut history = SnapshotHistory::new();
        let a = vec![1.0, 1.0];
        let b = vec![2.0, 2.0];
        history.push(a.clone());
        assert_eq!(history.detect_cycle(1e-9), None);
        history.push(b.clone());
        assert_eq!(history.detect_cycle(1e-9), None);
        history.push(a.clone());
        assert_eq!(history.detect_cycle(1e-9), Some(2));
        history.push(b);
        assert_eq!(history.detect_cycle(1e-9), Some(2));
    }

    #[test]
    fn test_cycle_detection_ignores_adjacent_repeat() {
        // A repeat of the immediately preceding snapshot is convergence,
        // not oscillation.
        let mut history = SnapshotHistory::new();
        history.push(vec![1.0]);
        history.push(vec![1.0]);
        assert_eq!(history.detect_cycle(1e-9), None);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = SnapshotHistory::new();
        for i in 0..(OSCILLATION_WINDOW + 10) {
            history.push(vec![i as f64]);
        }
        assert_eq!(history.len(), OSCILLATION_WINDOW);
    }

    #[test]
    fn test_convergence_type_labels() {
        assert_eq!(ConvergenceType::Converged.to_string(), "converged");
        assert_eq!(ConvergenceType::MaxIteration.to_string(), "max iteration");
        assert_eq!(
            ConvergenceType::Oscillatory(2).to_string(),
            "oscillatory (cycle length 2)"
        );
    }
}
