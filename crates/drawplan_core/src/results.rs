//! Extraction of the solved plan from the flat solution vector.
//!
//! Each variable family is read back through the variable map, derived
//! series (taxes, net spending, bequest) are computed, and everything is
//! rounded to cents.

use serde::Serialize;

use crate::error::CaseStatus;
use crate::milp::builder::{LpInputs, N_ACCOUNTS};
use crate::scloop::{ConvergenceType, ScState};
use crate::tax::N_TAX_BRACKETS;
use crate::utils::{round_cents, round_cents_slice};
use crate::varmap::{Shaped, VarMap};

/// The structured result of one solved case.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    /// Start-of-year balances, shape (n_i, 3, n_n + 1).
    pub balances: Shaped,
    /// Withdrawals, shape (n_i, 3, n_n).
    pub withdrawals: Shaped,
    /// Taxable-account deposits, shape (n_i, n_n).
    pub deposits: Shaped,
    /// Roth conversions, shape (n_i, n_n).
    pub conversions: Shaped,
    /// Gross spending (net spending plus taxes), per year.
    pub gross_spending: Vec<f64>,
    /// Post-tax net spending, per year, nominal.
    pub net_spending: Vec<f64>,
    /// Ordinary income tax per year.
    pub ordinary_taxes: Vec<f64>,
    /// Capital-gain tax (dividend-adjusted, including NIIT) per year.
    pub capital_gain_taxes: Vec<f64>,
    /// Medicare + IRMAA cost per year.
    pub medicare_costs: Vec<f64>,
    /// Taxable fraction of Social Security per year.
    pub ss_taxable_fraction: Vec<f64>,
    /// IRMAA bracket selectors, shape (n_med, 6), when optimized.
    pub irmaa_selection: Option<Shaped>,
    /// Rate series used for the final solve, per year.
    pub rates: Vec<[f64; 4]>,
    /// Cumulative inflation, length n_n + 1.
    pub cumulative_inflation: Vec<f64>,
    /// First-year net spending in start-year dollars.
    pub basis: f64,
    /// Total lifetime net spending in start-year dollars.
    pub total_spending: f64,
    /// Terminal bequest after heirs' tax, in start-year dollars.
    pub bequest: f64,
    /// Estate share passed outside the household at the first death, in
    /// start-year dollars.
    pub partial_bequest: f64,
    pub case_status: CaseStatus,
    #[serde(skip)]
    pub convergence: ConvergenceType,
    pub iterations: usize,
}

/// Read the solution vector back into a structured result.
pub fn aggregate(
    vm: &VarMap,
    x: &[f64],
    inp: &LpInputs,
    sc: &ScState,
    convergence: ConvergenceType,
    iterations: usize,
) -> PlanResult {
    let n_n = inp.n_n;
    let gamma = inp.gamma;

    let balances = vm.block("b").extract(x);
    let withdrawals = vm.block("w").extract(x);
    let deposits = vm.block("d").extract(x);
    let conversions = vm.block("x").extract(x);
    let brackets = vm.block("u").extract(x);
    let split = vm.block("f").extract(x);
    let mut gross_spending = vm.block("e").extract(x).data().to_vec();
    let mut net_spending = vm.block("g").extract(x).data().to_vec();

    let mut ordinary_taxes = vec![0.0; n_n];
    for n in 0..n_n {
        for t in 0..N_TAX_BRACKETS {
            ordinary_taxes[n] += inp.tax.theta[t][n] * brackets.at2(t, n);
        }
    }

    let mut capital_gain_taxes = vec![0.0; n_n];
    for n in 0..n_n {
        let mut dividends = 0.0;
        for i in 0..inp.n_i {
            dividends += inp.dividend_coefficient(i, n) * balances.at3(i, 0, n);
        }
        capital_gain_taxes[n] =
            inp.sc.cg_rate[n] * (split.at2(1, n) + dividends) + inp.sc.niit[n];
    }

    let medicare_costs = match vm.get("m") {
        Some(block) => block.extract(x).data().to_vec(),
        None => vec![0.0; n_n],
    };

    let irmaa_selection = vm.get("zm").map(|block| block.extract(x));

    let basis = net_spending.first().copied().unwrap_or(0.0);
    let total_spending: f64 = net_spending
        .iter()
        .enumerate()
        .map(|(n, &v)| v / gamma[n])
        .sum();

    // Terminal bequest, net of the heirs' rate on the tax-deferred
    // estate, in start-year dollars.
    let mut bequest = 0.0;
    for i in 0..inp.n_i {
        for j in 0..N_ACCOUNTS {
            let weight = if j == 1 { 1.0 - inp.heirs_tax } else { 1.0 };
            bequest += weight * balances.at3(i, j, n_n);
        }
    }
    bequest /= gamma[n_n];

    // Share of the first decedent's estate that leaves the household.
    let mut partial_bequest = 0.0;
    if inp.n_i == 2 && inp.n_d < n_n {
        for j in 0..N_ACCOUNTS {
            let weight = if j == 1 { 1.0 - inp.heirs_tax } else { 1.0 };
            partial_bequest +=
                (1.0 - inp.beneficiary[j]) * weight * balances.at3(inp.i_d, j, inp.n_d);
        }
        partial_bequest /= gamma[inp.n_d];
    }

    round_cents_slice(&mut gross_spending);
    round_cents_slice(&mut net_spending);
    round_cents_slice(&mut ordinary_taxes);
    round_cents_slice(&mut capital_gain_taxes);

    PlanResult {
        balances,
        withdrawals,
        deposits,
        conversions,
        gross_spending,
        net_spending,
        ordinary_taxes,
        capital_gain_taxes,
        medicare_costs,
        ss_taxable_fraction: sc.psi.clone(),
        irmaa_selection,
        rates: inp.tau.to_vec(),
        cumulative_inflation: gamma.to_vec(),
        basis: round_cents(basis),
        total_spending: round_cents(total_spending),
        bequest: round_cents(bequest),
        partial_bequest: round_cents(partial_bequest),
        case_status: CaseStatus::Solved,
        convergence,
        iterations,
    }
}
