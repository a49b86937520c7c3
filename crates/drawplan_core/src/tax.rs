//! Federal income tax schedules and capital-gain calculations.
//!
//! Bracket and deduction tables cover the TCJA regime (2025 values) and
//! the pre-TCJA regime (2026 values) that returns when the configured
//! OBBBA extension expires. Tables are indexed by filing status:
//! `[0]` single, `[1]` married filing jointly. All values are
//! unadjusted for inflation; the LP builder scales by the cumulative
//! inflation series.

/// Number of federal ordinary-income brackets.
pub const N_TAX_BRACKETS: usize = 7;

pub const TAX_BRACKET_NAMES: [&str; N_TAX_BRACKETS] =
    ["10%", "12/15%", "22/25%", "24/28%", "32/33%", "35%", "37/40%"];

const RATES_2025: [f64; N_TAX_BRACKETS] = [0.10, 0.12, 0.22, 0.24, 0.32, 0.35, 0.370];
const RATES_2026: [f64; N_TAX_BRACKETS] = [0.10, 0.15, 0.25, 0.28, 0.33, 0.35, 0.396];

// Bracket tops, single [0] and married filing jointly [1].
const TAX_BRACKETS_2025: [[f64; N_TAX_BRACKETS]; 2] = [
    [11_925.0, 48_475.0, 103_350.0, 197_300.0, 250_525.0, 626_350.0, 9_999_999.0],
    [23_850.0, 96_950.0, 206_700.0, 394_600.0, 501_050.0, 751_700.0, 9_999_999.0],
];

const TAX_BRACKETS_2026: [[f64; N_TAX_BRACKETS]; 2] = [
    [11_850.0, 48_200.0, 116_700.0, 243_400.0, 529_200.0, 531_400.0, 9_999_999.0],
    [23_700.0, 96_400.0, 194_400.0, 296_350.0, 529_200.0, 596_900.0, 9_999_999.0],
];

const STD_DEDUCTION_2025: [f64; 2] = [15_000.0, 30_000.0];
const STD_DEDUCTION_2026: [f64; 2] = [8_300.0, 16_600.0];
const EXTRA_65_DEDUCTION: [f64; 2] = [2_000.0, 1_600.0];

// Long-term capital gain stacking thresholds: top of the 0% tier and
// top of the 15% tier, single [0] / married [1].
const LTCG_0_TOP: [f64; 2] = [49_450.0, 98_900.0];
const LTCG_15_TOP: [f64; 2] = [545_500.0, 613_700.0];

// Net investment income tax.
const NIIT_RATE: f64 = 0.038;
const NIIT_THRESHOLD: [f64; 2] = [200_000.0, 250_000.0];

/// Per-year tax schedule over the plan horizon.
///
/// - `sigma[n]`: standard deduction (with 65+ additions per survivor)
/// - `theta[t][n]`: marginal rate of bracket `t`
/// - `delta[t][n]`: width of bracket `t`
#[derive(Debug, Clone)]
pub struct TaxSchedule {
    pub sigma: Vec<f64>,
    pub theta: Vec<Vec<f64>>,
    pub delta: Vec<Vec<f64>>,
}

/// Build the standard deduction, marginal rate, and bracket width series.
///
/// Years before `obbba_year` use the TCJA 2025 tables; from `obbba_year`
/// on, the pre-TCJA 2026 tables apply. Filing status drops to single in
/// year `n_d` when individual `i_d` dies before the end of the plan.
pub fn tax_schedule(
    yobs: &[i32],
    i_d: usize,
    n_d: usize,
    n_n: usize,
    this_year: i32,
    obbba_year: i32,
) -> TaxSchedule {
    // Bracket widths from bracket tops, computed once per regime.
    let mut delta_2025 = TAX_BRACKETS_2025;
    let mut delta_2026 = TAX_BRACKETS_2026;
    for t in (1..N_TAX_BRACKETS).rev() {
        for s in 0..2 {
            delta_2025[s][t] -= delta_2025[s][t - 1];
            delta_2026[s][t] -= delta_2026[s][t - 1];
        }
    }

    let mut sigma = vec![0.0; n_n];
    let mut theta = vec![vec![0.0; n_n]; N_TAX_BRACKETS];
    let mut delta = vec![vec![0.0; n_n]; N_TAX_BRACKETS];

    let mut filing_status = yobs.len() - 1;
    let mut souls: Vec<usize> = (0..yobs.len()).collect();

    for n in 0..n_n {
        if n == n_d && yobs.len() == 2 {
            souls.retain(|&i| i != i_d);
            filing_status -= 1;
        }

        let pre_obbba = this_year + (n as i32) < obbba_year;
        let (rates, deltas, deduction) = if pre_obbba {
            (&RATES_2025, &delta_2025, &STD_DEDUCTION_2025)
        } else {
            (&RATES_2026, &delta_2026, &STD_DEDUCTION_2026)
        };

        sigma[n] = deduction[filing_status];
        for &i in &souls {
            if this_year + n as i32 - yobs[i] >= 65 {
                sigma[n] += EXTRA_65_DEDUCTION[filing_status];
            }
        }
        for t in 0..N_TAX_BRACKETS {
            theta[t][n] = rates[t];
            delta[t][n] = deltas[filing_status][t];
        }
    }

    TaxSchedule { sigma, theta, delta }
}

/// Ordinary federal tax on a given taxable income for one year of a
/// schedule, walking brackets bottom-up. Used by the self-consistent
/// loop to recompute taxes outside the LP.
pub fn ordinary_tax(schedule: &TaxSchedule, n: usize, taxable: f64, gamma_n: f64) -> f64 {
    if taxable <= 0.0 {
        return 0.0;
    }
    let mut remaining = taxable;
    let mut tax = 0.0;
    for t in 0..N_TAX_BRACKETS {
        let width = schedule.delta[t][n] * gamma_n;
        let in_bracket = remaining.min(width);
        tax += in_bracket * schedule.theta[t][n];
        remaining -= in_bracket;
        if remaining <= 0.0 {
            break;
        }
    }
    tax
}

/// Long-term capital gain tax with bracket stacking over ordinary income.
///
/// `taxable_income[n]` is total taxable income including the gains;
/// `ltcg[n]` is the long-term gain portion (dividend-adjusted). Gains
/// stack on top of ordinary income: the part above the 15% threshold is
/// taxed at 20%, the part above the 0% threshold at 15%. Thresholds are
/// indexed by `gamma`. Filing status is married until year `n_d`, single
/// after.
pub fn capital_gain_tax(
    n_i: usize,
    taxable_income: &[f64],
    ltcg: &[f64],
    gamma: &[f64],
    n_d: usize,
    n_n: usize,
) -> Vec<f64> {
    let mut cg_tax = vec![0.0; n_n];
    for n in 0..n_n {
        let gains = ltcg[n];
        if gains <= 0.0 {
            continue;
        }
        let status = if n_i == 2 && n < n_d { 1 } else { 0 };
        let top0 = LTCG_0_TOP[status] * gamma[n];
        let top15 = LTCG_15_TOP[status] * gamma[n];
        let income = taxable_income[n];

        let at20 = (income - top15).max(0.0).min(gains);
        let at15 = (income - top0).max(0.0).min(gains) - at20;
        cg_tax[n] = 0.20 * at20 + 0.15 * at15;
    }
    cg_tax
}

/// Net investment income tax: 3.8% of the lesser of net investment
/// income and the MAGI excess over the (non-indexed) threshold.
pub fn net_investment_income_tax(
    magi: f64,
    net_investment_income: f64,
    filing_status: usize,
) -> f64 {
    let excess = (magi - NIIT_THRESHOLD[filing_status]).max(0.0);
    NIIT_RATE * excess.min(net_investment_income.max(0.0))
}
