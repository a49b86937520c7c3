//! Medicare Part B premiums and IRMAA surcharges.
//!
//! IRMAA uses a two-year MAGI lookback: the premium charged in plan year
//! `n` depends on the MAGI of year `n - 2`. For the first two plan years
//! the caller supplies the household's actual MAGI for the two years
//! preceding the plan start. Thresholds are indexed by the cumulative
//! inflation series.

/// Number of IRMAA tiers, including the base (no-surcharge) tier.
pub const N_IRMAA: usize = 6;

// 2026 CMS values. Standard monthly Part B premium is $202.90; the
// remaining entries are the incremental monthly surcharges per tier.
// Stored annualized (x12).
const IRMAA_FEES: [f64; N_IRMAA] = [
    12.0 * 202.90,
    12.0 * 81.20,
    12.0 * 121.70,
    12.0 * 121.70,
    12.0 * 121.70,
    12.0 * 40.70,
];

// MAGI thresholds: single [0] and married filing jointly [1].
const IRMAA_BRACKETS: [[f64; N_IRMAA]; 2] = [
    [0.0, 109_000.0, 137_000.0, 171_000.0, 205_000.0, 500_000.0],
    [0.0, 218_000.0, 274_000.0, 342_000.0, 410_000.0, 750_000.0],
];

/// Annualized standard Part B premium (tier 0 fee).
pub fn part_b_basic_annual() -> f64 {
    IRMAA_FEES[0]
}

/// MAGI threshold of tier `q` for a filing status (0 single, 1 married).
pub fn irmaa_threshold(filing_status: usize, q: usize) -> f64 {
    IRMAA_BRACKETS[filing_status][q]
}

/// Cumulative annual cost when landing in tier `q`: the basic premium
/// plus all incremental surcharges up to and including that tier.
pub fn irmaa_cumulative_costs() -> [f64; N_IRMAA] {
    let mut out = [0.0; N_IRMAA];
    let mut total = 0.0;
    for (q, fee) in IRMAA_FEES.iter().enumerate() {
        total += fee;
        out[q] = total;
    }
    out
}

/// MAGI used for the premium of year `n`: the two-year lookback within
/// the plan, or the user-supplied pre-plan MAGI for the first two years.
fn lookback_magi(n: usize, magi: &[f64], prev_magi: &[f64; 2]) -> f64 {
    if n < 2 { prev_magi[n] } else { magi[n - 2] }
}

/// Compute Medicare + IRMAA costs per plan year directly.
///
/// Each individual aged 65+ within their horizon is charged the basic
/// Part B premium; each IRMAA tier whose (inflation-indexed) threshold
/// the lookback MAGI exceeds adds its incremental surcharge. Used in
/// self-consistent-loop mode, where premiums come from the previous
/// solution's MAGI series.
#[allow(clippy::too_many_arguments)]
pub fn medicare_costs(
    yobs: &[i32],
    horizons: &[usize],
    magi: &[f64],
    prev_magi: &[f64; 2],
    gamma: &[f64],
    n_d: usize,
    n_n: usize,
    this_year: i32,
) -> Vec<f64> {
    let n_i = yobs.len();
    let mut costs = vec![0.0; n_n];
    for n in 0..n_n {
        let status = if n_i == 2 && n < n_d { 1 } else { 0 };
        let magi_n = lookback_magi(n, magi, prev_magi);
        for i in 0..n_i {
            if this_year + n as i32 - yobs[i] >= 65 && n < horizons[i] {
                costs[n] += gamma[n] * IRMAA_FEES[0];
                for q in 1..N_IRMAA {
                    if magi_n > gamma[n] * IRMAA_BRACKETS[status][q] {
                        costs[n] += gamma[n] * IRMAA_FEES[q];
                    }
                }
            }
        }
    }
    costs
}

/// Per-year IRMAA tables for the MILP "optimize" mode.
///
/// Returns `(n_med, thresholds, costs)` where row `n` carries the
/// inflation-indexed tier thresholds `L[n][q]` and the cumulative annual
/// premium `C[n][q]` (scaled by the number of eligible individuals) that
/// the bracket-selection binaries use for the premium of year `n`.
/// `n_med` is the number of leading plan years with any eligible
/// individual; rows past the last eligible year are zero.
#[allow(clippy::too_many_arguments)]
pub fn medicare_values(
    yobs: &[i32],
    horizons: &[usize],
    gamma: &[f64],
    n_d: usize,
    n_n: usize,
    this_year: i32,
) -> (usize, Vec<[f64; N_IRMAA]>, Vec<[f64; N_IRMAA]>) {
    let n_i = yobs.len();
    let cumulative = irmaa_cumulative_costs();
    let mut thresholds = vec![[0.0; N_IRMAA]; n_n];
    let mut costs = vec![[0.0; N_IRMAA]; n_n];
    let mut n_med = 0;
    for n in 0..n_n {
        let status = if n_i == 2 && n < n_d { 1 } else { 0 };
        let eligible = (0..n_i)
            .filter(|&i| this_year + n as i32 - yobs[i] >= 65 && n < horizons[i])
            .count();
        if eligible == 0 {
            continue;
        }
        n_med = n + 1;
        for q in 0..N_IRMAA {
            thresholds[n][q] = gamma[n] * IRMAA_BRACKETS[status][q];
            costs[n][q] = eligible as f64 * gamma[n] * cumulative[q];
        }
    }
    (n_med, thresholds, costs)
}
