//! Social Security benefit rules.
//!
//! Full Retirement Age, early-claiming reductions and delayed credits,
//! the spousal top-up, the per-year benefit series, and the provisional
//! income taxability formula used by the self-consistent loop.

/// Full Retirement Age in years for a given year of birth: 66 through
/// 1954, stepping up two months per year to 67 for 1960 and later.
pub fn full_retirement_age(yob: i32) -> f64 {
    if yob <= 1954 {
        66.0
    } else if yob >= 1960 {
        67.0
    } else {
        66.0 + 2.0 * (yob - 1954) as f64 / 12.0
    }
}

/// Actuarial factor on one's own benefit for claiming at `claim_age`.
///
/// Early claiming reduces by 5/9 of 1% per month for the first 36
/// months below FRA, then 5/12 of 1% per month (claiming floor at 62).
/// Delayed claiming earns 2/3 of 1% per month up to age 70.
pub fn self_factor(fra: f64, claim_age: f64) -> f64 {
    let months = ((claim_age - fra) * 12.0).round();
    if months >= 0.0 {
        1.0 + months * (2.0 / 3.0) / 100.0
    } else {
        let below = -months;
        let first = below.min(36.0);
        let beyond = (below - 36.0).max(0.0);
        1.0 - first * (5.0 / 9.0) / 100.0 - beyond * (5.0 / 12.0) / 100.0
    }
}

/// Actuarial factor on the spousal benefit for claiming at `claim_age`.
///
/// Reduction is 25/36 of 1% per month for the first 36 months below
/// FRA, then 5/12 of 1% per month. There is no delayed credit on
/// spousal benefits.
pub fn spousal_factor(fra: f64, claim_age: f64) -> f64 {
    let months = ((claim_age - fra) * 12.0).round();
    if months >= 0.0 {
        1.0
    } else {
        let below = -months;
        let first = below.min(36.0);
        let beyond = (below - 36.0).max(0.0);
        1.0 - first * (25.0 / 36.0) / 100.0 - beyond * (5.0 / 12.0) / 100.0
    }
}

/// Monthly spousal top-up per individual: when a spouse's PIA is below
/// half the higher earner's PIA, the benefit is topped up to that half.
pub fn spousal_benefits(pias: &[f64]) -> Vec<f64> {
    if pias.len() < 2 {
        return vec![0.0; pias.len()];
    }
    let high = pias.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    pias.iter()
        .map(|&pia| if pia < 0.5 * high { 0.5 * high - pia } else { 0.0 })
        .collect()
}

/// Annual Social Security benefits per individual and plan year, in
/// start-year dollars.
///
/// `pias` are monthly PIA amounts; `claim_ages` may carry fractional
/// months. The first benefit year is prorated by the fraction of the
/// year remaining after the claim month. Spousal top-ups apply while
/// both spouses are alive; from year `n_d` the survivor keeps the larger
/// of the two base benefits.
#[allow(clippy::too_many_arguments)]
pub fn benefit_series(
    pias: &[f64],
    claim_ages: &[f64],
    yobs: &[i32],
    mobs: &[i32],
    horizons: &[usize],
    n_d: usize,
    n_n: usize,
    this_year: i32,
) -> Vec<Vec<f64>> {
    let n_i = pias.len();
    let mut zeta = vec![vec![0.0; n_n]; n_i];

    // Base benefit per individual: PIA x self factor, with first-year
    // proration from the claim age plus birth month.
    let mut base = vec![0.0; n_i];
    for i in 0..n_i {
        if pias[i] == 0.0 {
            continue;
        }
        let fra = full_retirement_age(yobs[i]);
        let factor = self_factor(fra, claim_ages[i]);
        base[i] = 12.0 * pias[i] * factor;

        let yearage = claim_ages[i] + (mobs[i] - 1) as f64 / 12.0;
        let start = yearage.floor() as i32 - this_year + yobs[i];
        let ns = start.max(0) as usize;
        let nd_i = horizons[i].min(n_n);
        if ns >= nd_i {
            continue;
        }
        for n in ns..nd_i {
            zeta[i][n] = base[i];
        }
        if start >= 0 {
            zeta[i][ns] *= 1.0 - yearage.fract();
        }
    }

    // Spousal top-up during joint years.
    if n_i == 2 {
        let topups = spousal_benefits(pias);
        for i in 0..n_i {
            if topups[i] == 0.0 {
                continue;
            }
            let fra = full_retirement_age(yobs[i]);
            let factor = spousal_factor(fra, claim_ages[i]);
            let yearage = claim_ages[i] + (mobs[i] - 1) as f64 / 12.0;
            let ns = (yearage.floor() as i32 - this_year + yobs[i]).max(0) as usize;
            for n in ns..n_d.min(horizons[i]).min(n_n) {
                zeta[i][n] += 12.0 * topups[i] * factor;
            }
        }

        // Survivor keeps the larger base benefit.
        if n_d < n_n {
            let survivor = if horizons[0] > horizons[1] { 0 } else { 1 };
            let larger = base[0].max(base[1]);
            for n in n_d..horizons[survivor].min(n_n) {
                if zeta[survivor][n] > 0.0 || larger > 0.0 {
                    zeta[survivor][n] = zeta[survivor][n].max(larger);
                }
            }
        }
    }

    zeta
}

// Provisional income thresholds, single [0] / married [1]. These are
// fixed in statute and not indexed for inflation.
const PI_LOW: [f64; 2] = [25_000.0, 32_000.0];
const PI_HIGH: [f64; 2] = [34_000.0, 44_000.0];

pub fn provisional_thresholds(filing_status: usize) -> (f64, f64) {
    (PI_LOW[filing_status], PI_HIGH[filing_status])
}

/// Taxable fraction of Social Security benefits from provisional income.
///
/// Provisional income is half the benefit plus other taxable income and
/// tax-exempt interest. The taxable amount stacks: 50% of the excess
/// over the lower threshold, then 85% of the excess over the upper one,
/// capped at 85% of the benefit. Negative provisional income (large
/// capital losses) yields zero.
pub fn taxable_fraction(provisional_income: f64, ss_benefit: f64, filing_status: usize) -> f64 {
    if ss_benefit <= 0.0 || provisional_income <= 0.0 {
        return 0.0;
    }
    let (low, high) = provisional_thresholds(filing_status);
    let taxable = if provisional_income <= low {
        0.0
    } else if provisional_income <= high {
        0.5 * (provisional_income - low)
    } else {
        0.5 * (high - low) + 0.85 * (provisional_income - high)
    };
    (taxable.min(0.85 * ss_benefit) / ss_benefit).clamp(0.0, 0.85)
}
