//! Pension benefit timing.
//!
//! Monthly pension amounts become an annual series per individual, with
//! the start year derived from the commencement age plus birth month and
//! the first year prorated by the fraction of the year remaining.

/// Annual pension benefits per individual and plan year.
///
/// `amounts` are monthly; output is annual (x12). A commencement age in
/// the past starts the series at year 0 without proration.
pub fn pension_benefits(
    amounts: &[f64],
    ages: &[f64],
    yobs: &[i32],
    mobs: &[i32],
    horizons: &[usize],
    n_n: usize,
    this_year: i32,
) -> Vec<Vec<f64>> {
    let n_i = amounts.len();
    let mut pi = vec![vec![0.0; n_n]; n_i];
    for i in 0..n_i {
        if amounts[i] == 0.0 {
            continue;
        }
        let yearage = ages[i] + (mobs[i] - 1) as f64 / 12.0;
        let fraction = 1.0 - yearage.fract();
        let real_start = yearage.floor() as i32 - this_year + yobs[i];
        let ns = real_start.max(0) as usize;
        let nd = horizons[i].min(n_n);
        for n in ns..nd {
            pi[i][n] = amounts[i];
        }
        if real_start >= 0 && ns < nd {
            pi[i][ns] *= fraction;
        }
        for v in pi[i].iter_mut() {
            *v *= 12.0;
        }
    }
    pi
}

/// Pre-discount non-indexed pensions by the cumulative inflation series
/// so that the nominal amount stays constant after the builder's
/// multiplication by gamma. Indexed pensions are left in real dollars.
pub fn apply_indexing(pi: &mut [Vec<f64>], indexed: &[bool], gamma: &[f64]) {
    for (i, series) in pi.iter_mut().enumerate() {
        if indexed[i] {
            continue;
        }
        for (n, v) in series.iter_mut().enumerate() {
            *v /= gamma[n];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_already_started_pension_fills_from_year_zero() {
        let this_year = 2026;
        // 55 now, started at 50: no proration, $100/month for all years.
        let pi = pension_benefits(
            &[100.0],
            &[50.0],
            &[this_year - 55],
            &[1],
            &[10],
            10,
            this_year,
        );
        for n in 0..10 {
            assert_relative_eq!(pi[0][n], 1_200.0);
        }
    }

    #[test]
    fn test_first_year_proration_from_birth_month() {
        let this_year = 2026;
        // 63 now, starting at 65 with an October birth month: the
        // commencement age lands 9 months into the start year.
        let pi = pension_benefits(
            &[1_000.0],
            &[65.0],
            &[this_year - 63],
            &[10],
            &[20],
            20,
            this_year,
        );
        assert_relative_eq!(pi[0][1], 0.0);
        assert_relative_eq!(pi[0][2], 12_000.0 * (1.0 - 9.0 / 12.0), epsilon = 1e-9);
        assert_relative_eq!(pi[0][3], 12_000.0);
    }

    #[test]
    fn test_zero_amounts_stay_zero() {
        let this_year = 2026;
        let pi = pension_benefits(
            &[0.0, 0.0],
            &[65.0, 65.0],
            &[this_year - 66, this_year - 63],
            &[1, 1],
            &[20, 20],
            20,
            this_year,
        );
        assert!(pi.iter().all(|row| row.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_series_stops_at_horizon() {
        let this_year = 2026;
        let pi = pension_benefits(
            &[500.0],
            &[60.0],
            &[this_year - 66],
            &[1],
            &[8],
            20,
            this_year,
        );
        assert!(pi[0][7] > 0.0);
        assert_relative_eq!(pi[0][8], 0.0);
    }

    #[test]
    fn test_non_indexed_pension_pre_discounted() {
        let gamma: Vec<f64> = (0..5).map(|n| 1.05f64.powi(n)).collect();
        let mut pi = vec![vec![1_200.0; 5], vec![1_200.0; 5]];
        apply_indexing(&mut pi, &[true, false], &gamma);
        // Indexed pension untouched (real dollars); non-indexed divided
        // by gamma so the nominal series is constant downstream.
        assert_relative_eq!(pi[0][3], 1_200.0);
        assert_relative_eq!(pi[1][3], 1_200.0 / gamma[3], epsilon = 1e-9);
    }
}
