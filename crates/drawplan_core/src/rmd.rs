//! Required Minimum Distribution fractions.
//!
//! Uses the IRS Uniform Lifetime Table. The starting age is 73, moving
//! to 75 for years after 2032 per SECURE 2.0. Spouses with more than a
//! ten-year age difference would require the Joint Life table, which is
//! not implemented; that case is logged and the Uniform table used.

use tracing::warn;

// IRS Uniform Lifetime Table, indexed from age 72.
const RMD_TABLE: [f64; 34] = [
    27.4, 26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, 18.5, 17.7, 16.8, 16.0, 15.2,
    14.4, 13.7, 12.9, 12.2, 11.5, 10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4, 6.0, 5.6, 5.2,
    4.9, 4.6,
];

/// Divisor for a given age, clamped to the table's last entry for ages
/// beyond its end.
pub fn divisor_for_age(age: i32) -> Option<f64> {
    if age < 72 {
        return None;
    }
    let idx = ((age - 72) as usize).min(RMD_TABLE.len() - 1);
    Some(RMD_TABLE[idx])
}

/// RMD fractions rho[i][n]: the minimum fraction of the tax-deferred
/// balance that must be withdrawn by individual `i` in plan year `n`.
pub fn rmd_fractions(yobs: &[i32], n_n: usize, this_year: i32) -> Vec<Vec<f64>> {
    let n_i = yobs.len();
    if n_i == 2 && (yobs[0] - yobs[1]).abs() > 10 {
        warn!("RMD: unsupported age difference of more than 10 years; using Uniform Lifetime Table");
    }

    let mut rho = vec![vec![0.0; n_n]; n_i];
    for i in 0..n_i {
        let age_now = this_year - yobs[i];
        for n in 0..n_n {
            let year = this_year + n as i32;
            let age = age_now + n as i32;
            // RMD age rises from 73 to 75 in 2033.
            if age < 73 || (year > 2032 && age < 75) {
                continue;
            }
            if let Some(divisor) = divisor_for_age(age) {
                rho[i][n] = 1.0 / divisor;
            }
        }
    }
    rho
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_divisor_values() {
        assert_eq!(divisor_for_age(72), Some(27.4));
        assert_eq!(divisor_for_age(73), Some(26.5));
        assert_eq!(divisor_for_age(80), Some(20.2));
        assert_eq!(divisor_for_age(90), Some(12.2));
        assert_eq!(divisor_for_age(71), None);
        // Past the table end, the last entry applies.
        assert_eq!(divisor_for_age(120), Some(4.6));
    }

    #[test]
    fn test_fractions_start_at_73() {
        let this_year = 2026;
        let rho = rmd_fractions(&[this_year - 70], 8, this_year);
        assert_eq!(rho[0][0], 0.0);
        assert_eq!(rho[0][2], 0.0);
        assert_relative_eq!(rho[0][3], 1.0 / 26.5, epsilon = 1e-12);
        assert_relative_eq!(rho[0][4], 1.0 / 25.5, epsilon = 1e-12);
    }

    #[test]
    fn test_start_age_shifts_to_75_after_2032() {
        let this_year = 2026;
        // Born 2026-66: reaches 73 in 2033, but the threshold is then 75.
        let rho = rmd_fractions(&[this_year - 66], 12, this_year);
        assert_eq!(rho[0][7], 0.0); // age 73 in 2033
        assert_eq!(rho[0][8], 0.0); // age 74
        assert_relative_eq!(rho[0][9], 1.0 / 24.6, epsilon = 1e-12); // age 75
    }

    #[test]
    fn test_couple_shapes() {
        let this_year = 2026;
        let rho = rmd_fractions(&[this_year - 75, this_year - 68], 5, this_year);
        assert_eq!(rho.len(), 2);
        assert!(rho[0][0] > 0.0);
        assert_eq!(rho[1][0], 0.0);
    }
}
