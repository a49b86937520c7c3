//! Embedded historical rate dataset, 1928-2024.
//!
//! Four aligned annual series in percent: S&P 500 total return, Baa
//! corporate bond return, 10-year Treasury note return, and CPI
//! inflation. Sources: Shiller/Damodaran compilations for equity and
//! fixed-income total returns, BLS for CPI. The dataset is process-wide,
//! read-only, and shared by every plan.

use crate::error::{PlanError, Result};
use crate::rates::N_ASSETS;

/// First year of the dataset (inclusive).
pub const FROM: i32 = 1928;
/// Last year of the dataset (inclusive).
pub const TO: i32 = 2024;

const YEARS: usize = (TO - FROM + 1) as usize;

#[rustfmt::skip]
const SP500_PCT: [f64; YEARS] = [
    // 1928-1939
    43.81, -8.30, -25.12, -43.84, -8.64, 49.98, -1.19, 46.74, 31.94, -35.34, 29.28, -1.10,
    // 1940-1949
    -10.67, -12.77, 19.17, 25.06, 19.03, 35.82, -8.43, 5.20, 5.70, 18.30,
    // 1950-1959
    30.81, 23.68, 18.15, -1.21, 52.56, 32.60, 7.44, -10.46, 43.72, 12.06,
    // 1960-1969
    0.34, 26.64, -8.81, 22.61, 16.42, 12.40, -9.97, 23.80, 10.81, -8.24,
    // 1970-1979
    3.56, 14.22, 18.76, -14.31, -25.90, 37.00, 23.83, -6.98, 6.51, 18.52,
    // 1980-1989
    31.74, -4.70, 20.42, 22.34, 6.15, 31.24, 18.49, 5.81, 16.54, 31.48,
    // 1990-1999
    -3.06, 30.23, 7.49, 9.97, 1.33, 37.20, 22.68, 33.10, 28.34, 20.89,
    // 2000-2009
    -9.03, -11.85, -21.97, 28.36, 10.74, 4.83, 15.61, 5.48, -36.55, 25.94,
    // 2010-2019
    14.82, 2.10, 15.89, 32.15, 13.52, 1.38, 11.77, 21.61, -4.23, 31.21,
    // 2020-2024
    18.02, 28.47, -18.04, 26.06, 24.88,
];

#[rustfmt::skip]
const BONDS_BAA_PCT: [f64; YEARS] = [
    // 1928-1939
    3.22, 3.02, 0.54, -15.68, 23.59, 12.97, 18.82, 13.31, 11.38, -4.42, 9.24, 7.98,
    // 1940-1949
    8.65, 5.01, 5.18, 8.04, 6.57, 6.82, 2.72, -0.29, 4.16, 5.30,
    // 1950-1959
    4.25, -0.27, 4.71, 1.65, 6.16, 1.25, -1.75, 2.29, 2.90, 1.40,
    // 1960-1969
    6.66, 4.91, 7.62, 5.10, 5.43, 1.51, -1.95, -0.64, 4.56, -1.97,
    // 1970-1979
    11.91, 12.66, 8.46, 3.45, -3.30, 10.90, 17.23, 4.93, 1.79, -1.45,
    // 1980-1989
    -0.62, 6.05, 36.03, 11.29, 16.69, 25.57, 18.80, 2.19, 12.45, 15.48,
    // 1990-1999
    6.67, 19.38, 10.33, 13.39, -2.82, 21.34, 3.40, 11.84, 7.57, -1.21,
    // 2000-2009
    9.33, 9.35, 12.01, 9.69, 8.62, 3.24, 5.27, 4.26, -5.07, 23.33,
    // 2010-2019
    8.35, 12.58, 10.12, -1.06, 10.38, -0.70, 10.37, 9.72, -2.76, 15.33,
    // 2020-2024
    10.41, 0.93, -14.49, 8.52, 4.51,
];

#[rustfmt::skip]
const TNOTES_PCT: [f64; YEARS] = [
    // 1928-1939
    0.84, 4.20, 4.54, -2.56, 8.79, 1.86, 7.96, 4.47, 5.02, 1.38, 4.21, 4.41,
    // 1940-1949
    5.40, -2.02, 2.29, 2.49, 2.58, 3.80, 3.13, 0.92, 1.95, 4.66,
    // 1950-1959
    0.43, -0.30, 2.27, 4.14, 3.29, -1.34, -2.26, 6.80, -2.10, -2.65,
    // 1960-1969
    11.64, 2.06, 5.69, 1.68, 3.73, 0.72, 2.91, -1.58, 3.27, -5.01,
    // 1970-1979
    16.75, 9.79, 2.82, 3.66, 1.99, 3.61, 15.98, 1.29, -0.78, 0.67,
    // 1980-1989
    -2.99, 8.20, 32.81, 3.20, 13.73, 25.71, 24.28, -4.96, 8.22, 17.69,
    // 1990-1999
    6.24, 15.00, 9.36, 14.21, -8.04, 23.48, 1.43, 9.94, 14.92, -8.25,
    // 2000-2009
    16.66, 5.57, 15.12, 0.38, 4.49, 2.87, 1.96, 10.21, 20.10, -11.12,
    // 2010-2019
    8.46, 16.04, 2.97, -9.10, 10.75, 1.28, 0.69, 2.80, -0.02, 9.64,
    // 2020-2024
    11.33, -4.42, -17.83, 3.88, -1.64,
];

#[rustfmt::skip]
const INFLATION_PCT: [f64; YEARS] = [
    // 1928-1939
    -1.15, 0.00, -2.67, -8.93, -10.30, -5.19, 3.48, 2.55, 1.03, 3.73, -2.03, -1.30,
    // 1940-1949
    0.71, 5.11, 10.92, 5.97, 1.64, 2.27, 8.53, 14.36, 7.68, -0.97,
    // 1950-1959
    1.09, 7.86, 2.28, 0.82, 0.31, -0.28, 1.52, 3.42, 2.73, 1.08,
    // 1960-1969
    1.50, 1.08, 1.15, 1.24, 1.28, 1.59, 3.02, 2.77, 4.27, 5.46,
    // 1970-1979
    5.84, 4.30, 3.27, 6.18, 11.05, 9.14, 5.74, 6.50, 7.63, 11.25,
    // 1980-1989
    13.55, 10.33, 6.13, 3.21, 4.32, 3.56, 1.86, 3.65, 4.14, 4.82,
    // 1990-1999
    5.40, 4.21, 3.01, 2.99, 2.56, 2.83, 2.95, 2.29, 1.56, 2.21,
    // 2000-2009
    3.36, 2.85, 1.58, 2.28, 2.66, 3.39, 3.23, 2.85, 3.84, -0.36,
    // 2010-2019
    1.64, 3.16, 2.07, 1.46, 1.62, 0.12, 1.26, 2.13, 2.44, 1.81,
    // 2020-2024
    1.23, 4.70, 8.00, 4.12, 2.95,
];

/// Decimal rates for a dataset row (0 = 1928).
pub fn rate_row(index: usize) -> [f64; N_ASSETS] {
    [
        SP500_PCT[index] / 100.0,
        BONDS_BAA_PCT[index] / 100.0,
        TNOTES_PCT[index] / 100.0,
        INFLATION_PCT[index] / 100.0,
    ]
}

/// Validate a `[frm, to]` range against the dataset, returning the row
/// indices of the window.
pub fn window(model: &'static str, frm: i32, to: i32) -> Result<(usize, usize)> {
    if !(FROM..=TO).contains(&frm) {
        return Err(PlanError::RateModel {
            model,
            message: format!("lower range 'from={frm}' out of bounds [{FROM}, {TO}]"),
        });
    }
    if !(FROM..=TO).contains(&to) {
        return Err(PlanError::RateModel {
            model,
            message: format!("upper range 'to={to}' out of bounds [{FROM}, {TO}]"),
        });
    }
    if frm > to {
        return Err(PlanError::RateModel {
            model,
            message: format!("'from={frm}' must not exceed 'to={to}'"),
        });
    }
    Ok(((frm - FROM) as usize, (to - FROM) as usize))
}

/// Empirical distribution of a historical window, in decimal.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeStats {
    pub means: [f64; N_ASSETS],
    pub stdevs: [f64; N_ASSETS],
    pub corr: [[f64; N_ASSETS]; N_ASSETS],
    pub covar: [[f64; N_ASSETS]; N_ASSETS],
}

/// Means, sample standard deviations, correlation, and covariance over
/// the inclusive window `[frm, to]`.
pub fn range_stats(model: &'static str, frm: i32, to: i32) -> Result<RangeStats> {
    let (lo, hi) = window(model, frm, to)?;
    let count = hi - lo + 1;
    if count < 2 {
        return Err(PlanError::RateModel {
            model,
            message: "need at least two years to estimate a distribution".to_string(),
        });
    }

    let mut means = [0.0; N_ASSETS];
    for idx in lo..=hi {
        let row = rate_row(idx);
        for k in 0..N_ASSETS {
            means[k] += row[k];
        }
    }
    for m in means.iter_mut() {
        *m /= count as f64;
    }

    let mut covar = [[0.0; N_ASSETS]; N_ASSETS];
    for idx in lo..=hi {
        let row = rate_row(idx);
        for a in 0..N_ASSETS {
            for b in 0..N_ASSETS {
                covar[a][b] += (row[a] - means[a]) * (row[b] - means[b]);
            }
        }
    }
    for row in covar.iter_mut() {
        for v in row.iter_mut() {
            *v /= (count - 1) as f64;
        }
    }

    let mut stdevs = [0.0; N_ASSETS];
    for k in 0..N_ASSETS {
        stdevs[k] = covar[k][k].sqrt();
    }

    let mut corr = [[0.0; N_ASSETS]; N_ASSETS];
    for a in 0..N_ASSETS {
        for b in 0..N_ASSETS {
            corr[a][b] = covar[a][b] / (stdevs[a] * stdevs[b]);
        }
    }

    Ok(RangeStats {
        means,
        stdevs,
        corr,
        covar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dataset_is_aligned() {
        assert_eq!(SP500_PCT.len(), YEARS);
        assert_eq!(BONDS_BAA_PCT.len(), YEARS);
        assert_eq!(TNOTES_PCT.len(), YEARS);
        assert_eq!(INFLATION_PCT.len(), YEARS);
    }

    #[test]
    fn test_known_rows() {
        // 1928 is row 0; 1974 carries the bear-market loss.
        assert_relative_eq!(rate_row(0)[0], 0.4381, epsilon = 1e-12);
        let r1974 = rate_row((1974 - FROM) as usize);
        assert_relative_eq!(r1974[0], -0.2590, epsilon = 1e-12);
        assert_relative_eq!(r1974[3], 0.1105, epsilon = 1e-12);
    }

    #[test]
    fn test_window_validation() {
        assert!(window("historical", 1969, 2002).is_ok());
        assert!(window("historical", FROM, TO).is_ok());
        assert!(window("historical", 1900, 1950).is_err());
        assert!(window("historical", 1950, 2050).is_err());
        assert!(window("historical", 1990, 1980).is_err());
    }

    #[test]
    fn test_range_stats_are_plausible() {
        let stats = range_stats("histochastic", 1928, 2024).unwrap();
        // Long-run equity mean sits near 12% with near-20% volatility.
        assert!(stats.means[0] > 0.09 && stats.means[0] < 0.14);
        assert!(stats.stdevs[0] > 0.15 && stats.stdevs[0] < 0.25);
        // Correlation matrix has unit diagonal and is symmetric.
        for a in 0..N_ASSETS {
            assert_relative_eq!(stats.corr[a][a], 1.0, epsilon = 1e-9);
            for b in 0..N_ASSETS {
                assert_relative_eq!(stats.corr[a][b], stats.corr[b][a], epsilon = 1e-12);
                assert_relative_eq!(
                    stats.covar[a][b],
                    stats.corr[a][b] * stats.stdevs[a] * stats.stdevs[b],
                    epsilon = 1e-12
                );
            }
        }
    }
}
