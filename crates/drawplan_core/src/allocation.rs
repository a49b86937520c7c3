//! Asset-allocation ratios and their interpolation over the plan.
//!
//! Allocations are parameters, not decision variables: each
//! (individual, account, asset-class) weight is interpolated between a
//! user-supplied initial and final 4-vector along the plan years, either
//! linearly or along a logistic s-curve. The builder turns them into the
//! allocation-weighted return of each account.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::rates::N_ASSETS;

pub const N_ACCOUNTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMethod {
    Linear,
    SCurve,
}

/// How allocation bounds are supplied.
///
/// - `Individual`: one initial/final pair per individual, shared by all
///   of that individual's accounts.
/// - `Account`: one pair per (individual, account type).
/// - `Spouses`: a single household-wide pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "generic")]
pub enum AllocationRatios {
    Individual(Vec<[[f64; N_ASSETS]; 2]>),
    Account(Vec<[[f64; N_ASSETS]; 2]>),
    Spouses([[f64; N_ASSETS]; 2]),
}

impl AllocationRatios {
    /// Validate shapes and that every 4-vector sums to 100 percent.
    pub fn validate(&self, n_i: usize) -> Result<()> {
        let check = |pair: &[[f64; N_ASSETS]; 2]| -> Result<()> {
            for vec in pair {
                let total: f64 = vec.iter().sum();
                if (total - 100.0).abs() > 1e-6 {
                    return Err(PlanError::Input {
                        field: "asset_allocation",
                        message: format!("allocation weights must sum to 100, got {total}"),
                    });
                }
                if vec.iter().any(|&v| v < 0.0) {
                    return Err(PlanError::Input {
                        field: "asset_allocation",
                        message: "allocation weights cannot be negative".to_string(),
                    });
                }
            }
            Ok(())
        };
        match self {
            AllocationRatios::Individual(pairs) => {
                if pairs.len() != n_i {
                    return Err(PlanError::Input {
                        field: "asset_allocation",
                        message: format!("expected {} individual allocation pairs", n_i),
                    });
                }
                pairs.iter().try_for_each(check)
            }
            AllocationRatios::Account(pairs) => {
                if pairs.len() != n_i * N_ACCOUNTS {
                    return Err(PlanError::Input {
                        field: "asset_allocation",
                        message: format!(
                            "expected {} account allocation pairs",
                            n_i * N_ACCOUNTS
                        ),
                    });
                }
                pairs.iter().try_for_each(check)
            }
            AllocationRatios::Spouses(pair) => check(pair),
        }
    }

    /// Initial/final pair for a given (individual, account).
    fn pair(&self, i: usize, j: usize) -> &[[f64; N_ASSETS]; 2] {
        match self {
            AllocationRatios::Individual(pairs) => &pairs[i],
            AllocationRatios::Account(pairs) => &pairs[i * N_ACCOUNTS + j],
            AllocationRatios::Spouses(pair) => pair,
        }
    }
}

/// Interpolated allocation weights alpha[i][j][k][n] as decimals.
#[derive(Debug, Clone)]
pub struct AlphaSeries {
    weights: Vec<f64>,
    n_i: usize,
    n_n: usize,
}

impl AlphaSeries {
    pub fn at(&self, i: usize, j: usize, k: usize, n: usize) -> f64 {
        let idx = ((i * N_ACCOUNTS + j) * N_ASSETS + k) * self.n_n + n;
        self.weights[idx]
    }

    /// Allocation-weighted return of account (i, j) in year n.
    pub fn weighted_return(&self, i: usize, j: usize, n: usize, tau_n: &[f64; N_ASSETS]) -> f64 {
        (0..N_ASSETS).map(|k| self.at(i, j, k, n) * tau_n[k]).sum()
    }

    pub fn n_individuals(&self) -> usize {
        self.n_i
    }
}

/// Interpolation progress through the plan, in [0, 1].
fn progress(method: InterpolationMethod, n: usize, n_n: usize, center: f64, width: f64) -> f64 {
    match method {
        InterpolationMethod::Linear => {
            if n_n <= 1 {
                1.0
            } else {
                n as f64 / (n_n - 1) as f64
            }
        }
        InterpolationMethod::SCurve => {
            0.5 * (1.0 + ((n as f64 - center) / width).tanh())
        }
    }
}

/// Interpolate the allocation ratios into per-year weights.
pub fn interpolate(
    ratios: &AllocationRatios,
    method: InterpolationMethod,
    center: f64,
    width: f64,
    n_i: usize,
    n_n: usize,
) -> Result<AlphaSeries> {
    ratios.validate(n_i)?;
    if width <= 0.0 {
        return Err(PlanError::Input {
            field: "interpolation_width",
            message: "must be positive".to_string(),
        });
    }
    let mut weights = vec![0.0; n_i * N_ACCOUNTS * N_ASSETS * n_n];
    for i in 0..n_i {
        for j in 0..N_ACCOUNTS {
            let pair = ratios.pair(i, j);
            for n in 0..n_n {
                let t = progress(method, n, n_n, center, width);
                for k in 0..N_ASSETS {
                    let v = pair[0][k] + (pair[1][k] - pair[0][k]) * t;
                    let idx = ((i * N_ACCOUNTS + j) * N_ASSETS + k) * n_n + n;
                    weights[idx] = v / 100.0;
                }
            }
        }
    }
    Ok(AlphaSeries { weights, n_i, n_n })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sixty_forty() -> AllocationRatios {
        AllocationRatios::Individual(vec![[
            [60.0, 40.0, 0.0, 0.0],
            [70.0, 30.0, 0.0, 0.0],
        ]])
    }

    #[test]
    fn test_weights_sum_to_one_every_year() {
        let alpha = interpolate(&sixty_forty(), InterpolationMethod::SCurve, 15.0, 5.0, 1, 30)
            .unwrap();
        for n in 0..30 {
            let total: f64 = (0..N_ASSETS).map(|k| alpha.at(0, 0, k, n)).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_linear_endpoints() {
        let alpha = interpolate(&sixty_forty(), InterpolationMethod::Linear, 15.0, 5.0, 1, 10)
            .unwrap();
        assert_relative_eq!(alpha.at(0, 0, 0, 0), 0.60, epsilon = 1e-12);
        assert_relative_eq!(alpha.at(0, 0, 0, 9), 0.70, epsilon = 1e-12);
        assert_relative_eq!(alpha.at(0, 2, 1, 9), 0.30, epsilon = 1e-12);
    }

    #[test]
    fn test_s_curve_is_monotonic_between_endpoints() {
        let alpha = interpolate(&sixty_forty(), InterpolationMethod::SCurve, 15.0, 5.0, 1, 30)
            .unwrap();
        for n in 1..30 {
            assert!(alpha.at(0, 0, 0, n) >= alpha.at(0, 0, 0, n - 1));
        }
        assert!(alpha.at(0, 0, 0, 0) < 0.605);
        assert!(alpha.at(0, 0, 0, 29) > 0.695);
    }

    #[test]
    fn test_weighted_return() {
        let alpha = interpolate(&sixty_forty(), InterpolationMethod::Linear, 15.0, 5.0, 1, 2)
            .unwrap();
        let tau = [0.10, 0.05, 0.03, 0.02];
        assert_relative_eq!(
            alpha.weighted_return(0, 0, 0, &tau),
            0.6 * 0.10 + 0.4 * 0.05,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_validation_rejects_bad_sum_and_shape() {
        let bad = AllocationRatios::Individual(vec![[
            [50.0, 40.0, 0.0, 0.0],
            [70.0, 30.0, 0.0, 0.0],
        ]]);
        assert!(bad.validate(1).is_err());
        assert!(sixty_forty().validate(2).is_err());

        let account = AllocationRatios::Account(vec![
            [[60.0, 40.0, 0.0, 0.0], [70.0, 30.0, 0.0, 0.0]];
            3
        ]);
        assert!(account.validate(1).is_ok());
    }
}
