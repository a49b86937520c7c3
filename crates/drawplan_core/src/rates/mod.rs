//! Annual rate generation for the four modeled asset classes.
//!
//! A [`RateModel`] describes how the (N, 4) series of annual returns for
//! {stocks, Baa corporate bonds, 10-year T-notes, inflation} is
//! produced: fixed presets, user-fixed values, historical replay or
//! averages, multivariate-normal stochastic draws, bootstrap variants,
//! or a caller-supplied table. A [`RateGenerator`] pairs a model with a
//! seeded RNG and the optional reverse/roll transforms.

pub mod bootstrap;
pub mod historical;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PlanError, Result};
pub use bootstrap::{BootstrapVariant, BootstrapWindow};
pub use historical::{FROM, RangeStats, TO};

/// Number of modeled asset classes:
/// {0: stocks, 1: corporate bonds Baa, 2: T-notes, 3: cash/inflation}.
pub const N_ASSETS: usize = 4;

/// A generated rate series: one `[f64; 4]` row per year, in decimal.
pub type RateSeries = Vec<[f64; N_ASSETS]>;

// Fixed presets, in percent. `default` is the 30-year trailing
// historical average; the other two follow industry forecast surveys.
const DEFAULT_RATES_PCT: [f64; N_ASSETS] = [10.81, 5.63, 3.76, 2.53];
const OPTIMISTIC_RATES_PCT: [f64; N_ASSETS] = [8.0, 5.5, 4.5, 2.5];
const CONSERVATIVE_RATES_PCT: [f64; N_ASSETS] = [6.0, 4.0, 3.5, 2.5];

/// Correlation input: a full symmetric 4x4 matrix, or the six upper
/// triangle off-diagonal coefficients in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationSpec {
    UpperTriangle([f64; 6]),
    Matrix([[f64; N_ASSETS]; N_ASSETS]),
}

impl CorrelationSpec {
    /// Expand to a full matrix, validating symmetry and coefficient
    /// range.
    pub fn matrix(&self, model: &'static str) -> Result<[[f64; N_ASSETS]; N_ASSETS]> {
        let full = match self {
            CorrelationSpec::Matrix(m) => {
                for a in 0..N_ASSETS {
                    for b in 0..N_ASSETS {
                        if (m[a][b] - m[b][a]).abs() > 1e-9 {
                            return Err(PlanError::RateModel {
                                model,
                                message: "correlation matrix must be symmetric".to_string(),
                            });
                        }
                    }
                }
                *m
            }
            CorrelationSpec::UpperTriangle(coeffs) => {
                let mut m = [[0.0; N_ASSETS]; N_ASSETS];
                for (k, row) in m.iter_mut().enumerate() {
                    row[k] = 1.0;
                }
                let mut x = 0;
                for a in 0..N_ASSETS {
                    for b in a + 1..N_ASSETS {
                        m[a][b] = coeffs[x];
                        m[b][a] = coeffs[x];
                        x += 1;
                    }
                }
                m
            }
        };
        for row in &full {
            for &v in row {
                if !(-1.0..=1.0).contains(&v) {
                    return Err(PlanError::RateModel {
                        model,
                        message: format!("correlation coefficient {v} outside [-1, 1]"),
                    });
                }
            }
        }
        Ok(full)
    }
}

/// The polymorphic family of rate models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RateModel {
    Default,
    Optimistic,
    Conservative,
    /// User-fixed annual rates, in percent.
    User { values: [f64; N_ASSETS] },
    /// Historical replay cycling through `[frm, to]`.
    Historical { frm: i32, to: i32 },
    /// Constant series at the historical column means over `[frm, to]`.
    HistoricalAverage { frm: i32, to: i32 },
    /// Multivariate normal from user means/stdevs (percent) and an
    /// optional correlation; identity when omitted.
    Stochastic {
        values: [f64; N_ASSETS],
        stdev: [f64; N_ASSETS],
        corr: Option<CorrelationSpec>,
    },
    /// Multivariate normal fitted to the historical window.
    Histochastic { frm: i32, to: i32 },
    /// Bootstrap sequence-of-returns over a historical window.
    BootstrapSor {
        frm: i32,
        to: i32,
        #[serde(default)]
        variant: BootstrapVariant,
        #[serde(default = "default_block_size")]
        block_size: usize,
        #[serde(default)]
        crisis_years: Vec<i32>,
        #[serde(default = "default_crisis_weight")]
        crisis_weight: f64,
    },
    /// Caller-supplied table; percent is auto-detected and converted.
    Tabular { rows: Vec<[f64; N_ASSETS]> },
}

fn default_block_size() -> usize {
    1
}

fn default_crisis_weight() -> f64 {
    1.0
}

impl RateModel {
    pub fn name(&self) -> &'static str {
        match self {
            RateModel::Default => "default",
            RateModel::Optimistic => "optimistic",
            RateModel::Conservative => "conservative",
            RateModel::User { .. } => "user",
            RateModel::Historical { .. } => "historical",
            RateModel::HistoricalAverage { .. } => "historical average",
            RateModel::Stochastic { .. } => "stochastic",
            RateModel::Histochastic { .. } => "histochastic",
            RateModel::BootstrapSor { .. } => "bootstrap_sor",
            RateModel::Tabular { .. } => "tabular",
        }
    }

    /// No randomness: successive generate calls yield identical output.
    pub fn deterministic(&self) -> bool {
        !matches!(
            self,
            RateModel::Stochastic { .. }
                | RateModel::Histochastic { .. }
                | RateModel::BootstrapSor { .. }
        )
    }

    /// Every generated row is identical.
    pub fn constant(&self) -> bool {
        matches!(
            self,
            RateModel::Default
                | RateModel::Optimistic
                | RateModel::Conservative
                | RateModel::User { .. }
                | RateModel::HistoricalAverage { .. }
        )
    }

    /// Validate parameters against the model's schema before any LP is
    /// built.
    pub fn validate(&self) -> Result<()> {
        match self {
            RateModel::Default | RateModel::Optimistic | RateModel::Conservative => Ok(()),
            RateModel::User { .. } => Ok(()),
            RateModel::Historical { frm, to } => {
                historical::window("historical", *frm, *to).map(|_| ())
            }
            RateModel::HistoricalAverage { frm, to } => {
                historical::window("historical average", *frm, *to).map(|_| ())
            }
            RateModel::Histochastic { frm, to } => {
                historical::range_stats("histochastic", *frm, *to).map(|_| ())
            }
            RateModel::Stochastic { stdev, corr, .. } => {
                if stdev.iter().any(|&s| s < 0.0) {
                    return Err(PlanError::RateModel {
                        model: "stochastic",
                        message: "standard deviations cannot be negative".to_string(),
                    });
                }
                if let Some(spec) = corr {
                    spec.matrix("stochastic")?;
                }
                Ok(())
            }
            RateModel::BootstrapSor {
                frm,
                to,
                variant,
                block_size,
                crisis_years,
                crisis_weight,
            } => BootstrapWindow::new(*frm, *to, *variant, *block_size, crisis_years, *crisis_weight)
                .map(|_| ()),
            RateModel::Tabular { rows } => {
                if rows.is_empty() {
                    return Err(PlanError::RateModel {
                        model: "tabular",
                        message: "table must contain at least one row".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

}

/// Reverse the series along the time axis in place.
pub fn reverse_series(series: &mut RateSeries) {
    series.reverse();
}

/// Cyclically shift the series by `k` in place: positive `k` moves later
/// values to earlier indices (row 0 becomes the original row `len - k`).
pub fn roll_series(series: &mut RateSeries, k: i64) {
    let len = series.len();
    if len == 0 || k == 0 {
        return;
    }
    let shift = k.rem_euclid(len as i64) as usize;
    series.rotate_right(shift);
}

/// Lower-triangular Cholesky factor of a 4x4 covariance matrix.
fn cholesky(cov: &[[f64; N_ASSETS]; N_ASSETS]) -> Result<[[f64; N_ASSETS]; N_ASSETS]> {
    let mut l = [[0.0; N_ASSETS]; N_ASSETS];
    for a in 0..N_ASSETS {
        for b in 0..=a {
            let mut sum = cov[a][b];
            for k in 0..b {
                sum -= l[a][k] * l[b][k];
            }
            if a == b {
                if sum <= 0.0 {
                    return Err(PlanError::RateModel {
                        model: "stochastic",
                        message: "covariance matrix is not positive definite".to_string(),
                    });
                }
                l[a][a] = sum.sqrt();
            } else {
                l[a][b] = sum / l[b][b];
            }
        }
    }
    Ok(l)
}

fn covariance(
    stdev: &[f64; N_ASSETS],
    corr: &[[f64; N_ASSETS]; N_ASSETS],
) -> [[f64; N_ASSETS]; N_ASSETS] {
    let mut cov = [[0.0; N_ASSETS]; N_ASSETS];
    for a in 0..N_ASSETS {
        for b in 0..N_ASSETS {
            cov[a][b] = corr[a][b] * stdev[a] * stdev[b];
        }
    }
    cov
}

/// A generation seam for externally provided models: anything that can
/// produce an (N, 4) decimal series with declared predicates.
pub trait RateSource: Send {
    fn generate(&mut self, n: usize) -> Result<RateSeries>;
    fn deterministic(&self) -> bool;
    fn constant(&self) -> bool;
}

/// A [`RateModel`] paired with its RNG state and post-generation
/// transforms.
#[derive(Debug, Clone)]
pub struct RateGenerator {
    model: RateModel,
    rng: SmallRng,
    seed: Option<u64>,
    reverse: bool,
    roll: i64,
    fitted: Option<RangeStats>,
}

impl RateGenerator {
    pub fn new(model: RateModel, seed: Option<u64>) -> Result<Self> {
        model.validate()?;
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_os_rng(),
        };
        Ok(RateGenerator {
            model,
            rng,
            seed,
            reverse: false,
            roll: 0,
            fitted: None,
        })
    }

    pub fn model(&self) -> &RateModel {
        &self.model
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn reverse(&self) -> bool {
        self.reverse
    }

    pub fn roll(&self) -> i64 {
        self.roll
    }

    /// Distribution parameters fitted during the last generate call, for
    /// the historical-average and histochastic models.
    pub fn fitted(&self) -> Option<&RangeStats> {
        self.fitted.as_ref()
    }

    /// Reset the RNG stream. With the original seed this replays the
    /// exact draw sequence; with a new seed it starts a fresh one.
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.seed = seed;
        self.rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_os_rng(),
        };
    }

    /// Configure the post-generation transforms: reverse is applied
    /// first, then the cyclic roll.
    pub fn set_transforms(&mut self, reverse: bool, roll: i64) {
        self.reverse = reverse;
        self.roll = roll;
    }

    /// Generate the (N, 4) decimal series and apply the transforms.
    pub fn generate(&mut self, n: usize) -> Result<RateSeries> {
        let mut series = self.generate_raw(n)?;
        if self.reverse || self.roll != 0 {
            if self.model.constant() {
                warn!(
                    model = self.model.name(),
                    "reverse/roll has no effect on a constant rate series; ignored"
                );
            } else {
                if self.reverse {
                    reverse_series(&mut series);
                }
                if self.roll != 0 {
                    roll_series(&mut series, self.roll);
                }
            }
        }
        Ok(series)
    }

    fn generate_raw(&mut self, n: usize) -> Result<RateSeries> {
        match &self.model {
            RateModel::Default => Ok(fixed_series(n, &DEFAULT_RATES_PCT)),
            RateModel::Optimistic => Ok(fixed_series(n, &OPTIMISTIC_RATES_PCT)),
            RateModel::Conservative => Ok(fixed_series(n, &CONSERVATIVE_RATES_PCT)),
            RateModel::User { values } => Ok(fixed_series(n, values)),
            RateModel::Historical { frm, to } => {
                let (lo, hi) = historical::window("historical", *frm, *to)?;
                let span = hi - lo + 1;
                Ok((0..n).map(|m| historical::rate_row(lo + m % span)).collect())
            }
            RateModel::HistoricalAverage { frm, to } => {
                let stats = historical::range_stats("historical average", *frm, *to)?;
                let series = vec![stats.means; n];
                self.fitted = Some(stats);
                Ok(series)
            }
            RateModel::Histochastic { frm, to } => {
                let stats = historical::range_stats("histochastic", *frm, *to)?;
                let l = cholesky(&stats.covar)?;
                let series = draw_multivariate(&mut self.rng, &stats.means, &l, n);
                self.fitted = Some(stats);
                Ok(series)
            }
            RateModel::Stochastic {
                values,
                stdev,
                corr,
            } => {
                let means: [f64; N_ASSETS] = std::array::from_fn(|k| values[k] / 100.0);
                let sigmas: [f64; N_ASSETS] = std::array::from_fn(|k| stdev[k] / 100.0);
                let corr_matrix = match corr {
                    Some(spec) => spec.matrix("stochastic")?,
                    None => {
                        let mut ident = [[0.0; N_ASSETS]; N_ASSETS];
                        for (k, row) in ident.iter_mut().enumerate() {
                            row[k] = 1.0;
                        }
                        ident
                    }
                };
                let l = cholesky(&covariance(&sigmas, &corr_matrix))?;
                Ok(draw_multivariate(&mut self.rng, &means, &l, n))
            }
            RateModel::BootstrapSor {
                frm,
                to,
                variant,
                block_size,
                crisis_years,
                crisis_weight,
            } => {
                let window = BootstrapWindow::new(
                    *frm,
                    *to,
                    *variant,
                    *block_size,
                    crisis_years,
                    *crisis_weight,
                )?;
                Ok(window.generate(&mut self.rng, n))
            }
            RateModel::Tabular { rows } => {
                if rows.len() < n {
                    return Err(PlanError::RateModel {
                        model: "tabular",
                        message: format!(
                            "table has {} rows but {} years are required",
                            rows.len(),
                            n
                        ),
                    });
                }
                let mut out: RateSeries = rows[..n].to_vec();
                // Mean magnitude above 1 means the table is in percent.
                let magnitude: f64 = out
                    .iter()
                    .flat_map(|r| r.iter())
                    .map(|v| v.abs())
                    .sum::<f64>()
                    / (n * N_ASSETS) as f64;
                if magnitude > 1.0 {
                    for row in out.iter_mut() {
                        for v in row.iter_mut() {
                            *v /= 100.0;
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

impl RateSource for RateGenerator {
    fn generate(&mut self, n: usize) -> Result<RateSeries> {
        RateGenerator::generate(self, n)
    }

    fn deterministic(&self) -> bool {
        self.model.deterministic()
    }

    fn constant(&self) -> bool {
        self.model.constant()
    }
}

fn fixed_series(n: usize, values_pct: &[f64; N_ASSETS]) -> RateSeries {
    let row: [f64; N_ASSETS] = std::array::from_fn(|k| values_pct[k] / 100.0);
    vec![row; n]
}

fn draw_multivariate(
    rng: &mut SmallRng,
    means: &[f64; N_ASSETS],
    l: &[[f64; N_ASSETS]; N_ASSETS],
    n: usize,
) -> RateSeries {
    let normal = StandardNormal;
    (0..n)
        .map(|_| {
            let z: [f64; N_ASSETS] = std::array::from_fn(|_| normal.sample(rng));
            std::array::from_fn(|a| {
                means[a] + (0..=a).map(|b| l[a][b] * z[b]).sum::<f64>()
            })
        })
        .collect()
}

/// Metadata describing one rate model for discovery by outer layers.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub method: &'static str,
    pub description: &'static str,
    pub required_parameters: &'static [&'static str],
    pub optional_parameters: &'static [&'static str],
    pub deterministic: bool,
    pub constant: bool,
}

/// Registry of the built-in rate models.
pub fn model_registry() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            method: "default",
            description: "30-year trailing historical average deterministic rates.",
            required_parameters: &[],
            optional_parameters: &[],
            deterministic: true,
            constant: true,
        },
        ModelInfo {
            method: "optimistic",
            description: "Optimistic fixed rates based on industry forecasts.",
            required_parameters: &[],
            optional_parameters: &[],
            deterministic: true,
            constant: true,
        },
        ModelInfo {
            method: "conservative",
            description: "Conservative fixed rate assumptions.",
            required_parameters: &[],
            optional_parameters: &[],
            deterministic: true,
            constant: true,
        },
        ModelInfo {
            method: "user",
            description: "User-specified fixed annual rates (percent).",
            required_parameters: &["values"],
            optional_parameters: &[],
            deterministic: true,
            constant: true,
        },
        ModelInfo {
            method: "historical",
            description: "Historical year-by-year returns over the selected range.",
            required_parameters: &["from"],
            optional_parameters: &["to"],
            deterministic: true,
            constant: false,
        },
        ModelInfo {
            method: "historical average",
            description: "Fixed rates equal to the historical average over the selected range.",
            required_parameters: &["from", "to"],
            optional_parameters: &[],
            deterministic: true,
            constant: true,
        },
        ModelInfo {
            method: "stochastic",
            description: "Multivariate normal model from user means and volatilities.",
            required_parameters: &["values", "standard_deviations"],
            optional_parameters: &["correlations", "rate_seed"],
            deterministic: false,
            constant: false,
        },
        ModelInfo {
            method: "histochastic",
            description: "Multivariate normal model fitted to a historical range.",
            required_parameters: &["from", "to"],
            optional_parameters: &["rate_seed"],
            deterministic: false,
            constant: false,
        },
        ModelInfo {
            method: "bootstrap_sor",
            description: "Historical bootstrap for sequence-of-returns analysis.",
            required_parameters: &["from", "to"],
            optional_parameters: &["bootstrap_type", "block_size", "crisis_years", "crisis_weight"],
            deterministic: false,
            constant: false,
        },
        ModelInfo {
            method: "tabular",
            description: "Time-indexed rates supplied as a table.",
            required_parameters: &["rows"],
            optional_parameters: &[],
            deterministic: true,
            constant: false,
        },
    ]
}
