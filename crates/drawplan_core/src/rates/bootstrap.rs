//! Bootstrap sequence-of-returns sampling over a historical window.
//!
//! Four variants: i.i.d., moving (overlapping) block, circular block,
//! and stationary (Politis-Romano). Crisis years may be overweighted in
//! the sampling distribution; weights are renormalized.

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::rates::N_ASSETS;
use crate::rates::historical;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapVariant {
    #[default]
    Iid,
    Block,
    Circular,
    Stationary,
}

impl BootstrapVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapVariant::Iid => "iid",
            BootstrapVariant::Block => "block",
            BootstrapVariant::Circular => "circular",
            BootstrapVariant::Stationary => "stationary",
        }
    }
}

/// A historical window prepared for bootstrap sampling.
#[derive(Debug, Clone)]
pub struct BootstrapWindow {
    data: Vec<[f64; N_ASSETS]>,
    weights: Option<Vec<f64>>,
    variant: BootstrapVariant,
    block_size: usize,
}

impl BootstrapWindow {
    pub fn new(
        frm: i32,
        to: i32,
        variant: BootstrapVariant,
        block_size: usize,
        crisis_years: &[i32],
        crisis_weight: f64,
    ) -> Result<Self> {
        const MODEL: &str = "bootstrap_sor";
        let (lo, hi) = historical::window(MODEL, frm, to)?;
        if block_size < 1 {
            return Err(PlanError::RateModel {
                model: MODEL,
                message: "block_size must be >= 1".to_string(),
            });
        }
        let data: Vec<[f64; N_ASSETS]> = (lo..=hi).map(historical::rate_row).collect();
        if matches!(variant, BootstrapVariant::Block) && block_size > data.len() {
            return Err(PlanError::RateModel {
                model: MODEL,
                message: "block_size larger than available historical window".to_string(),
            });
        }

        let weights = if crisis_years.is_empty() || crisis_weight == 1.0 {
            None
        } else {
            let mut w = vec![1.0; data.len()];
            for (idx, year) in (frm..=to).enumerate() {
                if crisis_years.contains(&year) {
                    w[idx] *= crisis_weight;
                }
            }
            for v in w.iter_mut() {
                *v = v.max(0.0);
            }
            let total: f64 = w.iter().sum();
            if total <= 0.0 {
                return Err(PlanError::RateModel {
                    model: MODEL,
                    message: "crisis weighting produced zero probability mass".to_string(),
                });
            }
            for v in w.iter_mut() {
                *v /= total;
            }
            Some(w)
        };

        Ok(BootstrapWindow {
            data,
            weights,
            variant,
            block_size,
        })
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<[f64; N_ASSETS]> {
        match self.variant {
            BootstrapVariant::Iid => self.iid(rng, n),
            BootstrapVariant::Block => self.block(rng, n),
            BootstrapVariant::Circular => self.circular(rng, n),
            BootstrapVariant::Stationary => self.stationary(rng, n),
        }
    }

    /// Draw one index, uniformly or by the crisis weights, from the
    /// first `limit` window positions.
    fn choice<R: Rng + ?Sized>(&self, rng: &mut R, limit: usize) -> usize {
        match &self.weights {
            None => rng.random_range(0..limit),
            Some(w) => {
                // WeightedIndex rejects an all-zero prefix; the window
                // constructor guarantees positive mass.
                let dist = WeightedIndex::new(&w[..limit]).expect("positive sampling weights");
                dist.sample(rng)
            }
        }
    }

    fn iid<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<[f64; N_ASSETS]> {
        (0..n).map(|_| self.data[self.choice(rng, self.data.len())]).collect()
    }

    fn block<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<[f64; N_ASSETS]> {
        let max_start = self.data.len() - self.block_size + 1;
        let mut series = Vec::with_capacity(n + self.block_size);
        while series.len() < n {
            let start = self.choice(rng, max_start);
            series.extend_from_slice(&self.data[start..start + self.block_size]);
        }
        series.truncate(n);
        series
    }

    fn circular<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<[f64; N_ASSETS]> {
        let len = self.data.len();
        let mut series = Vec::with_capacity(n + self.block_size);
        while series.len() < n {
            let start = self.choice(rng, len);
            for i in 0..self.block_size {
                series.push(self.data[(start + i) % len]);
            }
        }
        series.truncate(n);
        series
    }

    fn stationary<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<[f64; N_ASSETS]> {
        let len = self.data.len();
        let p = 1.0 / self.block_size as f64;
        let mut series = Vec::with_capacity(n);
        let mut idx = self.choice(rng, len);
        for _ in 0..n {
            series.push(self.data[idx]);
            if rng.random::<f64>() < p {
                idx = self.choice(rng, len);
            } else {
                idx = (idx + 1) % len;
            }
        }
        series
    }
}
