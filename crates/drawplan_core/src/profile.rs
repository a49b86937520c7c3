//! Household financial profile ingest.
//!
//! The profile arrives as tables, one per individual, with the wage and
//! contribution columns in nominal dollars, plus optional debt and
//! fixed-asset tables and an optional per-year rates table. Spreadsheet
//! parsing itself lives outside this crate; this module validates the
//! tabular data and aligns it to the plan years.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::rates::N_ASSETS;

/// One individual's wage and contribution rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeList {
    pub years: Vec<i32>,
    pub wages: Vec<f64>,
    pub other_income: Vec<f64>,
    pub taxable_contributions: Vec<f64>,
    pub contributions_401k: Vec<f64>,
    pub contributions_roth_401k: Vec<f64>,
    pub contributions_ira: Vec<f64>,
    pub contributions_roth_ira: Vec<f64>,
    pub roth_conversions: Vec<f64>,
    pub big_ticket_items: Vec<f64>,
}

impl TimeList {
    fn columns(&self) -> [(&'static str, &Vec<f64>, bool); 9] {
        [
            ("anticipated wages", &self.wages, false),
            ("other inc.", &self.other_income, false),
            ("taxable ctrb", &self.taxable_contributions, false),
            ("401k ctrb", &self.contributions_401k, false),
            ("Roth 401k ctrb", &self.contributions_roth_401k, false),
            ("IRA ctrb", &self.contributions_ira, false),
            ("Roth IRA ctrb", &self.contributions_roth_ira, false),
            ("Roth conv", &self.roth_conversions, false),
            // Big-ticket items may be negative (a purchase) or positive
            // (a sale).
            ("big-ticket items", &self.big_ticket_items, true),
        ]
    }

    /// Check column lengths against the year column and reject negative
    /// values everywhere except big-ticket items.
    pub fn validate(&self, who: &str) -> Result<()> {
        for (name, column, allow_negative) in self.columns() {
            if column.len() != self.years.len() {
                return Err(PlanError::Profile {
                    message: format!(
                        "{who}: column '{name}' has {} rows, expected {}",
                        column.len(),
                        self.years.len()
                    ),
                });
            }
            if !allow_negative {
                if let Some(v) = column.iter().find(|&&v| v < 0.0) {
                    return Err(PlanError::Profile {
                        message: format!("{who}: negative value {v} in column '{name}'"),
                    });
                }
            }
        }
        Ok(())
    }

    fn value_for_year(column: &[f64], years: &[i32], year: i32) -> f64 {
        years
            .iter()
            .position(|&y| y == year)
            .map_or(0.0, |idx| column[idx])
    }
}

/// A time list aligned to plan years: index `n` is plan year `n`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedTimeList {
    pub wages: Vec<f64>,
    pub other_income: Vec<f64>,
    pub taxable_contributions: Vec<f64>,
    pub contributions_401k: Vec<f64>,
    pub contributions_roth_401k: Vec<f64>,
    pub contributions_ira: Vec<f64>,
    pub contributions_roth_ira: Vec<f64>,
    pub roth_conversions: Vec<f64>,
    pub big_ticket_items: Vec<f64>,
}

impl AlignedTimeList {
    pub fn zeros(n_n: usize) -> Self {
        AlignedTimeList {
            wages: vec![0.0; n_n],
            other_income: vec![0.0; n_n],
            taxable_contributions: vec![0.0; n_n],
            contributions_401k: vec![0.0; n_n],
            contributions_roth_401k: vec![0.0; n_n],
            contributions_ira: vec![0.0; n_n],
            contributions_roth_ira: vec![0.0; n_n],
            roth_conversions: vec![0.0; n_n],
            big_ticket_items: vec![0.0; n_n],
        }
    }

    /// Align a validated time list to `[this_year, this_year + n_n)`.
    /// Years outside the plan window are ignored; missing years read as
    /// zero (a household can simply stop contributing).
    pub fn from_time_list(list: &TimeList, this_year: i32, n_n: usize) -> Self {
        let mut aligned = AlignedTimeList::zeros(n_n);
        for n in 0..n_n {
            let year = this_year + n as i32;
            let years = &list.years;
            aligned.wages[n] = TimeList::value_for_year(&list.wages, years, year);
            aligned.other_income[n] = TimeList::value_for_year(&list.other_income, years, year);
            aligned.taxable_contributions[n] =
                TimeList::value_for_year(&list.taxable_contributions, years, year);
            aligned.contributions_401k[n] =
                TimeList::value_for_year(&list.contributions_401k, years, year);
            aligned.contributions_roth_401k[n] =
                TimeList::value_for_year(&list.contributions_roth_401k, years, year);
            aligned.contributions_ira[n] =
                TimeList::value_for_year(&list.contributions_ira, years, year);
            aligned.contributions_roth_ira[n] =
                TimeList::value_for_year(&list.contributions_roth_ira, years, year);
            aligned.roth_conversions[n] =
                TimeList::value_for_year(&list.roth_conversions, years, year);
            aligned.big_ticket_items[n] =
                TimeList::value_for_year(&list.big_ticket_items, years, year);
        }
        aligned
    }
}

/// Debt kinds supported by the Debts table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtKind {
    Mortgage,
    Loan,
    Other,
}

/// One row of the Debts table. Payments amortize over the term at the
/// stated annual rate, starting in `year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub active: bool,
    pub name: String,
    pub kind: DebtKind,
    pub year: i32,
    pub term: u32,
    pub amount: f64,
    pub rate: f64,
}

impl Debt {
    /// Level annual payment for the amortized principal.
    pub fn annual_payment(&self) -> f64 {
        if self.term == 0 {
            return self.amount;
        }
        let r = self.rate;
        if r == 0.0 {
            return self.amount / self.term as f64;
        }
        let factor = (1.0 + r).powi(self.term as i32);
        self.amount * r * factor / (factor - 1.0)
    }
}

/// Fixed-asset kinds supported by the Fixed Assets table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedAssetKind {
    Residence,
    Property,
    Other,
}

/// One row of the Fixed Assets table: an illiquid asset sold in `year`
/// of disposition, appreciating at `rate` from the plan start, with a
/// sale commission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedAsset {
    pub active: bool,
    pub name: String,
    pub kind: FixedAssetKind,
    pub year_of_disposition: i32,
    pub basis: f64,
    pub value: f64,
    pub rate: f64,
    pub commission: f64,
}

impl FixedAsset {
    /// Net sale proceeds in the year of disposition.
    pub fn net_proceeds(&self, this_year: i32) -> f64 {
        let years = (self.year_of_disposition - this_year).max(0);
        let gross = self.value * (1.0 + self.rate).powi(years);
        gross * (1.0 - self.commission)
    }
}

/// The full household financial profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HouseholdProfile {
    pub individuals: Vec<TimeList>,
    #[serde(default)]
    pub debts: Vec<Debt>,
    #[serde(default)]
    pub fixed_assets: Vec<FixedAsset>,
    /// Optional per-year rates table feeding the `tabular` rate model.
    #[serde(default)]
    pub rates: Option<RatesTable>,
}

impl HouseholdProfile {
    pub fn validate(&self, names: &[String]) -> Result<()> {
        if self.individuals.len() != names.len() {
            return Err(PlanError::Profile {
                message: format!(
                    "expected {} individual sheets, found {}",
                    names.len(),
                    self.individuals.len()
                ),
            });
        }
        for (list, name) in self.individuals.iter().zip(names) {
            list.validate(name)?;
        }
        Ok(())
    }

    /// Net big-ticket flow per plan year from the debt and fixed-asset
    /// tables: sale proceeds in, amortized payments out.
    pub fn asset_debt_flows(&self, this_year: i32, n_n: usize) -> Vec<f64> {
        let mut flows = vec![0.0; n_n];
        for debt in self.debts.iter().filter(|d| d.active) {
            let payment = debt.annual_payment();
            for n in 0..n_n {
                let year = this_year + n as i32;
                if year >= debt.year && year < debt.year + debt.term as i32 {
                    flows[n] -= payment;
                }
            }
        }
        for asset in self.fixed_assets.iter().filter(|a| a.active) {
            let n = asset.year_of_disposition - this_year;
            if (0..n_n as i32).contains(&n) {
                flows[n as usize] += asset.net_proceeds(this_year);
            }
        }
        flows
    }
}

/// A user-supplied per-year rates table covering the plan span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatesTable {
    pub years: Vec<i32>,
    /// Rows aligned with `years`; percent values are auto-coerced by the
    /// tabular rate model.
    pub rates: Vec<[f64; N_ASSETS]>,
}

impl RatesTable {
    /// Extract the rows covering `[this_year, this_year + n_n]`
    /// inclusive, in order. Missing years fail with the full list.
    pub fn window(&self, this_year: i32, n_n: usize) -> Result<Vec<[f64; N_ASSETS]>> {
        if self.rates.len() != self.years.len() {
            return Err(PlanError::Profile {
                message: format!(
                    "rates table has {} rows for {} years",
                    self.rates.len(),
                    self.years.len()
                ),
            });
        }
        let mut rows = Vec::with_capacity(n_n + 1);
        let mut missing = Vec::new();
        for year in this_year..=this_year + n_n as i32 {
            match self.years.iter().position(|&y| y == year) {
                Some(idx) => rows.push(self.rates[idx]),
                None => missing.push(year),
            }
        }
        if !missing.is_empty() {
            let listed: Vec<String> = missing.iter().map(|y| y.to_string()).collect();
            return Err(PlanError::Profile {
                message: format!("rates table is missing years: {}", listed.join(", ")),
            });
        }
        Ok(rows)
    }
}
