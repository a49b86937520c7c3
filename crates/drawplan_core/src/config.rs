//! Case configuration tree.
//!
//! Mirrors the on-disk key/value layout section for section. Monetary
//! amounts in the tree are thousands of dollars; the plan API uses
//! dollars. Unknown top-level sections are carried through unchanged so
//! a round trip never loses them. Parsing the container format itself
//! (TOML or similar) happens outside this crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocation::{AllocationRatios, InterpolationMethod};
use crate::error::{PlanError, Result};
use crate::plan::{MedicareMode, Objective, Plan, SolveOptions, SsTaxability};
use crate::rates::{BootstrapVariant, CorrelationSpec, N_ASSETS, RateModel};
use crate::spending::{ProfileKind, SmileParams};

const KILO: f64 = 1_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub case_name: String,
    #[serde(default)]
    pub description: String,
    pub basic_info: BasicInfo,
    #[serde(default)]
    pub savings_assets: SavingsAssets,
    #[serde(default)]
    pub household_financial_profile: HouseholdFinancialProfile,
    #[serde(default)]
    pub fixed_income: FixedIncome,
    #[serde(default)]
    pub rates_selection: RatesSelection,
    #[serde(default)]
    pub asset_allocation: AssetAllocation,
    #[serde(default)]
    pub optimization_parameters: OptimizationParameters,
    #[serde(default)]
    pub solver_options: SolverOptionsSection,
    /// Unrecognized top-level sections, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub status: String,
    pub names: Vec<String>,
    pub date_of_birth: Vec<String>,
    pub life_expectancy: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsAssets {
    #[serde(default)]
    pub taxable_savings_balances: Vec<f64>,
    #[serde(default)]
    pub tax_deferred_savings_balances: Vec<f64>,
    #[serde(default)]
    pub tax_free_savings_balances: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary_fractions: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spousal_surplus_deposit_fraction: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HouseholdFinancialProfile {
    #[serde(rename = "HFP_file_name", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedIncome {
    #[serde(default)]
    pub pension_monthly_amounts: Vec<f64>,
    #[serde(default)]
    pub pension_ages: Vec<f64>,
    #[serde(default)]
    pub pension_indexed: Vec<bool>,
    #[serde(default)]
    pub social_security_pia_amounts: Vec<f64>,
    #[serde(default)]
    pub social_security_ages: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatesSelection {
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<i32>,
    /// Fixed or mean rates, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<[f64; N_ASSETS]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_deviations: Option<[f64; N_ASSETS]>,
    /// Full 4x4 matrix or six upper-triangle coefficients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlations: Option<CorrelationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reproducible_rates: Option<bool>,
    #[serde(default)]
    pub reverse_sequence: bool,
    #[serde(default)]
    pub roll_sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_type: Option<BootstrapVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis_years: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis_weight: Option<f64>,
    /// Percent of the tax-deferred estate lost to heirs' income tax.
    #[serde(default = "default_heirs_rate")]
    pub heirs_rate_on_tax_deferred_estate: f64,
    /// Dividend yield on taxable stocks, percent.
    #[serde(default = "default_dividend_rate")]
    pub dividend_rate: f64,
    #[serde(default = "default_obbba_year")]
    pub obbba_expiration_year: i32,
}

fn default_heirs_rate() -> f64 {
    30.0
}

fn default_dividend_rate() -> f64 {
    1.8
}

fn default_obbba_year() -> i32 {
    2032
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation_method: Option<InterpolationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation_center: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation_width: Option<f64>,
    /// Allocation mode: `individual`, `account`, or `spouses`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub allocation_type: Option<String>,
    /// Initial/final allocation pairs, shaped per the mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<Value>,
}

impl AssetAllocation {
    /// Decode the `type`/`generic` pair into allocation ratios.
    pub fn ratios(&self) -> Result<Option<AllocationRatios>> {
        let (Some(kind), Some(generic)) = (&self.allocation_type, &self.generic) else {
            return Ok(None);
        };
        let decode_error = |e: serde_json::Error| PlanError::Config {
            key: "asset_allocation.generic".to_string(),
            message: e.to_string(),
        };
        let ratios = match kind.as_str() {
            "individual" => AllocationRatios::Individual(
                serde_json::from_value(generic.clone()).map_err(decode_error)?,
            ),
            "account" => AllocationRatios::Account(
                serde_json::from_value(generic.clone()).map_err(decode_error)?,
            ),
            "spouses" => AllocationRatios::Spouses(
                serde_json::from_value(generic.clone()).map_err(decode_error)?,
            ),
            other => {
                return Err(PlanError::Config {
                    key: "asset_allocation.type".to_string(),
                    message: format!("unknown allocation type '{other}'"),
                });
            }
        };
        Ok(Some(ratios))
    }

    fn set_ratios(&mut self, ratios: &AllocationRatios) {
        let (kind, generic) = match ratios {
            AllocationRatios::Individual(pairs) => {
                ("individual", serde_json::to_value(pairs))
            }
            AllocationRatios::Account(pairs) => ("account", serde_json::to_value(pairs)),
            AllocationRatios::Spouses(pair) => ("spouses", serde_json::to_value(pair)),
        };
        self.allocation_type = Some(kind.to_string());
        self.generic = generic.ok();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameters {
    pub spending_profile: ProfileKind,
    pub surviving_spouse_spending_percent: f64,
    #[serde(default = "default_smile_dip")]
    pub smile_dip: f64,
    #[serde(default = "default_smile_increase")]
    pub smile_increase: f64,
    #[serde(default)]
    pub smile_delay: usize,
    pub objective: Objective,
}

fn default_smile_dip() -> f64 {
    15.0
}

fn default_smile_increase() -> f64 {
    12.0
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        OptimizationParameters {
            spending_profile: ProfileKind::Flat,
            surviving_spouse_spending_percent: 60.0,
            smile_dip: default_smile_dip(),
            smile_increase: default_smile_increase(),
            smile_delay: 0,
            objective: Objective::MaxSpending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverOptionsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_roth_conversion: Option<f64>,
    #[serde(default)]
    pub no_roth_conversions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_roth_conversions: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_medicare: Option<MedicareMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_s_c_loop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bequest: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_spending: Option<f64>,
    #[serde(rename = "previousMAGIs", default, skip_serializing_if = "Option::is_none")]
    pub previous_magis: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    #[serde(default)]
    pub xor_constraints: bool,
    #[serde(default)]
    pub spending_slack: f64,
    /// Fixed taxable fraction of Social Security; absent means the
    /// self-consistent computation.
    #[serde(rename = "withSSTaxability", default, skip_serializing_if = "Option::is_none")]
    pub with_ss_taxability: Option<f64>,
}

impl Config {
    /// Build a fresh plan from the configuration.
    pub fn build_plan(&self) -> Result<Plan> {
        let info = &self.basic_info;
        let expected = match info.status.as_str() {
            "single" => 1,
            "married" => 2,
            other => {
                return Err(PlanError::Config {
                    key: "basic_info.status".to_string(),
                    message: format!("'{other}' is not 'single' or 'married'"),
                });
            }
        };
        if info.names.len() != expected {
            return Err(PlanError::Config {
                key: "basic_info.names".to_string(),
                message: format!("status '{}' expects {} name(s)", info.status, expected),
            });
        }

        let names: Vec<&str> = info.names.iter().map(String::as_str).collect();
        let dobs: Vec<&str> = info.date_of_birth.iter().map(String::as_str).collect();
        let mut plan = Plan::new(&names, &dobs, &info.life_expectancy, &self.case_name)?;
        plan.set_description(&self.description);
        if let Some(start_date) = &info.start_date {
            plan.set_start_date(start_date)?;
        }

        let assets = &self.savings_assets;
        if !assets.taxable_savings_balances.is_empty() {
            let scale = |v: &[f64]| -> Vec<f64> { v.iter().map(|x| x * KILO).collect() };
            plan.set_account_balances(
                &scale(&assets.taxable_savings_balances),
                &scale(&assets.tax_deferred_savings_balances),
                &scale(&assets.tax_free_savings_balances),
            )?;
        }
        if let Some(fractions) = assets.beneficiary_fractions {
            plan.set_beneficiary_fractions(fractions)?;
        }
        if let Some(eta) = assets.spousal_surplus_deposit_fraction {
            plan.set_surplus_fraction(eta)?;
        }

        let fixed = &self.fixed_income;
        if !fixed.pension_monthly_amounts.is_empty() {
            let indexed = if fixed.pension_indexed.len() == expected {
                fixed.pension_indexed.clone()
            } else {
                vec![false; expected]
            };
            plan.set_pension(&fixed.pension_monthly_amounts, &fixed.pension_ages, &indexed)?;
        }
        if !fixed.social_security_pia_amounts.is_empty() {
            plan.set_social_security(
                &fixed.social_security_pia_amounts,
                &fixed.social_security_ages,
            )?;
        }

        let optimization = &self.optimization_parameters;
        plan.set_spending_profile(
            optimization.spending_profile,
            optimization.surviving_spouse_spending_percent,
        )?;
        plan.set_smile_params(SmileParams {
            dip: optimization.smile_dip,
            increase: optimization.smile_increase,
            delay: optimization.smile_delay,
        });

        let allocation = &self.asset_allocation;
        if let Some(ratios) = allocation.ratios()? {
            plan.set_allocation_ratios(ratios)?;
        }
        plan.set_interpolation(
            allocation
                .interpolation_method
                .unwrap_or(InterpolationMethod::Linear),
            allocation.interpolation_center.unwrap_or(15.0),
            allocation.interpolation_width.unwrap_or(5.0),
        )?;

        let rates = &self.rates_selection;
        plan.set_heirs_tax_rate(rates.heirs_rate_on_tax_deferred_estate)?;
        plan.set_dividend_rate(rates.dividend_rate)?;
        plan.set_obbba_year(rates.obbba_expiration_year);
        if let Some(reproducible) = rates.reproducible_rates {
            plan.set_reproducible(reproducible);
        }
        plan.set_rate_transforms(rates.reverse_sequence, rates.roll_sequence)?;
        if let Some(model) = self.rate_model()? {
            plan.set_rates(model, rates.rate_seed)?;
        }

        Ok(plan)
    }

    /// Rebuild the rate model described by the `rates_selection` section.
    pub fn rate_model(&self) -> Result<Option<RateModel>> {
        let rs = &self.rates_selection;
        let need_range = |key: &str, default_to: Option<i32>| -> Result<(i32, i32)> {
            match (rs.from, rs.to.or(default_to)) {
                (Some(frm), Some(to)) => Ok((frm, to)),
                (Some(_), None) => Err(PlanError::Config {
                    key: format!("rates_selection.{key}"),
                    message: "missing 'to' year".to_string(),
                }),
                _ => Err(PlanError::Config {
                    key: format!("rates_selection.{key}"),
                    message: "missing 'from' year".to_string(),
                }),
            }
        };
        let model = match rs.method.as_str() {
            "" => return Ok(None),
            "default" => RateModel::Default,
            "optimistic" => RateModel::Optimistic,
            "conservative" => RateModel::Conservative,
            "user" => RateModel::User {
                values: rs.values.ok_or_else(|| PlanError::Config {
                    key: "rates_selection.values".to_string(),
                    message: "required for the user method".to_string(),
                })?,
            },
            // A bare 'from' replays forward to the end of the dataset.
            "historical" => {
                let (frm, to) = need_range("historical", Some(crate::rates::TO))?;
                RateModel::Historical { frm, to }
            }
            "historical average" => {
                let (frm, to) = need_range("historical average", None)?;
                RateModel::HistoricalAverage { frm, to }
            }
            "histochastic" => {
                let (frm, to) = need_range("histochastic", None)?;
                RateModel::Histochastic { frm, to }
            }
            "stochastic" => RateModel::Stochastic {
                values: rs.values.ok_or_else(|| PlanError::Config {
                    key: "rates_selection.values".to_string(),
                    message: "required for the stochastic method".to_string(),
                })?,
                stdev: rs.standard_deviations.ok_or_else(|| PlanError::Config {
                    key: "rates_selection.standard_deviations".to_string(),
                    message: "required for the stochastic method".to_string(),
                })?,
                corr: rs.correlations.clone(),
            },
            "bootstrap_sor" => {
                let (frm, to) = need_range("bootstrap_sor", None)?;
                RateModel::BootstrapSor {
                    frm,
                    to,
                    variant: rs.bootstrap_type.unwrap_or_default(),
                    block_size: rs.block_size.unwrap_or(1),
                    crisis_years: rs.crisis_years.clone().unwrap_or_default(),
                    crisis_weight: rs.crisis_weight.unwrap_or(1.0),
                }
            }
            other => {
                return Err(PlanError::Config {
                    key: "rates_selection.method".to_string(),
                    message: format!("unknown rate method '{other}'"),
                });
            }
        };
        Ok(Some(model))
    }

    /// Solver options from the `solver_options` section, in dollars.
    pub fn solve_options(&self) -> SolveOptions {
        let section = &self.solver_options;
        let mut options = SolveOptions {
            max_roth_conversion: section.max_roth_conversion.map(|v| v * KILO),
            no_roth_conversions: section.no_roth_conversions,
            start_roth_conversions: section.start_roth_conversions,
            bequest: section.bequest.map(|v| v * KILO),
            net_spending: section.net_spending.map(|v| v * KILO),
            xor_constraints: section.xor_constraints,
            spending_slack: section.spending_slack,
            ..SolveOptions::default()
        };
        if let Some(mode) = section.with_medicare {
            options.with_medicare = mode;
        }
        if let Some(with_sc) = section.with_s_c_loop {
            options.with_sc_loop = with_sc;
        }
        if let Some(magis) = section.previous_magis {
            options.previous_magis = [magis[0] * KILO, magis[1] * KILO];
        }
        if let Some(fraction) = section.with_ss_taxability {
            options.ss_taxability = SsTaxability::Fixed(fraction);
        }
        options
    }

    pub fn objective(&self) -> Objective {
        self.optimization_parameters.objective
    }

    /// Snapshot a plan back into a configuration tree.
    pub fn from_plan(plan: &Plan) -> Config {
        let snapshot = plan.inputs_snapshot();
        let n_i = plan.n_individuals();

        let basic_info = BasicInfo {
            status: if n_i == 2 { "married" } else { "single" }.to_string(),
            names: plan.individual_names().to_vec(),
            date_of_birth: snapshot.dobs.iter().map(|d| d.to_string()).collect(),
            life_expectancy: snapshot.expectancy.clone(),
            start_date: snapshot.start_date.clone(),
        };

        let savings_assets = SavingsAssets {
            taxable_savings_balances: snapshot.balances.iter().map(|b| b[0] / KILO).collect(),
            tax_deferred_savings_balances: snapshot.balances.iter().map(|b| b[1] / KILO).collect(),
            tax_free_savings_balances: snapshot.balances.iter().map(|b| b[2] / KILO).collect(),
            beneficiary_fractions: (n_i == 2).then_some(snapshot.beneficiary),
            spousal_surplus_deposit_fraction: (n_i == 2).then_some(snapshot.surplus_fraction),
        };

        let fixed_income = FixedIncome {
            pension_monthly_amounts: snapshot.pension_amounts.clone(),
            pension_ages: snapshot.pension_ages.clone(),
            pension_indexed: snapshot.pension_indexed.clone(),
            social_security_pia_amounts: snapshot.ss_pias.clone(),
            social_security_ages: snapshot.ss_ages.clone(),
        };

        let mut rates_selection = RatesSelection {
            heirs_rate_on_tax_deferred_estate: snapshot.heirs_tax * 100.0,
            dividend_rate: snapshot.dividend_rate * 100.0,
            obbba_expiration_year: snapshot.obbba_year,
            reverse_sequence: plan.rate_reverse(),
            roll_sequence: plan.rate_roll(),
            ..RatesSelection::default()
        };
        if let Some(model) = plan.rate_model() {
            rates_selection.method = model.name().to_string();
            match model {
                RateModel::User { values } => rates_selection.values = Some(*values),
                RateModel::Historical { frm, to }
                | RateModel::HistoricalAverage { frm, to }
                | RateModel::Histochastic { frm, to } => {
                    rates_selection.from = Some(*frm);
                    rates_selection.to = Some(*to);
                }
                RateModel::Stochastic { values, stdev, corr } => {
                    rates_selection.values = Some(*values);
                    rates_selection.standard_deviations = Some(*stdev);
                    rates_selection.correlations = corr.clone();
                }
                RateModel::BootstrapSor {
                    frm,
                    to,
                    variant,
                    block_size,
                    crisis_years,
                    crisis_weight,
                } => {
                    rates_selection.from = Some(*frm);
                    rates_selection.to = Some(*to);
                    rates_selection.bootstrap_type = Some(*variant);
                    rates_selection.block_size = Some(*block_size);
                    rates_selection.crisis_years = Some(crisis_years.clone());
                    rates_selection.crisis_weight = Some(*crisis_weight);
                }
                _ => {}
            }
            if !model.deterministic() {
                rates_selection.rate_seed = plan.rate_seed();
                rates_selection.reproducible_rates = Some(plan.reproducible());
            }
        }

        let mut asset_allocation = AssetAllocation {
            interpolation_method: Some(snapshot.interp_method),
            interpolation_center: Some(snapshot.interp_center),
            interpolation_width: Some(snapshot.interp_width),
            allocation_type: None,
            generic: None,
        };
        if let Some(ratios) = &snapshot.allocation {
            asset_allocation.set_ratios(ratios);
        }

        let optimization_parameters = OptimizationParameters {
            spending_profile: snapshot.profile_kind,
            surviving_spouse_spending_percent: snapshot.survivor_fraction * 100.0,
            smile_dip: snapshot.smile.dip,
            smile_increase: snapshot.smile.increase,
            smile_delay: snapshot.smile.delay,
            objective: plan.objective().unwrap_or(Objective::MaxSpending),
        };

        Config {
            case_name: plan.name().to_string(),
            description: plan.description().to_string(),
            basic_info,
            savings_assets,
            household_financial_profile: HouseholdFinancialProfile {
                file_name: snapshot.hfp_file_name.clone(),
            },
            fixed_income,
            rates_selection,
            asset_allocation,
            optimization_parameters,
            solver_options: SolverOptionsSection::default(),
            extra: BTreeMap::new(),
        }
    }
}
