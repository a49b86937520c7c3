//! The plan orchestrator.
//!
//! A [`Plan`] owns every input (demographics, balances, contribution
//! lists, fixed income, rate model, allocation, spending profile),
//! drives the self-consistent solve against an external MILP solver,
//! holds the structured result, and exposes the batch operations over
//! historical start years and Monte Carlo draws.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::allocation::{AllocationRatios, AlphaSeries, InterpolationMethod, interpolate};
use crate::error::{CaseStatus, PlanError, Result, SolverFailure};
use crate::medicare;
use crate::milp::builder::{LpInputs, N_ACCOUNTS, build_problem};
use crate::milp::{MilpSolver, SolverStatus};
use crate::pension;
use crate::profile::{AlignedTimeList, HouseholdProfile};
use crate::rates::{
    N_ASSETS, RateGenerator, RateModel, RateSeries, RateSource, historical,
};
use crate::results::{PlanResult, aggregate};
use crate::rmd;
use crate::scloop::{ConvergenceType, ScState, SnapshotHistory, converged};
use crate::social_security as ss;
use crate::spending::{ProfileKind, SmileParams, spending_profile};
use crate::tax;
use crate::utils::dollars;
use crate::varmap::VarMap;

/// Optimization objective for one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Objective {
    MaxSpending,
    MaxBequest,
}

/// How Medicare premiums are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicareMode {
    /// Medicare is ignored entirely.
    None,
    /// Premiums are recomputed between LP solves from lagged MAGI.
    Loop,
    /// Bracket selection is linearized inside the MILP.
    Optimize,
}

/// How the taxable share of Social Security benefits is determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SsTaxability {
    /// A fixed fraction of benefits is taxable.
    Fixed(f64),
    /// The fraction is recomputed between LP solves.
    SelfConsistent,
    /// Provisional-income stacking is linearized inside the MILP.
    Linearized,
}

/// Solver options for one case, mirroring the `solver_options`
/// configuration section. Dollar amounts are in start-year dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    pub max_roth_conversion: Option<f64>,
    pub no_roth_conversions: bool,
    /// Exclude one individual from conversions.
    pub exclude_roth_for: Option<usize>,
    /// Calendar year before which conversions are gated off.
    pub start_roth_conversions: Option<i32>,
    pub with_medicare: MedicareMode,
    pub with_sc_loop: bool,
    /// Bequest floor under `MaxSpending`.
    pub bequest: Option<f64>,
    /// Net-spending target under `MaxBequest`.
    pub net_spending: Option<f64>,
    /// Household MAGI for the two years preceding the plan start.
    pub previous_magis: [f64; 2],
    pub ss_taxability: SsTaxability,
    pub xor_constraints: bool,
    /// Spending-profile slack, percent of the target (0 to 50).
    pub spending_slack: f64,
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub max_iterations: usize,
    /// Damping weight on the previous iterate; 0 means full replacement.
    pub sc_damping: f64,
    /// Damping weight applied after oscillation is detected; 0 breaks
    /// the loop instead.
    pub sc_damping_on_osc: f64,
    /// Wall-clock budget for one plan's solve.
    #[serde(skip)]
    pub time_budget: Option<Duration>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            max_roth_conversion: None,
            no_roth_conversions: false,
            exclude_roth_for: None,
            start_roth_conversions: None,
            with_medicare: MedicareMode::Loop,
            with_sc_loop: true,
            bequest: None,
            net_spending: None,
            previous_magis: [0.0; 2],
            ss_taxability: SsTaxability::SelfConsistent,
            xor_constraints: false,
            spending_slack: 0.0,
            abs_tol: 1.0,
            rel_tol: 1.0e-3,
            max_iterations: 32,
            sc_damping: 0.0,
            sc_damping_on_osc: 0.5,
            time_budget: None,
        }
    }
}

impl SolveOptions {
    fn validate(&self) -> Result<()> {
        if !(0.0..=50.0).contains(&self.spending_slack) {
            return Err(PlanError::Input {
                field: "spending_slack",
                message: "must be between 0 and 50 percent".to_string(),
            });
        }
        if let SsTaxability::Fixed(fraction) = self.ss_taxability {
            if !(0.0..=0.85).contains(&fraction) {
                return Err(PlanError::Input {
                    field: "ss_taxability",
                    message: "fixed fraction must be in [0, 0.85]".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation token for batch operations, polled between
/// LP builds, solves, and loop iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-iteration progress callback: (iteration, objective value).
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, f64) + Sync);

/// One solved case in a batch distribution.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRun {
    /// Historical start year or Monte Carlo seed, for order-independent
    /// identification.
    pub tag: i64,
    pub basis: f64,
    pub partial_bequest: f64,
    pub bequest: f64,
}

/// Collected outcome of a batch operation. The distribution is
/// order-agnostic; runs carry their own tags.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub runs: Vec<BatchRun>,
    pub attempted: usize,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.runs.len()
    }
}

#[derive(Clone)]
enum RateSourceKind {
    Builtin(RateGenerator),
    Plugin(Arc<Mutex<dyn RateSource>>),
}

/// The plan: all inputs, the rate state, and the latest results.
#[derive(Clone)]
pub struct Plan {
    name: String,
    description: String,
    inames: Vec<String>,
    dobs: Vec<Date>,
    expectancy: Vec<i32>,
    start_date: Option<String>,
    this_year: i32,

    n_i: usize,
    n_n: usize,
    n_d: usize,
    i_d: usize,
    horizons: Vec<usize>,
    yobs: Vec<i32>,
    mobs: Vec<i32>,

    balances: Vec<[f64; N_ACCOUNTS]>,
    beneficiary: [f64; N_ACCOUNTS],
    surplus_fraction: f64,
    dividend_rate: f64,
    heirs_tax: f64,
    obbba_year: i32,

    profile_kind: ProfileKind,
    smile: SmileParams,
    survivor_fraction: f64,

    allocation: Option<AllocationRatios>,
    interp_method: InterpolationMethod,
    interp_center: f64,
    interp_width: f64,

    pension_amounts: Vec<f64>,
    pension_ages: Vec<f64>,
    pension_indexed: Vec<bool>,
    ss_pias: Vec<f64>,
    ss_ages: Vec<f64>,

    hfp: Option<HouseholdProfile>,
    hfp_file_name: Option<String>,
    lists: Vec<AlignedTimeList>,
    asset_debt_flows: Vec<f64>,
    roth_history: Vec<[f64; 5]>,

    rates: Option<RateSourceKind>,
    reproducible: bool,
    rate_reverse: bool,
    rate_roll: i64,
    tau: Option<RateSeries>,
    gamma: Vec<f64>,

    objective: Option<Objective>,
    case_status: CaseStatus,
    convergence: ConvergenceType,
    result: Option<PlanResult>,
}

impl Plan {
    /// Create a plan for one or two individuals.
    ///
    /// `dobs` are ISO `YYYY-MM-DD` birth dates; `expectancy` is the
    /// expected age at death. The horizon ends in the year each
    /// individual reaches that age.
    pub fn new(
        inames: &[&str],
        dobs: &[&str],
        expectancy: &[i32],
        name: &str,
    ) -> Result<Plan> {
        let this_year = jiff::Zoned::now().date().year() as i32;
        Plan::with_start_year(inames, dobs, expectancy, name, this_year)
    }

    /// Like [`Plan::new`] with an explicit current year, for
    /// deterministic construction in tests and replays.
    pub fn with_start_year(
        inames: &[&str],
        dobs: &[&str],
        expectancy: &[i32],
        name: &str,
        this_year: i32,
    ) -> Result<Plan> {
        let n_i = inames.len();
        if n_i == 0 || n_i > 2 {
            return Err(PlanError::Input {
                field: "names",
                message: format!("expected 1 or 2 individuals, got {n_i}"),
            });
        }
        if dobs.len() != n_i || expectancy.len() != n_i {
            return Err(PlanError::Input {
                field: "date_of_birth",
                message: "names, dates of birth, and life expectancies must align".to_string(),
            });
        }

        let mut dates = Vec::with_capacity(n_i);
        for dob in dobs {
            let date: Date = dob.parse().map_err(|e| PlanError::Input {
                field: "date_of_birth",
                message: format!("'{dob}' is not an ISO date: {e}"),
            })?;
            dates.push(date);
        }
        let yobs: Vec<i32> = dates.iter().map(|d| d.year() as i32).collect();
        let mobs: Vec<i32> = dates.iter().map(|d| d.month() as i32).collect();

        let mut horizons = Vec::with_capacity(n_i);
        for i in 0..n_i {
            let span = yobs[i] + expectancy[i] - this_year + 1;
            if span < 1 {
                return Err(PlanError::Input {
                    field: "life_expectancy",
                    message: format!(
                        "{}'s life expectancy of {} ends before the plan starts",
                        inames[i], expectancy[i]
                    ),
                });
            }
            horizons.push(span as usize);
        }
        let n_n = *horizons.iter().max().unwrap();
        let (n_d, i_d) = if n_i == 2 && horizons[0] != horizons[1] {
            let i_d = if horizons[0] < horizons[1] { 0 } else { 1 };
            (horizons[i_d], i_d)
        } else {
            (n_n, 0)
        };

        info!(name, n_i, n_n, "created plan");

        Ok(Plan {
            name: name.to_string(),
            description: String::new(),
            inames: inames.iter().map(|s| s.to_string()).collect(),
            dobs: dates,
            expectancy: expectancy.to_vec(),
            start_date: None,
            this_year,
            n_i,
            n_n,
            n_d,
            i_d,
            horizons,
            yobs,
            mobs,
            balances: vec![[0.0; N_ACCOUNTS]; n_i],
            beneficiary: [1.0; N_ACCOUNTS],
            surplus_fraction: 0.5,
            dividend_rate: 0.018,
            heirs_tax: 0.30,
            obbba_year: (this_year).max(2032),
            profile_kind: ProfileKind::Flat,
            smile: SmileParams::default(),
            survivor_fraction: 0.6,
            allocation: None,
            interp_method: InterpolationMethod::Linear,
            interp_center: 15.0,
            interp_width: 5.0,
            pension_amounts: vec![0.0; n_i],
            pension_ages: vec![65.0; n_i],
            pension_indexed: vec![false; n_i],
            ss_pias: vec![0.0; n_i],
            ss_ages: vec![67.0; n_i],
            hfp: None,
            hfp_file_name: None,
            lists: vec![AlignedTimeList::zeros(n_n); n_i],
            asset_debt_flows: vec![0.0; n_n],
            roth_history: vec![[0.0; 5]; n_i],
            rates: None,
            reproducible: true,
            rate_reverse: false,
            rate_roll: 0,
            tau: None,
            gamma: Vec::new(),
            objective: None,
            case_status: CaseStatus::Unsolved,
            convergence: ConvergenceType::SingleSolve,
            result: None,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn individual_names(&self) -> &[String] {
        &self.inames
    }

    pub fn n_individuals(&self) -> usize {
        self.n_i
    }

    pub fn horizon(&self) -> usize {
        self.n_n
    }

    pub fn this_year(&self) -> i32 {
        self.this_year
    }

    pub fn case_status(&self) -> CaseStatus {
        self.case_status
    }

    /// Objective of the last (or current) solve, if any.
    pub fn objective(&self) -> Option<Objective> {
        self.objective
    }

    pub fn convergence(&self) -> ConvergenceType {
        self.convergence
    }

    pub fn result(&self) -> Option<&PlanResult> {
        self.result.as_ref()
    }

    /// Orchestrator-level exit status, folding the convergence type into
    /// the case status.
    pub fn exit_status(&self) -> &'static str {
        match (self.case_status, self.convergence) {
            (CaseStatus::Solved, ConvergenceType::Oscillatory(_)) => "oscillatory",
            (CaseStatus::Solved, ConvergenceType::MaxIteration) => "max_iteration",
            (status, _) => status.as_str(),
        }
    }

    /// Rate series used by the last generate, per year.
    pub fn rate_series(&self) -> Option<&RateSeries> {
        self.tau.as_ref()
    }

    pub fn cumulative_inflation(&self) -> &[f64] {
        &self.gamma
    }

    pub fn rate_reverse(&self) -> bool {
        self.rate_reverse
    }

    pub fn rate_roll(&self) -> i64 {
        self.rate_roll
    }

    pub fn rate_model(&self) -> Option<&RateModel> {
        match &self.rates {
            Some(RateSourceKind::Builtin(generator)) => Some(generator.model()),
            _ => None,
        }
    }

    pub fn rate_seed(&self) -> Option<u64> {
        match &self.rates {
            Some(RateSourceKind::Builtin(generator)) => generator.seed(),
            _ => None,
        }
    }

    pub fn reproducible(&self) -> bool {
        self.reproducible
    }

    pub(crate) fn inputs_snapshot(&self) -> PlanInputsSnapshot {
        PlanInputsSnapshot {
            dobs: self.dobs.clone(),
            expectancy: self.expectancy.clone(),
            start_date: self.start_date.clone(),
            balances: self.balances.clone(),
            beneficiary: self.beneficiary,
            surplus_fraction: self.surplus_fraction,
            dividend_rate: self.dividend_rate,
            heirs_tax: self.heirs_tax,
            obbba_year: self.obbba_year,
            profile_kind: self.profile_kind,
            smile: self.smile,
            survivor_fraction: self.survivor_fraction,
            allocation: self.allocation.clone(),
            interp_method: self.interp_method,
            interp_center: self.interp_center,
            interp_width: self.interp_width,
            pension_amounts: self.pension_amounts.clone(),
            pension_ages: self.pension_ages.clone(),
            pension_indexed: self.pension_indexed.clone(),
            ss_pias: self.ss_pias.clone(),
            ss_ages: self.ss_ages.clone(),
            hfp_file_name: self.hfp_file_name.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    /// Plan start date within the current year, `MM-DD`.
    pub fn set_start_date(&mut self, start_date: &str) -> Result<()> {
        let parts: Vec<&str> = start_date.split('-').collect();
        let valid = match parts.as_slice() {
            [m, d] => {
                m.parse::<u8>().map(|m| (1..=12).contains(&m)).unwrap_or(false)
                    && d.parse::<u8>().map(|d| (1..=31).contains(&d)).unwrap_or(false)
            }
            _ => false,
        };
        if !valid {
            return Err(PlanError::Input {
                field: "start_date",
                message: format!("'{start_date}' is not MM-DD"),
            });
        }
        self.start_date = Some(start_date.to_string());
        Ok(())
    }

    pub fn set_spending_profile(&mut self, kind: ProfileKind, survivor_percent: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&survivor_percent) {
            return Err(PlanError::Input {
                field: "surviving_spouse_spending_percent",
                message: "must be between 0 and 100".to_string(),
            });
        }
        self.profile_kind = kind;
        self.survivor_fraction = survivor_percent / 100.0;
        Ok(())
    }

    pub fn set_smile_params(&mut self, smile: SmileParams) {
        self.smile = smile;
    }

    /// Initial balances per individual, in dollars.
    pub fn set_account_balances(
        &mut self,
        taxable: &[f64],
        tax_deferred: &[f64],
        tax_free: &[f64],
    ) -> Result<()> {
        for (field, column) in [
            ("taxable_savings_balances", taxable),
            ("tax_deferred_savings_balances", tax_deferred),
            ("tax_free_savings_balances", tax_free),
        ] {
            if column.len() != self.n_i {
                return Err(PlanError::Input {
                    field,
                    message: format!("expected {} balances", self.n_i),
                });
            }
            if let Some(v) = column.iter().find(|&&v| v < 0.0) {
                return Err(PlanError::Input {
                    field,
                    message: format!("balance cannot be negative ({})", dollars(*v)),
                });
            }
        }
        for i in 0..self.n_i {
            self.balances[i] = [taxable[i], tax_deferred[i], tax_free[i]];
        }
        Ok(())
    }

    /// Fractions of each account type inherited by the surviving spouse.
    pub fn set_beneficiary_fractions(&mut self, fractions: [f64; N_ACCOUNTS]) -> Result<()> {
        if fractions.iter().any(|&v| !(0.0..=1.0).contains(&v)) {
            return Err(PlanError::Input {
                field: "beneficiary_fractions",
                message: "fractions must be in [0, 1]".to_string(),
            });
        }
        self.beneficiary = fractions;
        Ok(())
    }

    pub fn set_surplus_fraction(&mut self, eta: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&eta) {
            return Err(PlanError::Input {
                field: "spousal_surplus_deposit_fraction",
                message: "must be in [0, 1]".to_string(),
            });
        }
        self.surplus_fraction = eta;
        Ok(())
    }

    /// Annual dividend rate on taxable stocks, in percent.
    pub fn set_dividend_rate(&mut self, percent: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(PlanError::Input {
                field: "dividend_rate",
                message: "must be a percentage".to_string(),
            });
        }
        self.dividend_rate = percent / 100.0;
        Ok(())
    }

    /// Heirs' marginal rate on the tax-deferred estate, in percent.
    pub fn set_heirs_tax_rate(&mut self, percent: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(PlanError::Input {
                field: "heirs_rate_on_tax_deferred_estate",
                message: "must be a percentage".to_string(),
            });
        }
        self.heirs_tax = percent / 100.0;
        Ok(())
    }

    /// Year the OBBBA bracket extension expires; clamped to the current
    /// year or later.
    pub fn set_obbba_year(&mut self, year: i32) {
        self.obbba_year = year.max(self.this_year);
    }

    pub fn set_interpolation(
        &mut self,
        method: InterpolationMethod,
        center: f64,
        width: f64,
    ) -> Result<()> {
        if width <= 0.0 {
            return Err(PlanError::Input {
                field: "interpolation_width",
                message: "must be positive".to_string(),
            });
        }
        self.interp_method = method;
        self.interp_center = center;
        self.interp_width = width;
        Ok(())
    }

    pub fn set_allocation_ratios(&mut self, ratios: AllocationRatios) -> Result<()> {
        ratios.validate(self.n_i)?;
        self.allocation = Some(ratios);
        Ok(())
    }

    /// Monthly pension amounts and fractional commencement ages.
    pub fn set_pension(&mut self, amounts: &[f64], ages: &[f64], indexed: &[bool]) -> Result<()> {
        if amounts.len() != self.n_i || ages.len() != self.n_i || indexed.len() != self.n_i {
            return Err(PlanError::Input {
                field: "pension_monthly_amounts",
                message: format!("expected {} entries", self.n_i),
            });
        }
        self.pension_amounts = amounts.to_vec();
        self.pension_ages = ages.to_vec();
        self.pension_indexed = indexed.to_vec();
        Ok(())
    }

    /// Monthly PIA amounts and fractional claiming ages.
    pub fn set_social_security(&mut self, pias: &[f64], ages: &[f64]) -> Result<()> {
        if pias.len() != self.n_i || ages.len() != self.n_i {
            return Err(PlanError::Input {
                field: "social_security_pia_amounts",
                message: format!("expected {} entries", self.n_i),
            });
        }
        if ages.iter().any(|&a| !(62.0..=70.0).contains(&a)) {
            return Err(PlanError::Input {
                field: "social_security_ages",
                message: "claiming age must be between 62 and 70".to_string(),
            });
        }
        self.ss_pias = pias.to_vec();
        self.ss_ages = ages.to_vec();
        Ok(())
    }

    /// Attach the household financial profile and align it to the plan.
    pub fn set_household_profile(
        &mut self,
        profile: HouseholdProfile,
        file_name: Option<&str>,
    ) -> Result<()> {
        profile.validate(&self.inames)?;
        self.lists = profile
            .individuals
            .iter()
            .map(|list| AlignedTimeList::from_time_list(list, self.this_year, self.n_n))
            .collect();
        self.asset_debt_flows = profile.asset_debt_flows(self.this_year, self.n_n);
        self.hfp_file_name = file_name.map(|s| s.to_string());
        self.hfp = Some(profile);
        Ok(())
    }

    /// Tax-free contributions and conversions made during the five years
    /// before the plan start (index 0 = one year ago), per individual.
    pub fn set_roth_contribution_history(&mut self, history: Vec<[f64; 5]>) -> Result<()> {
        if history.len() != self.n_i {
            return Err(PlanError::Input {
                field: "roth_contribution_history",
                message: format!("expected {} entries", self.n_i),
            });
        }
        self.roth_history = history;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rates
    // ------------------------------------------------------------------

    /// Select the rate model and generate the series for the horizon.
    pub fn set_rates(&mut self, model: RateModel, seed: Option<u64>) -> Result<()> {
        let mut generator = RateGenerator::new(model, seed)?;
        generator.set_transforms(self.rate_reverse, self.rate_roll);
        self.rates = Some(RateSourceKind::Builtin(generator));
        self.generate_rates()
    }

    /// Select an externally provided rate source.
    pub fn set_rate_plugin(&mut self, plugin: Arc<Mutex<dyn RateSource>>) -> Result<()> {
        self.rates = Some(RateSourceKind::Plugin(plugin));
        self.generate_rates()
    }

    pub fn set_reproducible(&mut self, reproducible: bool) {
        self.reproducible = reproducible;
    }

    /// Configure reverse/roll and regenerate with the new transforms.
    pub fn set_rate_transforms(&mut self, reverse: bool, roll: i64) -> Result<()> {
        self.rate_reverse = reverse;
        self.rate_roll = roll;
        if let Some(RateSourceKind::Builtin(generator)) = &mut self.rates {
            generator.set_transforms(reverse, roll);
            return self.generate_rates();
        }
        Ok(())
    }

    /// Redraw the rate series. Reproducible plans replay their seed
    /// unless overridden; `override_reproducible` forces a fresh draw
    /// (with `seed_override` pinning it for batch reproducibility).
    pub fn regen_rates(
        &mut self,
        override_reproducible: bool,
        seed_override: Option<u64>,
    ) -> Result<()> {
        if let Some(RateSourceKind::Builtin(generator)) = &mut self.rates {
            if override_reproducible {
                generator.reseed(seed_override);
            } else if self.reproducible {
                generator.reseed(generator.seed());
            }
        }
        self.generate_rates()
    }

    fn generate_rates(&mut self) -> Result<()> {
        let n_n = self.n_n;
        let series = match self.rates.as_mut().ok_or(PlanError::Input {
            field: "rates_selection",
            message: "no rate model selected".to_string(),
        })? {
            RateSourceKind::Builtin(generator) => generator.generate(n_n)?,
            RateSourceKind::Plugin(plugin) => {
                let mut guard = plugin.lock().map_err(|_| PlanError::RateModel {
                    model: "plugin",
                    message: "rate plugin lock poisoned".to_string(),
                })?;
                let series = guard.generate(n_n)?;
                if series.len() != n_n {
                    return Err(PlanError::RateModel {
                        model: "plugin",
                        message: format!(
                            "plugin returned {} rows for a {}-year horizon",
                            series.len(),
                            n_n
                        ),
                    });
                }
                series
            }
        };

        let mut gamma = Vec::with_capacity(n_n + 1);
        gamma.push(1.0);
        for row in &series {
            let previous = *gamma.last().unwrap();
            gamma.push(previous * (1.0 + row[3]));
        }
        self.tau = Some(series);
        self.gamma = gamma;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Solving
    // ------------------------------------------------------------------

    /// Solve the case with the current rate series.
    pub fn solve(
        &mut self,
        objective: Objective,
        options: &SolveOptions,
        solver: &dyn MilpSolver,
    ) -> Result<()> {
        self.solve_with_progress(objective, options, solver, None, None)
    }

    /// Solve with an optional progress callback and cancellation token.
    pub fn solve_with_progress(
        &mut self,
        objective: Objective,
        options: &SolveOptions,
        solver: &dyn MilpSolver,
        progress: Option<ProgressCallback>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        options.validate()?;
        self.objective = Some(objective);
        self.result = None;
        self.case_status = CaseStatus::Unsolved;

        if self.tau.is_none() {
            self.generate_rates()?;
        }
        let tau = self.tau.clone().expect("rates generated above");
        let gamma = self.gamma.clone();

        let allocation = self.allocation.clone().ok_or(PlanError::Input {
            field: "asset_allocation",
            message: "no allocation ratios set".to_string(),
        })?;
        let alpha = interpolate(
            &allocation,
            self.interp_method,
            self.interp_center,
            self.interp_width,
            self.n_i,
            self.n_n,
        )?;

        let tax_schedule = tax::tax_schedule(
            &self.yobs,
            self.i_d,
            self.n_d,
            self.n_n,
            self.this_year,
            self.obbba_year,
        );
        let rho = rmd::rmd_fractions(&self.yobs, self.n_n, self.this_year);
        let mut pension_series = pension::pension_benefits(
            &self.pension_amounts,
            &self.pension_ages,
            &self.yobs,
            &self.mobs,
            &self.horizons,
            self.n_n,
            self.this_year,
        );
        pension::apply_indexing(&mut pension_series, &self.pension_indexed, &gamma);
        let ss_series = ss::benefit_series(
            &self.ss_pias,
            &self.ss_ages,
            &self.yobs,
            &self.mobs,
            &self.horizons,
            self.n_d,
            self.n_n,
            self.this_year,
        );
        let xi = spending_profile(
            self.profile_kind,
            &self.smile,
            self.survivor_fraction,
            self.n_d,
            self.n_n,
        );

        let outcome = self.sc_solve(
            objective,
            options,
            solver,
            progress,
            cancel,
            SolveSeries {
                tau: &tau,
                gamma: &gamma,
                alpha: &alpha,
                tax: &tax_schedule,
                rho: &rho,
                pension: &pension_series,
                ss: &ss_series,
                xi: &xi,
            },
        );

        match &outcome {
            Ok(_) => {
                debug!(name = %self.name, status = self.exit_status(), "solve finished");
            }
            Err(err) => {
                warn!(name = %self.name, error = %err, "solve failed");
            }
        }
        outcome
    }

    fn lp_inputs<'a>(&'a self, series: &'a SolveSeries<'a>, sc: &'a ScState) -> LpInputs<'a> {
        LpInputs {
            n_i: self.n_i,
            n_n: self.n_n,
            n_d: self.n_d,
            i_d: self.i_d,
            horizons: &self.horizons,
            yobs: &self.yobs,
            this_year: self.this_year,
            gamma: series.gamma,
            tau: series.tau,
            alpha: series.alpha,
            tax: series.tax,
            rho: series.rho,
            pension: series.pension,
            ss: series.ss,
            xi: series.xi,
            balances: &self.balances,
            lists: &self.lists,
            asset_debt_flows: &self.asset_debt_flows,
            beneficiary: self.beneficiary,
            surplus_fraction: self.surplus_fraction,
            dividend_rate: self.dividend_rate,
            heirs_tax: self.heirs_tax,
            roth_history: &self.roth_history,
            sc,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn sc_solve(
        &mut self,
        objective: Objective,
        options: &SolveOptions,
        solver: &dyn MilpSolver,
        progress: Option<ProgressCallback>,
        cancel: Option<&CancelToken>,
        series: SolveSeries<'_>,
    ) -> Result<()> {
        let started = Instant::now();
        let check_interrupts = |plan: &mut Plan| -> Result<()> {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                plan.case_status = CaseStatus::Cancelled;
                return Err(PlanError::Cancelled);
            }
            if options
                .time_budget
                .is_some_and(|budget| started.elapsed() > budget)
            {
                plan.case_status = CaseStatus::Timeout;
                return Err(PlanError::Timeout);
            }
            Ok(())
        };

        let mut sc = ScState::initial(self.n_n);
        let mut history = SnapshotHistory::new();
        let mut damping = options.sc_damping;
        let mut convergence = ConvergenceType::SingleSolve;
        let mut iterations = 0;

        check_interrupts(self)?;
        let (mut vm, mut xstar, objective_value) =
            self.solve_once(&series, &sc, objective, options, solver)?;
        iterations += 1;
        if let Some(callback) = progress {
            callback(iterations, objective_value);
        }

        if options.with_sc_loop {
            convergence = ConvergenceType::MaxIteration;
            for _ in 1..=options.max_iterations {
                check_interrupts(self)?;

                let mut fresh = self.recompute_nonlinear(&series, &sc, &vm, &xstar, options);
                if converged(&sc, &fresh, options.abs_tol, options.rel_tol) {
                    sc = fresh;
                    convergence = ConvergenceType::Converged;
                    break;
                }

                history.push(fresh.snapshot());
                if let Some(cycle) = history.detect_cycle(options.abs_tol.max(1e-9)) {
                    if options.sc_damping_on_osc == 0.0 {
                        sc = fresh;
                        convergence = ConvergenceType::Oscillatory(cycle);
                        break;
                    }
                    warn!(cycle, "oscillation detected; continuing with damping");
                    damping = options.sc_damping_on_osc;
                }

                // damping is the weight kept on the previous iterate.
                fresh.damp_from(&sc, 1.0 - damping);
                sc = fresh;

                let (next_vm, next_x, objective_value) =
                    self.solve_once(&series, &sc, objective, options, solver)?;
                vm = next_vm;
                xstar = next_x;
                iterations += 1;
                if let Some(callback) = progress {
                    callback(iterations, objective_value);
                }
            }
        } else {
            // Populate the reporting coefficients from the single solve.
            sc = self.recompute_nonlinear(&series, &sc, &vm, &xstar, options);
        }

        let result = {
            let inputs = self.lp_inputs(&series, &sc);
            aggregate(&vm, &xstar, &inputs, &sc, convergence, iterations)
        };
        self.convergence = convergence;
        self.case_status = CaseStatus::Solved;
        self.result = Some(result);
        Ok(())
    }

    fn solve_once(
        &mut self,
        series: &SolveSeries<'_>,
        sc: &ScState,
        objective: Objective,
        options: &SolveOptions,
        solver: &dyn MilpSolver,
    ) -> Result<(VarMap, Vec<f64>, f64)> {
        let inputs = self.lp_inputs(series, sc);
        let (vm, problem) = build_problem(&inputs, objective, options);
        let outcome = solver.solve(&problem);
        match outcome.status {
            SolverStatus::Optimal => {
                if outcome.x.len() != problem.nvars {
                    self.case_status = CaseStatus::SolverError;
                    return Err(PlanError::Solver(SolverFailure::Numerical(format!(
                        "solver returned {} values for {} variables",
                        outcome.x.len(),
                        problem.nvars
                    ))));
                }
                Ok((vm, outcome.x, outcome.objective))
            }
            SolverStatus::Infeasible => {
                self.case_status = CaseStatus::Infeasible;
                Err(PlanError::Solver(SolverFailure::Infeasible))
            }
            SolverStatus::Unbounded => {
                self.case_status = CaseStatus::Unbounded;
                Err(PlanError::Solver(SolverFailure::Unbounded))
            }
            SolverStatus::Error(message) => {
                self.case_status = CaseStatus::SolverError;
                Err(PlanError::Solver(SolverFailure::Numerical(message)))
            }
        }
    }

    /// Recompute the non-linear coefficients from a solution vector.
    fn recompute_nonlinear(
        &self,
        series: &SolveSeries<'_>,
        previous: &ScState,
        vm: &VarMap,
        x: &[f64],
        options: &SolveOptions,
    ) -> ScState {
        let n_n = self.n_n;
        let gamma = series.gamma;
        let inputs = self.lp_inputs(series, previous);

        let balances = vm.block("b").extract(x);
        let withdrawals = vm.block("w").extract(x);
        let conversions = vm.block("x").extract(x);
        let deposits = vm.block("d").extract(x);
        let split = vm.block("f").extract(x);

        let mut sc = ScState::initial(n_n);

        // Taxable-account cost basis evolves outside the LP: deposits
        // and contributions add basis, withdrawals consume it pro rata.
        let mut basis: f64 = (0..self.n_i).map(|i| self.balances[i][0]).sum();

        for n in 0..n_n {
            let status = inputs.filing_status(n);
            let ss_total = inputs.ss_total(n);

            let mut w_deferred = 0.0;
            let mut w_taxable = 0.0;
            let mut conv = 0.0;
            let mut dep = 0.0;
            let mut taxable_ctrb = 0.0;
            let mut dividends = 0.0;
            let mut balance_taxable = 0.0;
            for i in 0..self.n_i {
                w_deferred += withdrawals.at3(i, 1, n);
                w_taxable += withdrawals.at3(i, 0, n);
                conv += conversions.at2(i, n);
                dep += deposits.at2(i, n);
                taxable_ctrb += self.lists[i].taxable_contributions[n];
                dividends += inputs.dividend_coefficient(i, n) * balances.at3(i, 0, n);
                balance_taxable += balances.at3(i, 0, n);
            }

            let basis_fraction = if balance_taxable > 0.0 {
                (basis / balance_taxable).clamp(0.0, 1.0)
            } else {
                1.0
            };
            sc.gain_fraction[n] = 1.0 - basis_fraction;
            let realized_gain = split.at2(1, n);
            basis = (basis - w_taxable * basis_fraction + dep + taxable_ctrb).max(0.0);

            // Provisional income and the taxable share of benefits.
            let other_income =
                inputs.ordinary_income_const(n, 0.0) + w_deferred + conv + realized_gain
                    + dividends;
            let provisional = 0.5 * ss_total + other_income;
            sc.provisional[n] = provisional;
            sc.psi[n] = match options.ss_taxability {
                SsTaxability::Fixed(fraction) => fraction,
                _ => ss::taxable_fraction(provisional, ss_total, status),
            };

            // MAGI and investment-income taxes.
            let ltcg = realized_gain + dividends;
            let ordinary = inputs.ordinary_income_const(n, sc.psi[n] * ss_total)
                + w_deferred
                + conv;
            let magi = ordinary + ltcg;
            sc.magi[n] = magi.max(0.0);
            sc.dividends[n] = dividends;
            sc.niit[n] = tax::net_investment_income_tax(magi, ltcg, status);

            let taxable_ordinary = (ordinary - series.tax.sigma[n] * gamma[n]).max(0.0);
            if ltcg > 1.0 {
                let cg = tax::capital_gain_tax(
                    self.n_i,
                    &[taxable_ordinary + ltcg],
                    &[ltcg],
                    &[gamma[n]],
                    if n < self.n_d { 1 } else { 0 },
                    1,
                );
                sc.cg_rate[n] = (cg[0] / ltcg).clamp(0.0, 0.20);
            } else {
                sc.cg_rate[n] = previous.cg_rate[n];
            }
        }

        // Medicare from two-year lagged MAGI, outside the LP.
        sc.medicare = match options.with_medicare {
            MedicareMode::Loop => medicare::medicare_costs(
                &self.yobs,
                &self.horizons,
                &sc.magi,
                &options.previous_magis,
                gamma,
                self.n_d,
                n_n,
                self.this_year,
            ),
            _ => vec![0.0; n_n],
        };

        sc
    }

    // ------------------------------------------------------------------
    // Batch operations
    // ------------------------------------------------------------------

    /// Solve the plan over every historical start year in `[frm, to]`,
    /// collecting the distribution of outcomes. Failed years are logged
    /// and skipped; cancellation returns the partial distribution.
    pub fn run_historical_range(
        &self,
        objective: Objective,
        options: &SolveOptions,
        solver: &(dyn MilpSolver + Sync),
        frm: i32,
        to: i32,
        cancel: Option<&CancelToken>,
    ) -> Result<BatchResult> {
        historical::window("historical", frm, to)?;
        let years: Vec<i32> = (frm..=to).collect();

        let run_year = |year: &i32| -> Option<BatchRun> {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return None;
            }
            let mut plan = self.clone();
            let end = (year + plan.n_n as i32 - 1).min(historical::TO);
            if let Err(err) = plan.set_rates(
                RateModel::Historical {
                    frm: *year,
                    to: end.max(*year),
                },
                None,
            ) {
                warn!(year, error = %err, "historical run skipped");
                return None;
            }
            match plan.solve(objective, options, solver) {
                Ok(()) => plan.result.as_ref().map(|r| BatchRun {
                    tag: *year as i64,
                    basis: r.basis,
                    partial_bequest: r.partial_bequest,
                    bequest: r.bequest,
                }),
                Err(err) => {
                    warn!(year, error = %err, "historical run failed");
                    None
                }
            }
        };

        #[cfg(feature = "parallel")]
        let runs: Vec<BatchRun> = years.par_iter().filter_map(run_year).collect();
        #[cfg(not(feature = "parallel"))]
        let runs: Vec<BatchRun> = years.iter().filter_map(run_year).collect();

        Ok(BatchResult {
            attempted: years.len(),
            cancelled: cancel.is_some_and(|token| token.is_cancelled()),
            runs,
        })
    }

    /// Monte Carlo over `count` independent rate draws. Reproducibility
    /// is overridden: each draw gets its own derived seed so the
    /// distribution is independent yet replayable.
    pub fn run_mc(
        &self,
        objective: Objective,
        options: &SolveOptions,
        solver: &(dyn MilpSolver + Sync),
        count: usize,
        cancel: Option<&CancelToken>,
    ) -> Result<BatchResult> {
        match &self.rates {
            None => {
                return Err(PlanError::Input {
                    field: "rates_selection",
                    message: "no rate model selected".to_string(),
                });
            }
            Some(RateSourceKind::Builtin(generator)) if generator.model().deterministic() => {
                return Err(PlanError::Input {
                    field: "rates_selection",
                    message: format!(
                        "Monte Carlo needs a stochastic rate model, got '{}'",
                        generator.model().name()
                    ),
                });
            }
            _ => {}
        }
        let base_seed = self.rate_seed().unwrap_or(0);
        let draws: Vec<u64> = (0..count as u64).map(|k| base_seed.wrapping_add(k)).collect();

        let run_draw = |seed: &u64| -> Option<BatchRun> {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return None;
            }
            let mut plan = self.clone();
            if let Err(err) = plan.regen_rates(true, Some(*seed)) {
                warn!(seed, error = %err, "monte carlo draw skipped");
                return None;
            }
            match plan.solve(objective, options, solver) {
                Ok(()) => plan.result.as_ref().map(|r| BatchRun {
                    tag: *seed as i64,
                    basis: r.basis,
                    partial_bequest: r.partial_bequest,
                    bequest: r.bequest,
                }),
                Err(err) => {
                    warn!(seed, error = %err, "monte carlo draw failed");
                    None
                }
            }
        };

        #[cfg(feature = "parallel")]
        let runs: Vec<BatchRun> = draws.par_iter().filter_map(run_draw).collect();
        #[cfg(not(feature = "parallel"))]
        let runs: Vec<BatchRun> = draws.iter().filter_map(run_draw).collect();

        Ok(BatchResult {
            attempted: count,
            cancelled: cancel.is_some_and(|token| token.is_cancelled()),
            runs,
        })
    }
}

/// Precomputed per-solve series, borrowed by the SC loop.
struct SolveSeries<'a> {
    tau: &'a [[f64; N_ASSETS]],
    gamma: &'a [f64],
    alpha: &'a AlphaSeries,
    tax: &'a tax::TaxSchedule,
    rho: &'a [Vec<f64>],
    pension: &'a [Vec<f64>],
    ss: &'a [Vec<f64>],
    xi: &'a [f64],
}

/// Snapshot of plan inputs for configuration serialization.
#[derive(Debug, Clone)]
pub(crate) struct PlanInputsSnapshot {
    pub dobs: Vec<Date>,
    pub expectancy: Vec<i32>,
    pub start_date: Option<String>,
    pub balances: Vec<[f64; N_ACCOUNTS]>,
    pub beneficiary: [f64; N_ACCOUNTS],
    pub surplus_fraction: f64,
    pub dividend_rate: f64,
    pub heirs_tax: f64,
    pub obbba_year: i32,
    pub profile_kind: ProfileKind,
    pub smile: SmileParams,
    pub survivor_fraction: f64,
    pub allocation: Option<AllocationRatios>,
    pub interp_method: InterpolationMethod,
    pub interp_center: f64,
    pub interp_width: f64,
    pub pension_amounts: Vec<f64>,
    pub pension_ages: Vec<f64>,
    pub pension_indexed: Vec<bool>,
    pub ss_pias: Vec<f64>,
    pub ss_ages: Vec<f64>,
    pub hfp_file_name: Option<String>,
}
