//! Year-by-year assembly of the drawdown MILP.
//!
//! Walks the plan horizon and emits the sparse constraint rows, variable
//! bounds, and objective vector: account dynamics, the cash-flow
//! identity, net-of-tax spending with bracket filling, profile
//! adherence, RMD floors, Roth conversion gates and five-year
//! maturation, the bequest tie-in, and the optional Social Security and
//! IRMAA linearizations with their binaries.

use crate::allocation::AlphaSeries;
use crate::medicare;
use crate::plan::{MedicareMode, Objective, SolveOptions, SsTaxability};
use crate::profile::AlignedTimeList;
use crate::rates::N_ASSETS;
use crate::scloop::ScState;
use crate::social_security::provisional_thresholds;
use crate::tax::{N_TAX_BRACKETS, TaxSchedule};
use crate::varmap::VarMap;

use super::{MilpProblem, RowBound, RowBuilder, SparseRow, VarBound};

pub const N_ACCOUNTS: usize = 3;

/// Everything the builder needs, borrowed from the orchestrator. All
/// series are precomputed parameters; only the decision variables live
/// in the LP.
pub struct LpInputs<'a> {
    pub n_i: usize,
    pub n_n: usize,
    /// Year index at which the shorter-lived individual dies (== n_n
    /// when nobody dies within the plan).
    pub n_d: usize,
    /// Index of the shorter-lived individual (0 for singles).
    pub i_d: usize,
    pub horizons: &'a [usize],
    pub yobs: &'a [i32],
    pub this_year: i32,
    /// Cumulative inflation, length n_n + 1, gamma[0] = 1.
    pub gamma: &'a [f64],
    /// Annual rates per year and asset class.
    pub tau: &'a [[f64; N_ASSETS]],
    pub alpha: &'a AlphaSeries,
    pub tax: &'a TaxSchedule,
    /// RMD fractions rho[i][n].
    pub rho: &'a [Vec<f64>],
    /// Pension series in real dollars (indexing already applied).
    pub pension: &'a [Vec<f64>],
    /// Social Security series in real dollars.
    pub ss: &'a [Vec<f64>],
    pub xi: &'a [f64],
    /// Initial balances beta[i][j].
    pub balances: &'a [[f64; N_ACCOUNTS]],
    pub lists: &'a [AlignedTimeList],
    /// Net household flows from the debts and fixed-asset tables.
    pub asset_debt_flows: &'a [f64],
    /// Beneficiary fractions phi[j] transferred to the survivor.
    pub beneficiary: [f64; N_ACCOUNTS],
    /// Spousal surplus deposit fraction eta.
    pub surplus_fraction: f64,
    /// Dividend rate mu on the taxable stock allocation.
    pub dividend_rate: f64,
    /// Heirs' tax rate nu on the tax-deferred estate.
    pub heirs_tax: f64,
    /// Tax-free contributions + conversions made 1..=5 years before the
    /// plan start (index 0 = one year ago), per individual.
    pub roth_history: &'a [[f64; 5]],
    pub sc: &'a ScState,
}

impl LpInputs<'_> {
    /// Nominal Social Security benefit of individual `i` in year `n`.
    pub fn ss_nominal(&self, i: usize, n: usize) -> f64 {
        self.ss[i][n] * self.gamma[n]
    }

    /// Total nominal household Social Security benefit in year `n`.
    pub fn ss_total(&self, n: usize) -> f64 {
        (0..self.n_i).map(|i| self.ss_nominal(i, n)).sum()
    }

    /// Nominal pension benefit of individual `i` in year `n`.
    pub fn pension_nominal(&self, i: usize, n: usize) -> f64 {
        self.pension[i][n] * self.gamma[n]
    }

    /// Constant part of ordinary taxable income in year `n`: wages and
    /// other income plus pensions, minus pre-tax contributions, plus the
    /// given taxable Social Security amount.
    pub fn ordinary_income_const(&self, n: usize, taxable_ss: f64) -> f64 {
        let mut total = taxable_ss;
        for i in 0..self.n_i {
            let list = &self.lists[i];
            total += list.wages[n] + list.other_income[n] + self.pension_nominal(i, n);
            total -= list.contributions_401k[n] + list.contributions_ira[n];
        }
        total
    }

    /// Constant cash inflows in year `n`: wages, other income, pensions,
    /// Social Security, big-ticket items, and debt/asset flows.
    pub fn cash_inflow_const(&self, n: usize) -> f64 {
        let mut total = self.asset_debt_flows[n];
        for i in 0..self.n_i {
            let list = &self.lists[i];
            total += list.wages[n] + list.other_income[n] + list.big_ticket_items[n];
            total += self.pension_nominal(i, n) + self.ss_nominal(i, n);
        }
        total
    }

    /// Constant cash outflows in year `n`: all savings contributions.
    pub fn cash_outflow_const(&self, n: usize) -> f64 {
        (0..self.n_i)
            .map(|i| {
                let list = &self.lists[i];
                list.taxable_contributions[n]
                    + list.contributions_401k[n]
                    + list.contributions_roth_401k[n]
                    + list.contributions_ira[n]
                    + list.contributions_roth_ira[n]
            })
            .sum()
    }

    /// Filing status in year `n`: married until the first death.
    pub fn filing_status(&self, n: usize) -> usize {
        if self.n_i == 2 && n < self.n_d { 1 } else { 0 }
    }

    /// Allocation-weighted return of account (i, j) in year `n`.
    pub fn account_return(&self, i: usize, j: usize, n: usize) -> f64 {
        self.alpha.weighted_return(i, j, n, &self.tau[n])
    }

    /// Dividend yield coefficient on b[i, 0, n]: the dividend rate
    /// weighted by the stock share of the taxable account.
    pub fn dividend_coefficient(&self, i: usize, n: usize) -> f64 {
        self.dividend_rate * self.alpha.at(i, 0, 0, n)
    }

    /// Pre-plan tax-free money that is still inside its five-year
    /// maturation window at plan year `n`.
    pub fn unmatured_roth(&self, i: usize, n: usize) -> f64 {
        // A contribution made h years before the start matures at plan
        // year 5 - h.
        (1..=5)
            .filter(|&h| 5 - h > n)
            .map(|h| self.roth_history[i][h - 1])
            .sum()
    }

    /// Big-M for binary gating: ten times the largest plausible inflated
    /// wealth, so the bound never binds a legitimate solution.
    pub fn big_m(&self) -> f64 {
        let mut wealth: f64 = self
            .balances
            .iter()
            .flat_map(|row| row.iter())
            .sum();
        for list in self.lists {
            wealth += list.wages.iter().sum::<f64>();
            wealth += list.other_income.iter().sum::<f64>();
            wealth += list.big_ticket_items.iter().map(|v| v.abs()).sum::<f64>();
        }
        10.0 * self.gamma[self.n_n] * wealth.max(1.0e6)
    }
}

/// Declare every variable family in the canonical order: continuous
/// blocks first, then the binary marker, then the binary blocks.
fn declare_variables(inp: &LpInputs, options: &SolveOptions, n_med: usize) -> VarMap {
    let (n_i, n_n) = (inp.n_i, inp.n_n);
    let linearized_ss = matches!(options.ss_taxability, SsTaxability::Linearized);
    let optimize_medicare = matches!(options.with_medicare, MedicareMode::Optimize);
    let with_medicare = !matches!(options.with_medicare, MedicareMode::None);

    let mut vm = VarMap::new();
    vm.add("b", &[n_i, N_ACCOUNTS, n_n + 1]);
    vm.add("d", &[n_i, n_n]);
    vm.add("e", &[n_n]);
    vm.add("f", &[2, n_n]);
    vm.add("g", &[n_n]);
    vm.add_if(optimize_medicare, "h", &[n_med, medicare::N_IRMAA]);
    vm.add_if(with_medicare, "m", &[n_n]);
    vm.add("s", &[n_n]);
    vm.add("w", &[n_i, N_ACCOUNTS, n_n]);
    vm.add("x", &[n_i, n_n]);
    vm.add("u", &[N_TAX_BRACKETS, n_n]);
    vm.add_if(linearized_ss, "plo", &[n_n]);
    vm.add_if(linearized_ss, "phi", &[n_n]);
    vm.add_if(linearized_ss, "q", &[n_n]);
    vm.add_if(linearized_ss, "tss", &[n_n]);
    vm.mark_binary_start();
    vm.add_if(options.xor_constraints, "zx", &[n_n, 2]);
    vm.add_if(optimize_medicare, "zm", &[n_med, medicare::N_IRMAA]);
    vm.add_if(linearized_ss, "zs", &[n_n, 2]);
    vm
}

/// Build the complete problem for one SC-loop iteration.
pub fn build_problem(
    inp: &LpInputs,
    objective: Objective,
    options: &SolveOptions,
) -> (VarMap, MilpProblem) {
    let (n_i, n_n, n_d) = (inp.n_i, inp.n_n, inp.n_d);
    let gamma = inp.gamma;
    let big_m = inp.big_m();

    let (n_med, irmaa_thresholds, irmaa_costs) =
        if matches!(options.with_medicare, MedicareMode::Optimize) {
            medicare::medicare_values(inp.yobs, inp.horizons, gamma, n_d, n_n, inp.this_year)
        } else {
            (0, Vec::new(), Vec::new())
        };

    let vm = declare_variables(inp, options, n_med);
    let mut rows: Vec<SparseRow> = Vec::new();
    let mut bounds = vec![VarBound::default(); vm.nvars()];
    let linearized_ss = matches!(options.ss_taxability, SsTaxability::Linearized);

    let b = vm.block("b").clone();
    let d = vm.block("d").clone();
    let e = vm.block("e").clone();
    let f = vm.block("f").clone();
    let g = vm.block("g").clone();
    let s = vm.block("s").clone();
    let w = vm.block("w").clone();
    let x = vm.block("x").clone();
    let u = vm.block("u").clone();

    // ------------------------------------------------------------------
    // Variable bounds
    // ------------------------------------------------------------------

    // Initial balances are data, terminal balances are free above zero.
    for i in 0..n_i {
        for j in 0..N_ACCOUNTS {
            bounds[b.idx3(i, j, 0)] = VarBound::fixed(inp.balances[i][j]);
            // After an individual's horizon the estate has been settled;
            // balances and movements are pinned at zero. The balance at
            // the horizon epoch itself is the estate.
            for n in (inp.horizons[i] + 1)..=n_n {
                bounds[b.idx3(i, j, n)] = VarBound::fixed(0.0);
            }
            for n in inp.horizons[i]..n_n {
                bounds[w.idx3(i, j, n)] = VarBound::fixed(0.0);
            }
        }
        for n in inp.horizons[i]..n_n {
            bounds[d.idx2(i, n)] = VarBound::fixed(0.0);
            bounds[x.idx2(i, n)] = VarBound::fixed(0.0);
        }
    }

    // Bracket-fill variables are limited to the inflated bracket width.
    for t in 0..N_TAX_BRACKETS {
        for n in 0..n_n {
            bounds[u.idx2(t, n)] = VarBound::upper(inp.tax.delta[t][n] * gamma[n]);
        }
    }

    // Roth conversion gates: planned conversions from the profile are a
    // floor; the per-year ceiling applies from the configured start year
    // unless conversions are disabled for the individual.
    for i in 0..n_i {
        for n in 0..inp.horizons[i] {
            let planned = inp.lists[i].roth_conversions[n];
            let gated_off = options.no_roth_conversions
                || options.exclude_roth_for == Some(i)
                || options
                    .start_roth_conversions
                    .is_some_and(|year| inp.this_year + (n as i32) < year);
            let ceiling = if gated_off {
                planned
            } else {
                match options.max_roth_conversion {
                    Some(cap) => (cap * gamma[n]).max(planned),
                    None => f64::INFINITY,
                }
            };
            bounds[x.idx2(i, n)] = VarBound {
                lower: planned,
                upper: ceiling,
            };
        }
    }

    // Spending slack: fixed at zero for a hard profile, free otherwise
    // (the band is enforced by rows below).
    for n in 0..n_n {
        bounds[s.idx1(n)] = if options.spending_slack == 0.0 {
            VarBound::fixed(0.0)
        } else {
            VarBound::free()
        };
    }

    // Medicare variable: fixed from the SC loop, defined by rows in
    // optimize mode, absent otherwise.
    if let Some(m) = vm.get("m") {
        match options.with_medicare {
            MedicareMode::Loop => {
                for n in 0..n_n {
                    bounds[m.idx1(n)] = VarBound::fixed(inp.sc.medicare[n]);
                }
            }
            MedicareMode::Optimize => {
                for n in n_med..n_n {
                    bounds[m.idx1(n)] = VarBound::fixed(0.0);
                }
            }
            MedicareMode::None => {}
        }
    }

    if linearized_ss {
        let q = vm.block("q");
        let tss = vm.block("tss");
        let plo = vm.block("plo");
        for n in 0..n_n {
            bounds[q.idx1(n)] = VarBound::free();
            bounds[tss.idx1(n)] = VarBound::upper(0.85 * inp.ss_total(n));
            let (low, high) = provisional_thresholds(inp.filing_status(n));
            bounds[plo.idx1(n)] = VarBound::upper(high - low);
        }
    }

    // Binary variables live in [0, 1]; integrality comes from their
    // position after the binary marker.
    for idx in vm.nconts()..vm.nvars() {
        bounds[idx] = VarBound::upper(1.0);
    }

    // ------------------------------------------------------------------
    // 1. Account dynamics
    // ------------------------------------------------------------------

    for i in 0..n_i {
        for j in 0..N_ACCOUNTS {
            for n in 0..inp.horizons[i] {
                let growth = 1.0 + inp.account_return(i, j, n);
                let mut row = RowBuilder::new();
                row.add(b.idx3(i, j, n + 1), 1.0);
                row.add(b.idx3(i, j, n), -growth);
                row.add(w.idx3(i, j, n), 1.0);
                let list = &inp.lists[i];
                let mut contrib = 0.0;
                match j {
                    0 => {
                        row.add(d.idx2(i, n), -1.0);
                        contrib = list.taxable_contributions[n];
                    }
                    1 => {
                        row.add(x.idx2(i, n), 1.0);
                        contrib = list.contributions_401k[n] + list.contributions_ira[n];
                    }
                    2 => {
                        row.add(x.idx2(i, n), -1.0);
                        contrib =
                            list.contributions_roth_401k[n] + list.contributions_roth_ira[n];
                    }
                    _ => unreachable!(),
                }
                // Spousal inheritance: the survivor's first post-death
                // year grows its own balance plus the beneficiary
                // fraction of the estate.
                if n_i == 2 && i != inp.i_d && n == n_d && n_d < n_n {
                    row.add(b.idx3(inp.i_d, j, n_d), -growth * inp.beneficiary[j]);
                }
                rows.push(row.seal(RowBound::Fixed(contrib), "account dynamics"));
            }
        }
    }

    // ------------------------------------------------------------------
    // 2. Cash-flow identity
    // ------------------------------------------------------------------

    for n in 0..n_n {
        let mut row = RowBuilder::new();
        for i in 0..n_i {
            for j in 0..N_ACCOUNTS {
                row.add(w.idx3(i, j, n), 1.0);
            }
            row.add(d.idx2(i, n), -1.0);
        }
        row.add(e.idx1(n), -1.0);
        if let Some(m) = vm.get("m") {
            row.add(m.idx1(n), -1.0);
        }
        let rhs = inp.cash_outflow_const(n) - inp.cash_inflow_const(n);
        rows.push(row.seal(RowBound::Fixed(rhs), "cash flow"));
    }

    // Spousal surplus split while both spouses are alive.
    if n_i == 2 {
        let eta = inp.surplus_fraction;
        for n in 0..n_d.min(n_n) {
            let mut row = RowBuilder::new();
            row.add(d.idx2(0, n), 1.0 - eta);
            row.add(d.idx2(1, n), -eta);
            rows.push(row.seal(RowBound::Fixed(0.0), "surplus split"));
        }
    }

    // ------------------------------------------------------------------
    // 3. Net-of-tax spending and bracket filling
    // ------------------------------------------------------------------

    for n in 0..n_n {
        // e[n] = g[n] + ordinary tax + capital-gain tax (+ NIIT const).
        let mut row = RowBuilder::new();
        row.add(e.idx1(n), 1.0);
        row.add(g.idx1(n), -1.0);
        for t in 0..N_TAX_BRACKETS {
            row.add(u.idx2(t, n), -inp.tax.theta[t][n]);
        }
        row.add(f.idx2(1, n), -inp.sc.cg_rate[n]);
        for i in 0..n_i {
            row.add(
                b.idx3(i, 0, n),
                -inp.sc.cg_rate[n] * inp.dividend_coefficient(i, n),
            );
        }
        rows.push(row.seal(RowBound::Fixed(inp.sc.niit[n]), "net of tax"));

        // Bracket fill covers taxable ordinary income above the
        // standard deduction.
        let taxable_ss = match options.ss_taxability {
            SsTaxability::Fixed(fraction) => fraction * inp.ss_total(n),
            SsTaxability::SelfConsistent => inp.sc.psi[n] * inp.ss_total(n),
            SsTaxability::Linearized => 0.0,
        };
        let mut fill = RowBuilder::new();
        for t in 0..N_TAX_BRACKETS {
            fill.add(u.idx2(t, n), 1.0);
        }
        for i in 0..n_i {
            fill.add(w.idx3(i, 1, n), -1.0);
            fill.add(x.idx2(i, n), -1.0);
        }
        if linearized_ss {
            fill.add(vm.block("tss").idx1(n), -1.0);
        }
        let rhs = inp.ordinary_income_const(n, taxable_ss) - inp.tax.sigma[n] * gamma[n];
        rows.push(fill.seal(RowBound::Lower(rhs), "bracket fill"));

        // Taxable-account withdrawals split into basis and gain.
        let mut split = RowBuilder::new();
        split.add(f.idx2(0, n), 1.0);
        split.add(f.idx2(1, n), 1.0);
        for i in 0..n_i {
            split.add(w.idx3(i, 0, n), -1.0);
        }
        rows.push(split.seal(RowBound::Fixed(0.0), "taxable split"));

        let mut gain = RowBuilder::new();
        gain.add(f.idx2(1, n), 1.0);
        for i in 0..n_i {
            gain.add(w.idx3(i, 0, n), -inp.sc.gain_fraction[n]);
        }
        rows.push(gain.seal(RowBound::Fixed(0.0), "gain share"));
    }

    // ------------------------------------------------------------------
    // 4. Profile adherence
    // ------------------------------------------------------------------

    let slack = options.spending_slack / 100.0;
    for n in 1..n_n {
        let shape = inp.xi[n] / inp.xi[0];
        let mut row = RowBuilder::new();
        row.add(g.idx1(n), 1.0 / gamma[n]);
        row.add(g.idx1(0), -shape);
        row.add(s.idx1(n), -1.0);
        rows.push(row.seal(RowBound::Fixed(0.0), "profile"));

        if slack > 0.0 {
            let mut upper = RowBuilder::new();
            upper.add(s.idx1(n), 1.0);
            upper.add(g.idx1(0), -slack * shape);
            rows.push(upper.seal(RowBound::Upper(0.0), "profile slack+"));

            let mut lower = RowBuilder::new();
            lower.add(s.idx1(n), -1.0);
            lower.add(g.idx1(0), -slack * shape);
            rows.push(lower.seal(RowBound::Upper(0.0), "profile slack-"));
        }
    }

    // ------------------------------------------------------------------
    // 5. RMD floors
    // ------------------------------------------------------------------

    for i in 0..n_i {
        for n in 0..inp.horizons[i] {
            if inp.rho[i][n] == 0.0 {
                continue;
            }
            let mut row = RowBuilder::new();
            row.add(w.idx3(i, 1, n), 1.0);
            row.add(b.idx3(i, 1, n), -inp.rho[i][n]);
            rows.push(row.seal(RowBound::Lower(0.0), "rmd floor"));
        }
    }

    // ------------------------------------------------------------------
    // 6. Roth five-year maturation
    // ------------------------------------------------------------------

    for i in 0..n_i {
        for n in 0..inp.horizons[i] {
            let mut row = RowBuilder::new();
            for m in 0..=n {
                row.add(w.idx3(i, 2, m), 1.0);
            }
            let mut matured = inp.balances[i][2] - inp.unmatured_roth(i, n);
            if n >= 5 {
                for m in 0..=(n - 5) {
                    row.add(x.idx2(i, m), -1.0);
                    matured += inp.lists[i].contributions_roth_401k[m]
                        + inp.lists[i].contributions_roth_ira[m];
                }
            }
            rows.push(row.seal(RowBound::Upper(matured), "roth maturation"));
        }
    }

    // ------------------------------------------------------------------
    // 7. Bequest floor / objective tie-in
    // ------------------------------------------------------------------

    match objective {
        Objective::MaxSpending => {
            if let Some(target) = options.bequest {
                let mut row = RowBuilder::new();
                for i in 0..n_i {
                    for j in 0..N_ACCOUNTS {
                        let weight = if j == 1 { 1.0 - inp.heirs_tax } else { 1.0 };
                        row.add(b.idx3(i, j, n_n), weight);
                    }
                }
                rows.push(row.seal(RowBound::Lower(target * gamma[n_n]), "bequest floor"));
            }
        }
        Objective::MaxBequest => {
            let target = options.net_spending.unwrap_or(0.0);
            bounds[g.idx1(0)] = VarBound::fixed(target);
        }
    }

    // ------------------------------------------------------------------
    // 10. Social Security taxability linearization
    // ------------------------------------------------------------------

    if linearized_ss {
        let q = vm.block("q").clone();
        let tss = vm.block("tss").clone();
        let plo = vm.block("plo").clone();
        let phi = vm.block("phi").clone();
        let zs = vm.block("zs").clone();

        for n in 0..n_n {
            let (low, high) = provisional_thresholds(inp.filing_status(n));
            let ss_total = inp.ss_total(n);

            // Provisional income: half the benefit plus other taxable
            // income (withdrawals, conversions, realized gains,
            // dividends).
            let mut prov = RowBuilder::new();
            prov.add(q.idx1(n), 1.0);
            for i in 0..n_i {
                prov.add(w.idx3(i, 1, n), -1.0);
                prov.add(x.idx2(i, n), -1.0);
                prov.add(b.idx3(i, 0, n), -inp.dividend_coefficient(i, n));
            }
            prov.add(f.idx2(1, n), -1.0);
            let rhs = inp.ordinary_income_const(n, 0.0) + 0.5 * ss_total;
            rows.push(prov.seal(RowBound::Fixed(rhs), "provisional income"));

            // tss = 0.5 plo + 0.85 phi.
            let mut stack = RowBuilder::new();
            stack.add(tss.idx1(n), 1.0);
            stack.add(plo.idx1(n), -0.5);
            stack.add(phi.idx1(n), -0.85);
            rows.push(stack.seal(RowBound::Fixed(0.0), "ss stacking"));

            // Uncapped regime (zs[n][0] = 1): the stacked pieces must
            // cover the provisional excess over each threshold.
            let mut low_piece = RowBuilder::new();
            low_piece.add(plo.idx1(n), 1.0);
            low_piece.add(q.idx1(n), -1.0);
            low_piece.add(zs.idx2(n, 1), big_m);
            rows.push(low_piece.seal(RowBound::Lower(-low), "ss 50% piece"));

            let mut high_piece = RowBuilder::new();
            high_piece.add(phi.idx1(n), 1.0);
            high_piece.add(q.idx1(n), -1.0);
            high_piece.add(zs.idx2(n, 1), big_m);
            rows.push(high_piece.seal(RowBound::Lower(-high), "ss 85% piece"));

            // Capped regime (zs[n][1] = 1): taxable SS pinned at 85%.
            let mut cap = RowBuilder::new();
            cap.add(tss.idx1(n), 1.0);
            cap.add(zs.idx2(n, 0), big_m);
            rows.push(cap.seal(RowBound::Lower(0.85 * ss_total), "ss cap"));

            let mut choose = RowBuilder::new();
            choose.add(zs.idx2(n, 0), 1.0);
            choose.add(zs.idx2(n, 1), 1.0);
            rows.push(choose.seal(RowBound::Fixed(1.0), "ss regime"));
        }
    }

    // ------------------------------------------------------------------
    // 11. IRMAA bracket selection
    // ------------------------------------------------------------------

    if matches!(options.with_medicare, MedicareMode::Optimize) {
        let h = vm.block("h").clone();
        let zm = vm.block("zm").clone();
        let m = vm.block("m").clone();
        const EPS: f64 = 1.0;

        for n in 0..n_med {
            let eligible = irmaa_costs[n][0] > 0.0;
            if !eligible {
                for qq in 0..medicare::N_IRMAA {
                    bounds[h.idx2(n, qq)] = VarBound::fixed(0.0);
                    bounds[zm.idx2(n, qq)] =
                        VarBound::fixed(if qq == 0 { 1.0 } else { 0.0 });
                }
                bounds[m.idx1(n)] = VarBound::fixed(0.0);
                continue;
            }

            // Exactly one bracket.
            let mut one = RowBuilder::new();
            for qq in 0..medicare::N_IRMAA {
                one.add(zm.idx2(n, qq), 1.0);
            }
            rows.push(one.seal(RowBound::Fixed(1.0), "irmaa one bracket"));

            // The lookback MAGI distributes into the h selectors. The
            // first two premium years depend on pre-plan MAGI and are
            // handled as constants by the loop, so the selector rows
            // here bind only the in-plan lookback years.
            let mut magi = RowBuilder::new();
            for qq in 0..medicare::N_IRMAA {
                magi.add(h.idx2(n, qq), 1.0);
            }
            let rhs = if n < 2 {
                options.previous_magis[n]
            } else {
                let lb = n - 2;
                for i in 0..n_i {
                    magi.add(w.idx3(i, 1, lb), -1.0);
                    magi.add(x.idx2(i, lb), -1.0);
                    magi.add(b.idx3(i, 0, lb), -inp.dividend_coefficient(i, lb));
                }
                magi.add(f.idx2(1, lb), -1.0);
                let taxable_ss = match options.ss_taxability {
                    SsTaxability::Fixed(fraction) => fraction * inp.ss_total(lb),
                    _ => inp.sc.psi[lb] * inp.ss_total(lb),
                };
                inp.ordinary_income_const(lb, taxable_ss)
            };
            rows.push(magi.seal(RowBound::Fixed(rhs), "irmaa magi"));

            for qq in 0..medicare::N_IRMAA {
                // h is live only in the selected bracket, and within the
                // bracket's thresholds: L[q] <= h < L[q+1].
                let mut gate = RowBuilder::new();
                gate.add(h.idx2(n, qq), 1.0);
                gate.add(zm.idx2(n, qq), -big_m);
                rows.push(gate.seal(RowBound::Upper(0.0), "irmaa gate"));

                let mut floor = RowBuilder::new();
                floor.add(h.idx2(n, qq), 1.0);
                floor.add(zm.idx2(n, qq), -irmaa_thresholds[n][qq]);
                rows.push(floor.seal(RowBound::Lower(0.0), "irmaa floor"));

                if qq + 1 < medicare::N_IRMAA {
                    let mut ceil = RowBuilder::new();
                    ceil.add(h.idx2(n, qq), 1.0);
                    ceil.add(zm.idx2(n, qq), -(irmaa_thresholds[n][qq + 1] - EPS));
                    rows.push(ceil.seal(RowBound::Upper(0.0), "irmaa ceiling"));
                }
            }

            // Premium follows the selected bracket.
            let mut premium = RowBuilder::new();
            premium.add(m.idx1(n), 1.0);
            for qq in 0..medicare::N_IRMAA {
                premium.add(zm.idx2(n, qq), -irmaa_costs[n][qq]);
            }
            rows.push(premium.seal(RowBound::Fixed(0.0), "irmaa premium"));
        }
    }

    // ------------------------------------------------------------------
    // 12. XOR between Roth conversion and taxable withdrawal
    // ------------------------------------------------------------------

    if options.xor_constraints {
        let zx = vm.block("zx").clone();
        for n in 0..n_n {
            let mut withdraw = RowBuilder::new();
            for i in 0..n_i {
                withdraw.add(w.idx3(i, 0, n), 1.0);
            }
            withdraw.add(zx.idx2(n, 0), -big_m);
            rows.push(withdraw.seal(RowBound::Upper(0.0), "xor withdrawal"));

            let mut convert = RowBuilder::new();
            for i in 0..n_i {
                convert.add(x.idx2(i, n), 1.0);
            }
            convert.add(zx.idx2(n, 1), -big_m);
            rows.push(convert.seal(RowBound::Upper(0.0), "xor conversion"));

            let mut either = RowBuilder::new();
            either.add(zx.idx2(n, 0), 1.0);
            either.add(zx.idx2(n, 1), 1.0);
            rows.push(either.seal(RowBound::Upper(1.0), "xor choice"));
        }
    }

    // ------------------------------------------------------------------
    // Objective
    // ------------------------------------------------------------------

    let mut objective_vec = vec![0.0; vm.nvars()];
    match objective {
        Objective::MaxSpending => {
            for n in 0..n_n {
                objective_vec[g.idx1(n)] = 1.0 / gamma[n];
            }
        }
        Objective::MaxBequest => {
            for i in 0..n_i {
                for j in 0..N_ACCOUNTS {
                    let weight = if j == 1 { 1.0 - inp.heirs_tax } else { 1.0 };
                    objective_vec[b.idx3(i, j, n_n)] = weight;
                }
            }
        }
    }

    let problem = MilpProblem {
        nvars: vm.nvars(),
        nconts: vm.nconts(),
        rows,
        var_bounds: bounds,
        objective: objective_vec,
    };
    problem.assert_consistent();
    (vm, problem)
}
