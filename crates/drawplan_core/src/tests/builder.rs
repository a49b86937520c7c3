//! Structure tests for the emitted MILP.
//!
//! The builder is exercised with synthesized inputs so the matrix shape,
//! variable families, bounds, and row families can be asserted without a
//! real solver.

use approx::assert_relative_eq;

use crate::allocation::{AllocationRatios, AlphaSeries, InterpolationMethod, interpolate};
use crate::medicare;
use crate::milp::RowBound;
use crate::milp::builder::{LpInputs, build_problem};
use crate::plan::{MedicareMode, Objective, SolveOptions, SsTaxability};
use crate::profile::AlignedTimeList;
use crate::rates::N_ASSETS;
use crate::rmd;
use crate::scloop::ScState;
use crate::social_security;
use crate::spending::{ProfileKind, SmileParams, spending_profile};
use crate::tax::{self, N_TAX_BRACKETS, TaxSchedule};

use super::TEST_YEAR;

/// Owns every series an [`LpInputs`] borrows.
struct Fixture {
    n_i: usize,
    n_n: usize,
    n_d: usize,
    i_d: usize,
    horizons: Vec<usize>,
    yobs: Vec<i32>,
    gamma: Vec<f64>,
    tau: Vec<[f64; N_ASSETS]>,
    alpha: AlphaSeries,
    tax: TaxSchedule,
    rho: Vec<Vec<f64>>,
    pension: Vec<Vec<f64>>,
    ss: Vec<Vec<f64>>,
    xi: Vec<f64>,
    balances: Vec<[f64; 3]>,
    lists: Vec<AlignedTimeList>,
    flows: Vec<f64>,
    roth_history: Vec<[f64; 5]>,
    sc: ScState,
}

impl Fixture {
    /// A 75-year-old single filer with an 8-year horizon, already
    /// claiming Social Security and past RMD age.
    fn single() -> Fixture {
        let n_n = 8;
        let yobs = vec![TEST_YEAR - 75];
        let horizons = vec![n_n];
        let tau = vec![[0.06, 0.04, 0.03, 0.025]; n_n];
        let mut gamma = vec![1.0];
        for row in &tau {
            gamma.push(gamma.last().unwrap() * (1.0 + row[3]));
        }
        let ratios = AllocationRatios::Individual(vec![[
            [60.0, 40.0, 0.0, 0.0],
            [70.0, 30.0, 0.0, 0.0],
        ]]);
        let alpha = interpolate(&ratios, InterpolationMethod::Linear, 15.0, 5.0, 1, n_n).unwrap();
        let tax = tax::tax_schedule(&yobs, 0, n_n, n_n, TEST_YEAR, 2032);
        let rho = rmd::rmd_fractions(&yobs, n_n, TEST_YEAR);
        let ss = social_security::benefit_series(
            &[2_000.0],
            &[66.0],
            &yobs,
            &[1],
            &horizons,
            n_n,
            n_n,
            TEST_YEAR,
        );
        let xi = spending_profile(ProfileKind::Flat, &SmileParams::default(), 1.0, n_n, n_n);
        Fixture {
            n_i: 1,
            n_n,
            n_d: n_n,
            i_d: 0,
            horizons,
            yobs,
            gamma,
            tau,
            alpha,
            tax,
            rho,
            pension: vec![vec![0.0; n_n]],
            ss,
            xi,
            balances: vec![[50_000.0, 300_000.0, 40_000.0]],
            lists: vec![AlignedTimeList::zeros(n_n)],
            flows: vec![0.0; n_n],
            roth_history: vec![[0.0; 5]],
            sc: ScState::initial(n_n),
        }
    }

    /// A couple where the older spouse dies four years in.
    fn couple() -> Fixture {
        let n_n = 10;
        let n_d = 4;
        let yobs = vec![TEST_YEAR - 78, TEST_YEAR - 70];
        let horizons = vec![n_d, n_n];
        let tau = vec![[0.06, 0.04, 0.03, 0.02]; n_n];
        let mut gamma = vec![1.0];
        for row in &tau {
            gamma.push(gamma.last().unwrap() * (1.0 + row[3]));
        }
        let ratios = AllocationRatios::Spouses([
            [60.0, 40.0, 0.0, 0.0],
            [70.0, 30.0, 0.0, 0.0],
        ]);
        let alpha = interpolate(&ratios, InterpolationMethod::Linear, 15.0, 5.0, 2, n_n).unwrap();
        let tax = tax::tax_schedule(&yobs, 0, n_d, n_n, TEST_YEAR, 2032);
        let rho = rmd::rmd_fractions(&yobs, n_n, TEST_YEAR);
        let ss = social_security::benefit_series(
            &[2_500.0, 1_500.0],
            &[66.0, 66.0],
            &yobs,
            &[1, 1],
            &horizons,
            n_d,
            n_n,
            TEST_YEAR,
        );
        let xi = spending_profile(ProfileKind::Flat, &SmileParams::default(), 0.6, n_d, n_n);
        Fixture {
            n_i: 2,
            n_n,
            n_d,
            i_d: 0,
            horizons,
            yobs,
            gamma,
            tau,
            alpha,
            tax,
            rho,
            pension: vec![vec![0.0; n_n]; 2],
            ss,
            xi,
            balances: vec![[90_000.0, 600_000.0, 70_000.0], [60_000.0, 150_000.0, 40_000.0]],
            lists: vec![AlignedTimeList::zeros(n_n); 2],
            flows: vec![0.0; n_n],
            roth_history: vec![[0.0; 5]; 2],
            sc: ScState::initial(n_n),
        }
    }

    fn inputs(&self) -> LpInputs<'_> {
        LpInputs {
            n_i: self.n_i,
            n_n: self.n_n,
            n_d: self.n_d,
            i_d: self.i_d,
            horizons: &self.horizons,
            yobs: &self.yobs,
            this_year: TEST_YEAR,
            gamma: &self.gamma,
            tau: &self.tau,
            alpha: &self.alpha,
            tax: &self.tax,
            rho: &self.rho,
            pension: &self.pension,
            ss: &self.ss,
            xi: &self.xi,
            balances: &self.balances,
            lists: &self.lists,
            asset_debt_flows: &self.flows,
            beneficiary: [1.0, 1.0, 1.0],
            surplus_fraction: 0.5,
            dividend_rate: 0.018,
            heirs_tax: 0.30,
            roth_history: &self.roth_history,
            sc: &self.sc,
        }
    }
}

fn count_label(problem: &crate::milp::MilpProblem, label: &str) -> usize {
    problem.rows.iter().filter(|r| r.label == label).count()
}

#[test]
fn test_variable_layout_continuous_then_binary() {
    let fixture = Fixture::single();
    let options = SolveOptions {
        xor_constraints: true,
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);

    assert_eq!(problem.nvars, vm.nvars());
    assert_eq!(problem.nconts, vm.nconts());
    assert_eq!(vm.nbins(), fixture.n_n * 2);
    // Every binary block sits after the marker.
    assert!(vm.block("zx").start() >= vm.nconts());
    assert!(vm.block("b").end() <= vm.nconts());
    assert_eq!(vm.nbals(), fixture.n_i * 3 * (fixture.n_n + 1));
}

#[test]
fn test_medicare_mode_controls_blocks() {
    let fixture = Fixture::single();
    let base = SolveOptions::default();

    let none = SolveOptions {
        with_medicare: MedicareMode::None,
        ..base.clone()
    };
    let (vm, _) = build_problem(&fixture.inputs(), Objective::MaxSpending, &none);
    assert!(!vm.contains("m"));
    assert!(!vm.contains("zm"));

    let loop_mode = SolveOptions {
        with_medicare: MedicareMode::Loop,
        ..base.clone()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &loop_mode);
    assert!(vm.contains("m"));
    assert!(!vm.contains("zm"));
    // Loop mode pins the premium variable to the SC coefficients.
    let m = vm.block("m");
    for n in 0..fixture.n_n {
        let bound = problem.var_bounds[m.idx1(n)];
        assert_eq!(bound.lower, bound.upper);
    }

    let optimize = SolveOptions {
        with_medicare: MedicareMode::Optimize,
        ..base
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &optimize);
    assert!(vm.contains("m"));
    assert!(vm.contains("h"));
    assert!(vm.contains("zm"));
    // One exactly-one row and one premium row per eligible year.
    assert_eq!(count_label(&problem, "irmaa one bracket"), fixture.n_n);
    assert_eq!(count_label(&problem, "irmaa premium"), fixture.n_n);
    assert_eq!(
        count_label(&problem, "irmaa gate"),
        fixture.n_n * medicare::N_IRMAA
    );
}

#[test]
fn test_ss_linearization_blocks_and_rows() {
    let fixture = Fixture::single();
    let options = SolveOptions {
        ss_taxability: SsTaxability::Linearized,
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);
    for name in ["plo", "phi", "q", "tss", "zs"] {
        assert!(vm.contains(name), "missing block {name}");
    }
    assert_eq!(count_label(&problem, "provisional income"), fixture.n_n);
    assert_eq!(count_label(&problem, "ss regime"), fixture.n_n);
    // The 85% cap is an explicit upper bound on tss.
    let tss = vm.block("tss");
    let inputs = fixture.inputs();
    for n in 0..fixture.n_n {
        assert_relative_eq!(
            problem.var_bounds[tss.idx1(n)].upper,
            0.85 * inputs.ss_total(n),
            epsilon = 1e-9
        );
    }

    let fixed = SolveOptions::default();
    let (vm, _) = build_problem(&fixture.inputs(), Objective::MaxSpending, &fixed);
    assert!(!vm.contains("tss"));
    assert!(!vm.contains("zs"));
}

#[test]
fn test_initial_balances_and_bracket_widths_are_bounds() {
    let fixture = Fixture::single();
    let options = SolveOptions::default();
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);

    let b = vm.block("b");
    for j in 0..3 {
        let bound = problem.var_bounds[b.idx3(0, j, 0)];
        assert_eq!(bound.lower, fixture.balances[0][j]);
        assert_eq!(bound.upper, fixture.balances[0][j]);
    }

    let u = vm.block("u");
    for t in 0..N_TAX_BRACKETS {
        for n in 0..fixture.n_n {
            assert_relative_eq!(
                problem.var_bounds[u.idx2(t, n)].upper,
                fixture.tax.delta[t][n] * fixture.gamma[n],
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn test_rmd_floor_rows_present_past_rmd_age() {
    let fixture = Fixture::single();
    let options = SolveOptions::default();
    let (_, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);
    // Age 75 and beyond: every plan year carries an RMD floor.
    assert_eq!(count_label(&problem, "rmd floor"), fixture.n_n);
}

#[test]
fn test_account_dynamics_row_count_follows_horizons() {
    let fixture = Fixture::couple();
    let options = SolveOptions::default();
    let (_, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);
    let expected = 3 * (fixture.horizons[0] + fixture.horizons[1]);
    assert_eq!(count_label(&problem, "account dynamics"), expected);
    // Surplus-split rows only while both spouses are alive.
    assert_eq!(count_label(&problem, "surplus split"), fixture.n_d);
}

#[test]
fn test_survivor_inherits_beneficiary_fraction() {
    let fixture = Fixture::couple();
    let options = SolveOptions::default();
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);

    let b = vm.block("b");
    // The survivor's dynamics row at the death year references the
    // decedent's estate balance with the grown beneficiary fraction.
    let estate_index = b.idx3(fixture.i_d, 1, fixture.n_d);
    let survivor_next = b.idx3(1, 1, fixture.n_d + 1);
    let row = problem
        .rows
        .iter()
        .find(|r| {
            r.label == "account dynamics"
                && r.terms.iter().any(|&(i, _)| i == survivor_next)
                && r.terms.iter().any(|&(i, _)| i == estate_index)
        })
        .expect("survivor inheritance row");
    let (_, coefficient) = row
        .terms
        .iter()
        .find(|&&(i, _)| i == estate_index)
        .unwrap();
    assert!(*coefficient < 0.0);

    // The decedent's balances are pinned to zero after the estate epoch.
    for n in (fixture.n_d + 1)..=fixture.n_n {
        let bound = problem.var_bounds[b.idx3(fixture.i_d, 0, n)];
        assert_eq!((bound.lower, bound.upper), (0.0, 0.0));
    }
}

#[test]
fn test_objectives_and_bequest_tie_in() {
    let fixture = Fixture::single();

    let spending = SolveOptions {
        bequest: Some(100_000.0),
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &spending);
    assert_eq!(count_label(&problem, "bequest floor"), 1);
    let g = vm.block("g");
    for n in 0..fixture.n_n {
        assert_relative_eq!(
            problem.objective[g.idx1(n)],
            1.0 / fixture.gamma[n],
            epsilon = 1e-12
        );
    }
    // The floor is stated in inflated dollars.
    let floor = problem
        .rows
        .iter()
        .find(|r| r.label == "bequest floor")
        .unwrap();
    match floor.bound {
        RowBound::Lower(rhs) => {
            assert_relative_eq!(rhs, 100_000.0 * fixture.gamma[fixture.n_n], epsilon = 1e-6);
        }
        _ => panic!("bequest floor must be a lower bound"),
    }

    let bequest = SolveOptions {
        net_spending: Some(80_000.0),
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxBequest, &bequest);
    let g0 = problem.var_bounds[vm.block("g").idx1(0)];
    assert_eq!((g0.lower, g0.upper), (80_000.0, 80_000.0));
    let b = vm.block("b");
    // Terminal tax-deferred dollars count net of the heirs' rate.
    assert_relative_eq!(problem.objective[b.idx3(0, 0, fixture.n_n)], 1.0);
    assert_relative_eq!(problem.objective[b.idx3(0, 1, fixture.n_n)], 0.70);
}

#[test]
fn test_roth_conversion_gating() {
    let fixture = Fixture::single();
    let options = SolveOptions {
        max_roth_conversion: Some(100_000.0),
        start_roth_conversions: Some(TEST_YEAR + 3),
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);
    let x = vm.block("x");
    // Gated off before the start year (no planned conversions -> zero).
    for n in 0..3 {
        let bound = problem.var_bounds[x.idx2(0, n)];
        assert_eq!((bound.lower, bound.upper), (0.0, 0.0));
    }
    // Ceiling is indexed from the start year on.
    for n in 3..fixture.n_n {
        let bound = problem.var_bounds[x.idx2(0, n)];
        assert_relative_eq!(bound.upper, 100_000.0 * fixture.gamma[n], epsilon = 1e-9);
    }

    let disabled = SolveOptions {
        no_roth_conversions: true,
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &disabled);
    let x = vm.block("x");
    for n in 0..fixture.n_n {
        assert_eq!(problem.var_bounds[x.idx2(0, n)].upper, 0.0);
    }
}

#[test]
fn test_profile_slack_rows() {
    let fixture = Fixture::single();
    let hard = SolveOptions::default();
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &hard);
    assert_eq!(count_label(&problem, "profile"), fixture.n_n - 1);
    assert_eq!(count_label(&problem, "profile slack+"), 0);
    let s = vm.block("s");
    for n in 0..fixture.n_n {
        let bound = problem.var_bounds[s.idx1(n)];
        assert_eq!((bound.lower, bound.upper), (0.0, 0.0));
    }

    let slack = SolveOptions {
        spending_slack: 10.0,
        ..SolveOptions::default()
    };
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &slack);
    assert_eq!(count_label(&problem, "profile slack+"), fixture.n_n - 1);
    assert_eq!(count_label(&problem, "profile slack-"), fixture.n_n - 1);
    let s = vm.block("s");
    assert!(problem.var_bounds[s.idx1(1)].lower.is_infinite());
}

#[test]
fn test_five_year_maturation_rows() {
    let fixture = Fixture::single();
    let options = SolveOptions::default();
    let (vm, problem) = build_problem(&fixture.inputs(), Objective::MaxSpending, &options);
    assert_eq!(count_label(&problem, "roth maturation"), fixture.n_n);

    // From year five on, earlier conversions enter the matured side.
    let x = vm.block("x");
    let late_row = problem
        .rows
        .iter()
        .filter(|r| r.label == "roth maturation")
        .last()
        .unwrap();
    assert!(late_row.terms.iter().any(|&(i, c)| i == x.idx2(0, 0) && c == -1.0));
}
