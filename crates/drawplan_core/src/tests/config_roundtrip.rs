//! Configuration round-trip tests.
//!
//! The tree itself is format-agnostic; serde_json stands in for the
//! on-disk representation here.

use serde_json::json;

use crate::config::Config;
use crate::plan::{MedicareMode, Objective, SsTaxability};
use crate::rates::{CorrelationSpec, RateModel};

fn couple_config() -> Config {
    serde_json::from_value(json!({
        "case_name": "jack+jill",
        "description": "reference couple",
        "basic_info": {
            "status": "married",
            "names": ["Jack", "Jill"],
            "date_of_birth": ["1964-01-15", "1967-01-16"],
            "life_expectancy": [82, 79],
            "start_date": "01-01"
        },
        "savings_assets": {
            "taxable_savings_balances": [90.0, 60.0],
            "tax_deferred_savings_balances": [600.0, 150.0],
            "tax_free_savings_balances": [70.0, 40.0],
            "beneficiary_fractions": [1.0, 1.0, 1.0],
            "spousal_surplus_deposit_fraction": 0.5
        },
        "fixed_income": {
            "pension_monthly_amounts": [0.0, 10.0],
            "pension_ages": [65.0, 65.0],
            "pension_indexed": [false, false],
            "social_security_pia_amounts": [2333.0, 2083.0],
            "social_security_ages": [67.0, 70.0]
        },
        "rates_selection": {
            "method": "historical",
            "from": 1969,
            "to": 2002,
            "reverse_sequence": false,
            "roll_sequence": 0,
            "heirs_rate_on_tax_deferred_estate": 30.0,
            "dividend_rate": 1.8,
            "obbba_expiration_year": 2032
        },
        "asset_allocation": {
            "interpolation_method": "s-curve",
            "interpolation_center": 15.0,
            "interpolation_width": 5.0,
            "type": "individual",
            "generic": [
                [[60.0, 40.0, 0.0, 0.0], [70.0, 30.0, 0.0, 0.0]],
                [[50.0, 50.0, 0.0, 0.0], [70.0, 30.0, 0.0, 0.0]]
            ]
        },
        "optimization_parameters": {
            "spending_profile": "flat",
            "surviving_spouse_spending_percent": 60.0,
            "objective": "maxSpending"
        },
        "solver_options": {
            "maxRothConversion": 100.0,
            "bequest": 500.0,
            "previousMAGIs": [80.0, 85.0],
            "withSSTaxability": 0.85,
            "solver": "HiGHS"
        }
    }))
    .unwrap()
}

#[test]
fn test_config_builds_plan_and_round_trips() {
    let config = couple_config();
    let plan = config.build_plan().unwrap();
    assert_eq!(plan.n_individuals(), 2);
    assert_eq!(
        plan.rate_model(),
        Some(&RateModel::Historical { frm: 1969, to: 2002 })
    );

    let back = Config::from_plan(&plan);
    assert_eq!(back.case_name, config.case_name);
    assert_eq!(back.basic_info, config.basic_info);
    assert_eq!(back.savings_assets, config.savings_assets);
    assert_eq!(back.fixed_income, config.fixed_income);
    assert_eq!(back.asset_allocation, config.asset_allocation);
    assert_eq!(
        back.rates_selection.method,
        config.rates_selection.method
    );
    assert_eq!(back.rates_selection.from, config.rates_selection.from);
    assert_eq!(back.rates_selection.to, config.rates_selection.to);

    // Rebuilding from the emitted config yields the same rate series.
    let rebuilt = back.build_plan().unwrap();
    assert_eq!(rebuilt.rate_series(), plan.rate_series());
}

#[test]
fn test_solver_options_scaling_and_defaults() {
    let config = couple_config();
    let options = config.solve_options();
    assert_eq!(options.max_roth_conversion, Some(100_000.0));
    assert_eq!(options.bequest, Some(500_000.0));
    assert_eq!(options.previous_magis, [80_000.0, 85_000.0]);
    assert_eq!(options.ss_taxability, SsTaxability::Fixed(0.85));
    assert_eq!(options.with_medicare, MedicareMode::Loop);
    assert!(options.with_sc_loop);
    assert_eq!(config.objective(), Objective::MaxSpending);
}

#[test]
fn test_unknown_sections_pass_through() {
    let mut value = serde_json::to_value(couple_config()).unwrap();
    value.as_object_mut().unwrap().insert(
        "results".to_string(),
        json!({ "default_plots": "nominal" }),
    );
    let config: Config = serde_json::from_value(value).unwrap();
    assert!(config.extra.contains_key("results"));

    let emitted = serde_json::to_value(&config).unwrap();
    assert_eq!(
        emitted.get("results"),
        Some(&json!({ "default_plots": "nominal" }))
    );
}

#[test]
fn test_reverse_roll_persisted_and_reapplied() {
    let mut config = couple_config();
    config.rates_selection.method = "historical".to_string();
    config.rates_selection.from = Some(1970);
    config.rates_selection.to = Some(1980);
    config.rates_selection.reverse_sequence = true;
    config.rates_selection.roll_sequence = 4;

    let plan = config.build_plan().unwrap();
    assert!(plan.rate_reverse());
    assert_eq!(plan.rate_roll(), 4);

    let back = Config::from_plan(&plan);
    assert!(back.rates_selection.reverse_sequence);
    assert_eq!(back.rates_selection.roll_sequence, 4);

    // Reloading reproduces the transformed series exactly.
    let reloaded = back.build_plan().unwrap();
    assert_eq!(reloaded.rate_series(), plan.rate_series());
}

#[test]
fn test_stochastic_seed_round_trip() {
    let mut config = couple_config();
    config.rates_selection.method = "stochastic".to_string();
    config.rates_selection.from = None;
    config.rates_selection.to = None;
    config.rates_selection.values = Some([8.0, 5.0, 4.0, 3.0]);
    config.rates_selection.standard_deviations = Some([17.0, 8.0, 8.0, 2.0]);
    config.rates_selection.correlations = Some(CorrelationSpec::UpperTriangle([
        0.2, 0.1, 0.0, 0.3, 0.1, 0.2,
    ]));
    config.rates_selection.rate_seed = Some(12_345);
    config.rates_selection.reproducible_rates = Some(true);

    let plan = config.build_plan().unwrap();
    let back = Config::from_plan(&plan);
    assert_eq!(back.rates_selection.rate_seed, Some(12_345));
    assert_eq!(back.rates_selection.reproducible_rates, Some(true));

    // Same seed, same draws.
    let replay = back.build_plan().unwrap();
    assert_eq!(replay.rate_series(), plan.rate_series());
}

#[test]
fn test_config_validation_failures() {
    let mut config = couple_config();
    config.basic_info.status = "divorced".to_string();
    assert!(config.build_plan().is_err());

    let mut config = couple_config();
    config.basic_info.names.pop();
    assert!(config.build_plan().is_err());

    let mut config = couple_config();
    config.rates_selection.method = "mystery".to_string();
    assert!(config.build_plan().is_err());

    // Death before the plan start is rejected at the boundary.
    let mut config = couple_config();
    config.basic_info.life_expectancy = vec![40, 79];
    assert!(config.build_plan().is_err());
}
