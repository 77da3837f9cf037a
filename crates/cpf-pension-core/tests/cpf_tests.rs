use cpf_pension_core::cpf::accounts::AccountBalances;
use cpf_pension_core::cpf::cash_flows::CashFlowCategory;
use cpf_pension_core::cpf::payout::{amortize_schedule, compute_monthly_payout, PayoutInput, PayoutScheme};
use cpf_pension_core::cpf::policy::{CpfPolicy, PolicyYear, RetirementSumTier, RetirementSums};
use cpf_pension_core::cpf::scenario::{evaluate_scenario, PensionScenarioInput, ScenarioEngine};
use cpf_pension_core::cpf::simulation::{simulate_contributions, SimulationInput};
use cpf_pension_core::types::Frequency;
use cpf_pension_core::CpfError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn simulation(monthly_salary: Decimal, start_age: u32, retirement_age: u32) -> SimulationInput {
    SimulationInput {
        monthly_salary,
        start_age,
        retirement_age,
        monthly_wage_ceiling: Some(dec!(7_400)),
        annual_contribution_cap: Some(dec!(37_740)),
        salary_growth_rate: Decimal::ZERO,
        contribute_after_transfer: true,
        retirement_sum_target: RetirementSumTier::Full,
        opening_balances: AccountBalances::default(),
        policy: CpfPolicy::default(),
    }
}

fn reference_scenario() -> PensionScenarioInput {
    let mut input = PensionScenarioInput::new(dec!(8_000), 30, 65, 90);
    input.monthly_wage_ceiling = Some(dec!(7_400));
    input.annual_contribution_cap = Some(dec!(37_740));
    input
}

// ===========================================================================
// Policy tables
// ===========================================================================

#[test]
fn test_allocation_shares_sum_to_one_at_every_age() {
    for year in [PolicyYear::Y2024, PolicyYear::Y2025] {
        let policy = CpfPolicy::for_year(year);
        for age in 0..=100 {
            let sum = policy.allocation_for(age).sum();
            assert!(
                (sum - Decimal::ONE).abs() <= dec!(0.000000001),
                "{year:?} age {age}: shares sum to {sum}"
            );
        }
    }
}

#[test]
fn test_rates_within_unit_interval() {
    for year in [PolicyYear::Y2024, PolicyYear::Y2025] {
        let policy = CpfPolicy::for_year(year);
        for age in 0..=100 {
            let rates = policy.rate_for(age);
            assert!(rates.employee >= Decimal::ZERO && rates.employee <= Decimal::ONE);
            assert!(rates.employer >= Decimal::ZERO && rates.employer <= Decimal::ONE);
        }
    }
}

#[test]
fn test_default_policy_is_2025() {
    assert_eq!(CpfPolicy::default(), CpfPolicy::for_year(PolicyYear::Y2025));
    assert_eq!(
        CpfPolicy::default().retirement_sums,
        RetirementSums {
            basic: dec!(106_500),
            full: dec!(213_000),
            enhanced: dec!(426_000),
        }
    );
}

#[test]
fn test_policy_json_round_trip() {
    let policy = CpfPolicy::for_year(PolicyYear::Y2024);
    let json = serde_json::to_string(&policy).unwrap();
    let back: CpfPolicy = serde_json::from_str(&json).unwrap();
    assert_eq!(back, policy);
}

// ===========================================================================
// End-to-end reference scenario
// ===========================================================================

#[test]
fn test_reference_scenario_ordinary_grows_until_transfer() {
    let sim = simulate_contributions(&simulation(dec!(8_000), 30, 65))
        .unwrap()
        .result;
    let pre_transfer: Vec<_> = sim.ledger.iter().filter(|y| y.age < 55).collect();
    assert_eq!(pre_transfer.len(), 25);
    for pair in pre_transfer.windows(2) {
        assert!(
            pair[1].balances.ordinary > pair[0].balances.ordinary,
            "ordinary fell between ages {} and {}",
            pair[0].age,
            pair[1].age
        );
    }
}

#[test]
fn test_reference_scenario_single_transfer_at_55() {
    let sim = simulate_contributions(&simulation(dec!(8_000), 30, 65))
        .unwrap()
        .result;
    let at = |age: u32| sim.ledger.iter().find(|y| y.age == age).unwrap();

    assert_eq!(at(54).balances.retirement, Decimal::ZERO);
    assert!(at(54).balances.special > Decimal::ZERO);
    assert_eq!(at(55).balances.special, Decimal::ZERO);
    assert!(at(55).balances.retirement > Decimal::ZERO);

    let transfer = sim.transfer.as_ref().unwrap();
    assert_eq!(transfer.age, 55);
    assert!(transfer.retirement_after > Decimal::ZERO);
    assert!(transfer.retirement_after <= dec!(213_000));

    // Special never reopens once the Retirement account exists
    assert!(sim
        .ledger
        .iter()
        .filter(|y| y.age >= 55)
        .all(|y| y.balances.special.is_zero()));
}

#[test]
fn test_reference_scenario_contributions_respect_ceiling() {
    let sim = simulate_contributions(&simulation(dec!(8_000), 30, 65))
        .unwrap()
        .result;
    let first = &sim.ledger[0];
    assert_eq!(first.contribution_base, dec!(88_800));
    assert_eq!(first.total_contribution, dec!(32_856));
    assert!(!first.cap_applied);
    assert!(sim
        .ledger
        .iter()
        .all(|y| y.total_contribution <= dec!(37_740)));
}

#[test]
fn test_reference_scenario_outcome() {
    let result = evaluate_scenario(&reference_scenario()).unwrap();
    let out = &result.result;

    assert!(out.monthly_pension > Decimal::ZERO);
    assert!(out.retirement_setup.is_complete());
    assert!(out.final_balances.is_non_negative());
    if let Some(irr) = out.irr {
        assert!(irr > dec!(-1) && irr < dec!(200));
    }
    assert!(out.total_benefits > Decimal::ZERO);
    assert_eq!(
        out.cash_flow_detail
            .iter()
            .filter(|e| e.category == CashFlowCategory::Terminal)
            .count(),
        1
    );
    // 35 work years × 12 + 25 payout years × 12 + terminal
    assert_eq!(out.cash_flow_detail.len(), 420 + 300 + 1);
}

#[test]
fn test_reference_scenario_annual_frequency() {
    let mut input = reference_scenario();
    input.frequency = Frequency::Annual;
    let out = evaluate_scenario(&input).unwrap().result;
    assert_eq!(out.cash_flow_detail.len(), 35 + 25 + 1);
    assert!(out.irr.is_some());
}

#[test]
fn test_terminal_entry_is_dated_at_terminal_age() {
    let mut input = PensionScenarioInput::new(dec!(5_000), 30, 65, 90);
    input.frequency = Frequency::Annual;
    let out = evaluate_scenario(&input).unwrap().result;

    let terminal = out.cash_flow_detail.last().unwrap();
    assert_eq!(terminal.category, CashFlowCategory::Terminal);
    assert_eq!((terminal.period, terminal.age), (60, 90));

    let last_payout = &out.cash_flow_detail[out.cash_flow_detail.len() - 2];
    assert_eq!((last_payout.period, last_payout.age), (59, 89));
}

#[test]
fn test_employee_contributions_only_in_cash_flows() {
    let out = evaluate_scenario(&reference_scenario()).unwrap().result;
    let outflow: Decimal = out
        .cash_flow_detail
        .iter()
        .filter(|e| e.category == CashFlowCategory::Contribution)
        .map(|e| -e.amount)
        .sum();
    assert!((outflow - out.total_employee_contribution).abs() < dec!(0.000001));
    assert!(out.total_employer_contribution > Decimal::ZERO);
}

// ===========================================================================
// Early retirement and strict mode
// ===========================================================================

#[test]
fn test_early_retirement_best_effort() {
    let sim = simulate_contributions(&simulation(dec!(6_000), 25, 50)).unwrap();
    assert!(!sim.result.retirement_setup.is_complete());
    assert_eq!(sim.result.final_balances.retirement, Decimal::ZERO);
    assert!(sim.result.transfer.is_none());
    assert!(!sim.warnings.is_empty());

    match sim.result.require_complete_setup() {
        Err(CpfError::IncompleteRetirementSetup {
            retirement_age,
            transfer_age,
        }) => {
            assert_eq!(retirement_age, 50);
            assert_eq!(transfer_age, 55);
        }
        other => panic!("expected IncompleteRetirementSetup, got {other:?}"),
    }
}

#[test]
fn test_invalid_arguments_propagate() {
    assert!(matches!(
        simulate_contributions(&simulation(dec!(-1), 30, 65)),
        Err(CpfError::InvalidInput { .. })
    ));
    assert!(matches!(
        simulate_contributions(&simulation(dec!(5_000), 40, 40)),
        Err(CpfError::InvalidInput { .. })
    ));
    let payout = PayoutInput {
        principal: dec!(100_000),
        scheme: PayoutScheme::Level,
        nominal_annual_rate: dec!(0.04),
        payout_years: 0,
        escalation_rate: None,
    };
    assert!(matches!(
        compute_monthly_payout(&payout),
        Err(CpfError::InvalidInput { .. })
    ));
}

#[test]
fn test_extreme_rates_fail_cleanly_within_a_batch() {
    let mut runaway_payout = reference_scenario();
    runaway_payout.payout_rate = Some(dec!(2.5));
    runaway_payout.terminal_age = 105;
    let mut runaway_salary = reference_scenario();
    runaway_salary.start_age = 20;
    runaway_salary.salary_growth_rate = dec!(5);
    let mut beyond_horizon = reference_scenario();
    beyond_horizon.terminal_age = u32::MAX;

    let mut engine = ScenarioEngine::new(8);
    let results = engine.evaluate_all(&[
        runaway_payout,
        reference_scenario(),
        runaway_salary,
        beyond_horizon,
    ]);
    assert!(matches!(results[0], Err(CpfError::InvalidInput { .. })));
    assert!(results[1].is_ok());
    assert!(matches!(results[2], Err(CpfError::InvalidInput { .. })));
    assert!(matches!(results[3], Err(CpfError::InvalidInput { .. })));
}

#[test]
fn test_negative_age_rejected_at_boundary() {
    let json = r#"{"monthly_salary":"5000","start_age":-1,"retirement_age":65,"terminal_age":90}"#;
    assert!(serde_json::from_str::<PensionScenarioInput>(json).is_err());
}

#[test]
fn test_scenario_json_defaults() {
    let json = r#"{"monthly_salary":"5000","start_age":30,"retirement_age":65,"terminal_age":90}"#;
    let input: PensionScenarioInput = serde_json::from_str(json).unwrap();
    assert_eq!(input, PensionScenarioInput::new(dec!(5_000), 30, 65, 90));
}

// ===========================================================================
// Monotonicity and caching
// ===========================================================================

#[test]
fn test_retirement_balance_monotone_in_salary() {
    let mut previous = Decimal::ZERO;
    for salary in [0, 1_000, 2_500, 4_000, 6_000, 7_400, 9_000, 20_000] {
        let sim = simulate_contributions(&simulation(Decimal::from(salary), 30, 65))
            .unwrap()
            .result;
        assert!(
            sim.final_balances.retirement >= previous,
            "retirement balance fell at salary {salary}"
        );
        previous = sim.final_balances.retirement;
    }
}

#[test]
fn test_engine_returns_shared_snapshots() {
    let mut engine = ScenarioEngine::new(2);
    let a = engine.evaluate(&reference_scenario()).unwrap();
    let b = engine.evaluate(&reference_scenario()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(a.result.monthly_pension, b.result.monthly_pension);
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn prop_balances_never_negative(
        salary in 0u64..1_000_000_000u64,
        start_age in 16u32..60,
        span in 1u32..20,
        growth_bp in 0u32..800,
    ) {
        let mut input = simulation(Decimal::from(salary), start_age, start_age + span);
        input.salary_growth_rate = Decimal::new(growth_bp as i64, 4);
        let sim = simulate_contributions(&input).unwrap().result;
        for year in &sim.ledger {
            prop_assert!(year.balances.is_non_negative(), "negative balance at age {}", year.age);
        }
        prop_assert!(sim.final_balances.is_non_negative());
    }

    #[test]
    fn prop_transfer_conserves_funds(
        ordinary in 0u64..2_000_000u64,
        special in 0u64..2_000_000u64,
        tier in prop_oneof![
            Just(RetirementSumTier::Basic),
            Just(RetirementSumTier::Full),
            Just(RetirementSumTier::Enhanced),
        ],
    ) {
        let sums = RetirementSums::for_year(PolicyYear::Y2025);
        let mut balances = AccountBalances {
            ordinary: Decimal::from(ordinary),
            special: Decimal::from(special),
            ..AccountBalances::default()
        };
        let event = balances.transfer_to_retirement(55, &sums, tier);
        let transferable = Decimal::from(ordinary) + Decimal::from(special);

        prop_assert_eq!(event.retirement_after + event.ordinary_after, transferable);
        prop_assert_eq!(event.retirement_after, transferable.min(sums.amount_for(tier)));
        prop_assert_eq!(balances.special, Decimal::ZERO);
    }

    #[test]
    fn prop_level_annuity_amortizes(
        principal in 1_000u64..2_000_000u64,
        rate_bp in 0u32..=1_000,
        years in 5u32..=40,
    ) {
        let input = PayoutInput {
            principal: Decimal::from(principal),
            scheme: PayoutScheme::Level,
            nominal_annual_rate: Decimal::new(rate_bp as i64, 4),
            payout_years: years,
            escalation_rate: None,
        };
        let out = compute_monthly_payout(&input).unwrap().result;
        prop_assert_eq!(out.monthly_schedule.len() as u32, years * 12);
        let ledger =
            amortize_schedule(input.principal, out.monthly_rate, &out.monthly_schedule).unwrap();
        prop_assert!(ledger.residual_balance.abs() < dec!(0.01), "residual {}", ledger.residual_balance);
        prop_assert!(out.monthly_schedule.iter().all(|p| *p >= Decimal::ZERO));
    }
}
