use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use cpf_pension_core::cpf::payout::{self, PayoutInput, PayoutScheme};
use cpf_pension_core::cpf::policy::{CpfPolicy, PolicyYear, RetirementSumTier};
use cpf_pension_core::cpf::scenario::{self, PensionScenarioInput, ScenarioEngine};
use cpf_pension_core::cpf::simulation::{self, SimulationInput};
use cpf_pension_core::types::Frequency;

use crate::input;

// ---------------------------------------------------------------------------
// Flag parsing
// ---------------------------------------------------------------------------

fn parse_policy_year(year: &str) -> Result<PolicyYear, Box<dyn std::error::Error>> {
    match year {
        "2024" => Ok(PolicyYear::Y2024),
        "2025" => Ok(PolicyYear::Y2025),
        other => Err(format!("Unknown policy year '{other}' (expected 2024 or 2025)").into()),
    }
}

fn parse_frequency(frequency: &str) -> Result<Frequency, Box<dyn std::error::Error>> {
    match frequency.to_lowercase().as_str() {
        "annual" => Ok(Frequency::Annual),
        "monthly" => Ok(Frequency::Monthly),
        other => Err(format!("Unknown frequency '{other}' (expected annual or monthly)").into()),
    }
}

fn parse_scheme(scheme: &str) -> Result<PayoutScheme, Box<dyn std::error::Error>> {
    match scheme.to_lowercase().as_str() {
        "level" => Ok(PayoutScheme::Level),
        "growing" => Ok(PayoutScheme::Growing),
        other => Err(format!("Unknown payout scheme '{other}' (expected level or growing)").into()),
    }
}

fn parse_tier(tier: &str) -> Result<RetirementSumTier, Box<dyn std::error::Error>> {
    match tier.to_lowercase().as_str() {
        "basic" => Ok(RetirementSumTier::Basic),
        "full" => Ok(RetirementSumTier::Full),
        "enhanced" => Ok(RetirementSumTier::Enhanced),
        other => Err(format!("Unknown retirement sum '{other}' (expected basic, full or enhanced)").into()),
    }
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

/// Arguments for a lifetime contribution simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Monthly salary
    #[arg(long)]
    pub salary: Option<Decimal>,

    /// Age at the first simulated year
    #[arg(long)]
    pub start_age: Option<u32>,

    /// First age that is no longer a working year
    #[arg(long)]
    pub retirement_age: Option<u32>,

    /// Annual salary growth rate
    #[arg(long, default_value = "0")]
    pub salary_growth: Decimal,

    /// Retirement sum targeted at the transfer: basic, full, enhanced
    #[arg(long, default_value = "full")]
    pub target: String,

    /// Contribution schedule year: 2024 or 2025
    #[arg(long, default_value = "2025")]
    pub policy_year: String,

    /// Print only the year-by-year ledger
    #[arg(long)]
    pub ledger: bool,

    /// Fail when retirement precedes the transfer age
    #[arg(long)]
    pub strict: bool,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sim_input: SimulationInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let monthly_salary = args
            .salary
            .ok_or("--salary is required (or provide --input)")?;
        let start_age = args
            .start_age
            .ok_or("--start-age is required (or provide --input)")?;
        let retirement_age = args
            .retirement_age
            .ok_or("--retirement-age is required (or provide --input)")?;

        SimulationInput {
            monthly_salary,
            start_age,
            retirement_age,
            monthly_wage_ceiling: None,
            annual_contribution_cap: None,
            salary_growth_rate: args.salary_growth,
            contribute_after_transfer: true,
            retirement_sum_target: parse_tier(&args.target)?,
            opening_balances: Default::default(),
            policy: CpfPolicy::for_year(parse_policy_year(&args.policy_year)?),
        }
    };

    let result = simulation::simulate_contributions(&sim_input)?;
    if args.strict {
        result.result.require_complete_setup()?;
    }
    if args.ledger {
        return Ok(serde_json::to_value(&result.result.ledger)?);
    }
    Ok(serde_json::to_value(result)?)
}

// ---------------------------------------------------------------------------
// payout
// ---------------------------------------------------------------------------

/// Arguments for annuity payout calculation
#[derive(Args)]
pub struct PayoutArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Retirement balance to annuitise
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Payout scheme: level or growing
    #[arg(long, default_value = "level")]
    pub scheme: String,

    /// Nominal annual rate, compounded monthly
    #[arg(long, default_value = "0.04")]
    pub rate: Decimal,

    /// Payout duration in years
    #[arg(long, default_value = "25")]
    pub years: u32,

    /// Annual escalation for the growing scheme
    #[arg(long)]
    pub escalation: Option<Decimal>,

    /// Include the month-by-month amortisation ledger
    #[arg(long)]
    pub ledger: bool,
}

pub fn run_payout(args: PayoutArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let payout_input: PayoutInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let principal = args
            .principal
            .ok_or("--principal is required (or provide --input)")?;
        PayoutInput {
            principal,
            scheme: parse_scheme(&args.scheme)?,
            nominal_annual_rate: args.rate,
            payout_years: args.years,
            escalation_rate: args.escalation,
        }
    };

    let result = payout::compute_monthly_payout(&payout_input)?;
    let mut value = serde_json::to_value(&result)?;
    if args.ledger {
        let ledger = payout::amortize_schedule(
            payout_input.principal,
            result.result.monthly_rate,
            &result.result.monthly_schedule,
        )?;
        if let Value::Object(ref mut map) = value {
            map.insert("ledger".into(), serde_json::to_value(ledger)?);
        }
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// scenario / cash-flows
// ---------------------------------------------------------------------------

/// Arguments for a full pension scenario
#[derive(Args)]
pub struct ScenarioArgs {
    /// Path to JSON/YAML scenario file; an array runs a batch
    #[arg(long)]
    pub input: Option<String>,

    /// Monthly salary
    #[arg(long)]
    pub salary: Option<Decimal>,

    #[arg(long, default_value = "30")]
    pub start_age: u32,

    #[arg(long, default_value = "65")]
    pub retirement_age: u32,

    /// Age at which payouts stop and residual balances are valued
    #[arg(long, default_value = "90")]
    pub terminal_age: u32,

    /// Payout scheme: level or growing
    #[arg(long, default_value = "level")]
    pub scheme: String,

    /// Cash-flow frequency: annual or monthly
    #[arg(long, default_value = "monthly")]
    pub frequency: String,

    /// Annual escalation for the growing scheme
    #[arg(long)]
    pub escalation: Option<Decimal>,

    /// Discount rate for NPV
    #[arg(long, default_value = "0.03")]
    pub discount_rate: Decimal,

    /// Contribution schedule year: 2024 or 2025
    #[arg(long, default_value = "2025")]
    pub policy_year: String,
}

fn scenario_from_flags(args: &ScenarioArgs) -> Result<PensionScenarioInput, Box<dyn std::error::Error>> {
    let salary = args
        .salary
        .ok_or("--salary is required (or provide --input)")?;
    let mut scenario =
        PensionScenarioInput::new(salary, args.start_age, args.retirement_age, args.terminal_age);
    scenario.payout_scheme = parse_scheme(&args.scheme)?;
    scenario.frequency = parse_frequency(&args.frequency)?;
    scenario.escalation_rate = args.escalation;
    scenario.discount_rate = args.discount_rate;
    scenario.policy = CpfPolicy::for_year(parse_policy_year(&args.policy_year)?);
    if scenario.payout_scheme == PayoutScheme::Growing && scenario.escalation_rate.is_none() {
        scenario.escalation_rate = Some(dec!(0.02));
    }
    Ok(scenario)
}

fn read_scenarios(args: &ScenarioArgs) -> Result<Vec<PensionScenarioInput>, Box<dyn std::error::Error>> {
    let data = if let Some(ref path) = args.input {
        Some(input::file::read_value(path)?)
    } else {
        input::stdin::read_stdin()?
    };
    match data {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect(),
        Some(item) => Ok(vec![serde_json::from_value(item)?]),
        None => Ok(vec![scenario_from_flags(args)?]),
    }
}

pub fn run_scenario(args: ScenarioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let scenarios = read_scenarios(&args)?;
    if scenarios.len() == 1 {
        let result = scenario::evaluate_scenario(&scenarios[0])?;
        return Ok(serde_json::to_value(result)?);
    }

    // Batch: one failed scenario is reported, not fatal
    let mut engine = ScenarioEngine::default();
    let results: Vec<Value> = engine
        .evaluate_all(&scenarios)
        .into_iter()
        .map(|outcome| match outcome {
            Ok(snapshot) => serde_json::to_value(snapshot.as_ref())
                .unwrap_or_else(|e| json!({ "error": e.to_string() })),
            Err(e) => json!({ "error": e.to_string() }),
        })
        .collect();
    Ok(json!({
        "results": results,
        "cache": engine.cache_stats(),
    }))
}

pub fn run_cash_flows(args: ScenarioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let scenarios = read_scenarios(&args)?;
    let first = scenarios.first().ok_or("No scenario supplied")?;
    let result = scenario::evaluate_scenario(first)?;
    Ok(serde_json::to_value(&result.result.cash_flow_detail)?)
}

// ---------------------------------------------------------------------------
// policy
// ---------------------------------------------------------------------------

/// Arguments for printing a contribution schedule
#[derive(Args)]
pub struct PolicyArgs {
    /// Schedule year: 2024 or 2025
    #[arg(long, default_value = "2025")]
    pub year: String,

    /// Section to print: rates, allocation, or all
    #[arg(long, default_value = "all")]
    pub section: String,
}

pub fn run_policy(args: PolicyArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let policy = CpfPolicy::for_year(parse_policy_year(&args.year)?);
    policy.validate()?;

    let hundred = dec!(100);
    match args.section.as_str() {
        "rates" => Ok(Value::Array(
            policy
                .contribution
                .rate_bands
                .iter()
                .map(|band| {
                    json!({
                        "from_age": band.from_age,
                        "employee_pct": (band.rates.employee * hundred).normalize().to_string(),
                        "employer_pct": (band.rates.employer * hundred).normalize().to_string(),
                        "total_pct": (band.rates.total() * hundred).normalize().to_string(),
                    })
                })
                .collect(),
        )),
        "allocation" => Ok(Value::Array(
            policy
                .contribution
                .allocation_bands
                .iter()
                .map(|band| {
                    json!({
                        "from_age": band.from_age,
                        "ordinary": band.shares.ordinary.round_dp(6).to_string(),
                        "special_or_retirement": band.shares.special_or_retirement.round_dp(6).to_string(),
                        "medisave": band.shares.medisave.round_dp(6).to_string(),
                    })
                })
                .collect(),
        )),
        "all" => Ok(serde_json::to_value(&policy)?),
        other => Err(format!("Unknown section '{other}' (expected rates, allocation or all)").into()),
    }
}
