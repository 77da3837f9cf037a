use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::cpf::accounts::{AccountBalances, TransferEvent};
use crate::cpf::cache::{CacheStats, LruCache};
use crate::cpf::cash_flows::{build_cash_flows, CashFlowEntry};
use crate::cpf::payout::{amortize_schedule, compute_monthly_payout, PayoutInput, PayoutScheme};
use crate::cpf::policy::{CpfPolicy, RetirementSumTier};
use crate::cpf::simulation::{simulate_contributions, RetirementSetup, SimulationInput, MAX_AGE};
use crate::error::CpfError;
use crate::time_value::{analyze_returns, IrrConfig, IrrSolution, IrrStatus};
use crate::types::{with_metadata, ComputationOutput, Frequency, Money, Rate};
use crate::CpfResult;

/// Default number of scenarios an engine keeps.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Ledger residual above which the level annuity is reported as not
/// amortising cleanly.
const LEDGER_TOLERANCE: Decimal = dec!(0.01);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_discount_rate() -> Rate {
    dec!(0.03)
}

fn default_true() -> bool {
    true
}

/// One member's career and retirement, end to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PensionScenarioInput {
    pub monthly_salary: Money,
    pub start_age: u32,
    pub retirement_age: u32,
    /// Age at which payouts stop and residual balances are valued.
    pub terminal_age: u32,
    #[serde(default)]
    pub payout_scheme: PayoutScheme,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_rate: Option<Rate>,
    /// Nominal annual rate used to annuitise the Retirement balance.
    /// Defaults to the policy's Retirement account rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_rate: Option<Rate>,
    /// Effective annual rate for the NPV.
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_wage_ceiling: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_contribution_cap: Option<Money>,
    #[serde(default)]
    pub salary_growth_rate: Rate,
    #[serde(default = "default_true")]
    pub contribute_after_transfer: bool,
    #[serde(default)]
    pub retirement_sum_target: RetirementSumTier,
    #[serde(default)]
    pub opening_balances: AccountBalances,
    #[serde(default)]
    pub policy: CpfPolicy,
    /// Solver settings; `periods_per_year` is taken from `frequency`.
    #[serde(default)]
    pub irr: IrrConfig,
}

impl PensionScenarioInput {
    /// A scenario with every optional setting at its default.
    pub fn new(
        monthly_salary: Money,
        start_age: u32,
        retirement_age: u32,
        terminal_age: u32,
    ) -> Self {
        Self {
            monthly_salary,
            start_age,
            retirement_age,
            terminal_age,
            payout_scheme: PayoutScheme::default(),
            frequency: Frequency::default(),
            escalation_rate: None,
            payout_rate: None,
            discount_rate: default_discount_rate(),
            monthly_wage_ceiling: None,
            annual_contribution_cap: None,
            salary_growth_rate: Decimal::ZERO,
            contribute_after_transfer: true,
            retirement_sum_target: RetirementSumTier::default(),
            opening_balances: AccountBalances::default(),
            policy: CpfPolicy::default(),
            irr: IrrConfig::default(),
        }
    }

    fn simulation_input(&self) -> SimulationInput {
        SimulationInput {
            monthly_salary: self.monthly_salary,
            start_age: self.start_age,
            retirement_age: self.retirement_age,
            monthly_wage_ceiling: self.monthly_wage_ceiling,
            annual_contribution_cap: self.annual_contribution_cap,
            salary_growth_rate: self.salary_growth_rate,
            contribute_after_transfer: self.contribute_after_transfer,
            retirement_sum_target: self.retirement_sum_target,
            opening_balances: self.opening_balances,
            policy: self.policy.clone(),
        }
    }
}

/// Summary of a scenario, suitable for cross-scenario comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PensionOutcome {
    pub final_balances: AccountBalances,
    /// First month's payout.
    pub monthly_pension: Money,
    pub payout_months: u32,
    pub total_employee_contribution: Money,
    pub total_employer_contribution: Money,
    pub total_interest: Money,
    /// Payouts plus the terminal value of residual balances.
    pub total_benefits: Money,
    pub terminal_value: Money,
    /// Annualised IRR; `None` when undefined.
    pub irr: Option<Rate>,
    pub npv: Money,
    /// total_benefits / total_employee_contribution - 1.
    pub roi: Option<Rate>,
    pub break_even_age: Option<u32>,
    pub retirement_setup: RetirementSetup,
    pub achieved_tier: Option<RetirementSumTier>,
    pub transfer: Option<TransferEvent>,
    /// Balance left when the payout schedule is run month by month.
    pub annuity_residual: Money,
    pub cash_flow_detail: Vec<CashFlowEntry>,
    pub irr_diagnostics: IrrSolution,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn validate_input(input: &PensionScenarioInput) -> CpfResult<()> {
    if input.monthly_salary <= Decimal::ZERO {
        return Err(CpfError::invalid("monthly_salary", "Must be > 0"));
    }
    if input.retirement_age <= input.start_age {
        return Err(CpfError::invalid(
            "retirement_age",
            format!(
                "retirement_age ({}) must be > start_age ({})",
                input.retirement_age, input.start_age
            ),
        ));
    }
    if input.terminal_age > MAX_AGE {
        return Err(CpfError::invalid(
            "terminal_age",
            format!("Cannot exceed {MAX_AGE}"),
        ));
    }
    if input.terminal_age <= input.retirement_age {
        return Err(CpfError::invalid(
            "terminal_age",
            format!(
                "terminal_age ({}) must be > retirement_age ({})",
                input.terminal_age, input.retirement_age
            ),
        ));
    }
    if input.discount_rate <= dec!(-1) {
        return Err(CpfError::invalid(
            "discount_rate",
            "Must be greater than -100%",
        ));
    }
    Ok(())
}

/// Simulate contributions, annuitise the Retirement balance, build the
/// member's cash flows and solve for IRR and NPV.
pub fn evaluate_scenario(
    input: &PensionScenarioInput,
) -> CpfResult<ComputationOutput<PensionOutcome>> {
    let start = Instant::now();
    validate_input(input)?;

    let simulation = simulate_contributions(&input.simulation_input())?;
    let mut warnings = simulation.warnings;
    let simulation = simulation.result;

    let payout_rate = input
        .payout_rate
        .unwrap_or(input.policy.interest.retirement);
    let payout_input = PayoutInput {
        principal: simulation.final_balances.retirement,
        scheme: input.payout_scheme,
        nominal_annual_rate: payout_rate,
        payout_years: input.terminal_age - input.retirement_age,
        escalation_rate: input.escalation_rate,
    };
    let payout = compute_monthly_payout(&payout_input)?;
    warnings.extend(payout.warnings);
    let payout = payout.result;

    let ledger = amortize_schedule(
        payout_input.principal,
        payout.monthly_rate,
        &payout.monthly_schedule,
    )?;
    if payout.scheme == PayoutScheme::Level && ledger.residual_balance.abs() > LEDGER_TOLERANCE {
        warnings.push(format!(
            "Level annuity leaves a residual of {} after {} months",
            ledger.residual_balance.round_dp(2),
            payout.periods
        ));
    }

    let series = build_cash_flows(
        &simulation,
        &payout.monthly_schedule,
        input.frequency,
        input.terminal_age,
        &input.policy.interest,
    )?;

    let config = IrrConfig {
        periods_per_year: input.frequency.periods_per_year(),
        ..input.irr.clone()
    };
    let returns = analyze_returns(&series.amounts_by_period(), input.discount_rate, &config)?;
    match returns.diagnostics.status {
        IrrStatus::Converged => {}
        IrrStatus::NoSignChange => {
            warnings.push("IRR undefined: cash flows do not change sign".into())
        }
        IrrStatus::NoBracket => warnings
            .push("IRR undefined: no root within the solver's rate bounds".into()),
        IrrStatus::NotConverged => warnings.push(format!(
            "IRR undefined: solver did not converge in {} iterations",
            config.max_iterations
        )),
    }

    let total_employee = simulation.total_employee_contribution;
    let total_benefits = series.total_benefits();
    let roi = if total_employee > Decimal::ZERO {
        total_benefits
            .checked_div(total_employee)
            .map(|ratio| ratio - Decimal::ONE)
    } else {
        None
    };
    let break_even_age = series.break_even_age();
    let achieved_tier = simulation.transfer.as_ref().and_then(|t| t.achieved_tier);

    let outcome = PensionOutcome {
        final_balances: simulation.final_balances,
        monthly_pension: payout.first_monthly_amount,
        payout_months: payout.periods,
        total_employee_contribution: total_employee,
        total_employer_contribution: simulation.total_employer_contribution,
        total_interest: simulation.total_interest,
        total_benefits,
        terminal_value: series.terminal_value,
        irr: returns.rate,
        npv: returns.npv,
        roi,
        break_even_age,
        retirement_setup: simulation.retirement_setup,
        achieved_tier,
        transfer: simulation.transfer,
        annuity_residual: ledger.residual_balance,
        cash_flow_detail: series.entries,
        irr_diagnostics: returns.diagnostics,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "CPF pension scenario (lifetime simulation, annuity payout, member cash flows, IRR/NPV)",
        &serde_json::json!({
            "policy_year": input.policy.year,
            "frequency": input.frequency,
            "payout_scheme": input.payout_scheme,
            "payout_rate": payout_rate.to_string(),
            "discount_rate": input.discount_rate.to_string(),
            "cash_flow_perspective": "employee contributions out, payouts and terminal balances in",
            "terminal_value": "residual Ordinary, Special and Medisave grown to terminal age",
        }),
        warnings,
        elapsed,
        outcome,
    ))
}

// ---------------------------------------------------------------------------
// Cached engine
// ---------------------------------------------------------------------------

pub type ScenarioSnapshot = Arc<ComputationOutput<PensionOutcome>>;

/// Scenario evaluator with a bounded LRU cache keyed on the full input.
///
/// Results are shared as immutable `Arc` snapshots. Errors are not cached.
#[derive(Debug)]
pub struct ScenarioEngine {
    cache: LruCache<PensionScenarioInput, ScenarioSnapshot>,
}

impl Default for ScenarioEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ScenarioEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn evaluate(&mut self, input: &PensionScenarioInput) -> CpfResult<ScenarioSnapshot> {
        if let Some(hit) = self.cache.get(input) {
            return Ok(Arc::clone(hit));
        }
        let snapshot = Arc::new(evaluate_scenario(input)?);
        self.cache.insert(input.clone(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Evaluate a batch; each scenario succeeds or fails on its own.
    pub fn evaluate_all(
        &mut self,
        inputs: &[PensionScenarioInput],
    ) -> Vec<CpfResult<ScenarioSnapshot>> {
        inputs.iter().map(|input| self.evaluate(input)).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
