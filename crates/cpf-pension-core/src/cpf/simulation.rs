use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::cpf::accounts::{
    AccountBalances, AccountCredit, AllocationLimits, InterestCredit, TransferEvent,
};
use crate::cpf::policy::{CpfPolicy, RetirementSumTier};
use crate::error::CpfError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, MAX_AMOUNT};
use crate::CpfResult;

/// Oldest age a simulation, payout or cash-flow sequence may reach.
pub const MAX_AGE: u32 = 120;

/// Combined balances above this stop the simulation.
const BALANCE_LIMIT: Money = dec!(1_000_000_000_000_000_000_000_000);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Input for a lifetime contribution simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationInput {
    /// Monthly salary in the first simulated year.
    pub monthly_salary: Money,
    pub start_age: u32,
    /// First age that is no longer a working year.
    pub retirement_age: u32,
    /// Overrides the policy's monthly wage ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_wage_ceiling: Option<Money>,
    /// Overrides the policy's annual cap on total contributions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_contribution_cap: Option<Money>,
    /// Annual salary growth applied before the wage ceiling.
    #[serde(default)]
    pub salary_growth_rate: Rate,
    /// Keep contributing after the transfer age, at that age's rates.
    #[serde(default = "default_true")]
    pub contribute_after_transfer: bool,
    #[serde(default)]
    pub retirement_sum_target: RetirementSumTier,
    #[serde(default)]
    pub opening_balances: AccountBalances,
    #[serde(default)]
    pub policy: CpfPolicy,
}

/// Whether the Retirement account was formed during the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetirementSetup {
    Complete,
    /// Retirement precedes the transfer age; the Retirement balance is zero
    /// and no annuity can be derived from it.
    Incomplete {
        retirement_age: u32,
        transfer_age: u32,
    },
}

impl RetirementSetup {
    pub fn is_complete(&self) -> bool {
        matches!(self, RetirementSetup::Complete)
    }
}

/// One simulated year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerYear {
    pub age: u32,
    pub annual_salary: Money,
    /// Salary subject to contributions after the wage ceiling.
    pub contribution_base: Money,
    pub employee_contribution: Money,
    pub employer_contribution: Money,
    pub total_contribution: Money,
    pub cap_applied: bool,
    pub credited: AccountCredit,
    pub interest: InterestCredit,
    /// Balances after contributions and interest.
    pub balances: AccountBalances,
}

/// Result of a lifetime contribution simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub final_balances: AccountBalances,
    pub ledger: Vec<LedgerYear>,
    pub transfer: Option<TransferEvent>,
    pub retirement_setup: RetirementSetup,
    pub total_employee_contribution: Money,
    pub total_employer_contribution: Money,
    pub total_interest: Money,
    pub total_medisave_overflow: Money,
    pub years_cap_applied: u32,
}

impl SimulationOutput {
    /// Final balances, or `IncompleteRetirementSetup` when no Retirement
    /// account was formed.
    pub fn require_complete_setup(&self) -> CpfResult<&AccountBalances> {
        match self.retirement_setup {
            RetirementSetup::Complete => Ok(&self.final_balances),
            RetirementSetup::Incomplete {
                retirement_age,
                transfer_age,
            } => Err(CpfError::IncompleteRetirementSetup {
                retirement_age,
                transfer_age,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_amount(field: &str, amount: Money) -> CpfResult<()> {
    if amount > MAX_AMOUNT {
        return Err(CpfError::invalid(
            field,
            format!("Cannot exceed {MAX_AMOUNT}"),
        ));
    }
    Ok(())
}

fn validate_input(input: &SimulationInput) -> CpfResult<()> {
    if input.monthly_salary < Decimal::ZERO {
        return Err(CpfError::invalid("monthly_salary", "Cannot be negative"));
    }
    check_amount("monthly_salary", input.monthly_salary)?;
    if input.retirement_age > MAX_AGE {
        return Err(CpfError::invalid(
            "retirement_age",
            format!("Cannot exceed {MAX_AGE}"),
        ));
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
    if input.salary_growth_rate <= dec!(-1) {
        return Err(CpfError::invalid(
            "salary_growth_rate",
            "Must be greater than -100%",
        ));
    }
    if let Some(ceiling) = input.monthly_wage_ceiling {
        if ceiling < Decimal::ZERO {
            return Err(CpfError::invalid("monthly_wage_ceiling", "Cannot be negative"));
        }
        check_amount("monthly_wage_ceiling", ceiling)?;
    }
    if let Some(cap) = input.annual_contribution_cap {
        if cap < Decimal::ZERO {
            return Err(CpfError::invalid(
                "annual_contribution_cap",
                "Cannot be negative",
            ));
        }
    }
    if !input.opening_balances.is_non_negative() {
        return Err(CpfError::invalid(
            "opening_balances",
            "Account balances cannot be negative",
        ));
    }
    let b = &input.opening_balances;
    for balance in [b.ordinary, b.special, b.retirement, b.medisave] {
        check_amount("opening_balances", balance)?;
    }
    input.policy.validate()
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Simulate CPF contributions year by year from `start_age` up to
/// `retirement_age`, forming the Retirement account at the transfer age.
pub fn simulate_contributions(
    input: &SimulationInput,
) -> CpfResult<ComputationOutput<SimulationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let policy = &input.policy;
    let transfer_age = policy.transfer_age;
    let annual_wage_ceiling =
        input.monthly_wage_ceiling.unwrap_or(policy.monthly_wage_ceiling) * dec!(12);
    let annual_cap = input
        .annual_contribution_cap
        .or(policy.annual_contribution_cap);
    let retirement_target = policy
        .retirement_sums
        .amount_for(input.retirement_sum_target);

    let mut balances = input.opening_balances;
    let mut transfer: Option<TransferEvent> = None;
    let mut ledger: Vec<LedgerYear> =
        Vec::with_capacity((input.retirement_age - input.start_age) as usize);

    let mut total_employee = Decimal::ZERO;
    let mut total_employer = Decimal::ZERO;
    let mut total_interest = Decimal::ZERO;
    let mut total_overflow = Decimal::ZERO;
    let mut years_cap_applied: u32 = 0;

    let mut annual_salary = input.monthly_salary * dec!(12);
    let salary_factor = Decimal::ONE + input.salary_growth_rate;

    for age in input.start_age..input.retirement_age {
        if age > input.start_age {
            annual_salary = annual_salary.checked_mul(salary_factor).ok_or_else(|| {
                CpfError::invalid(
                    "salary_growth_rate",
                    format!("Salary compounded to age {age} leaves the Decimal range"),
                )
            })?;
        }
        if transfer.is_none() && age >= transfer_age {
            transfer = Some(balances.transfer_to_retirement(
                age,
                &policy.retirement_sums,
                input.retirement_sum_target,
            ));
        }
        let transferred = transfer.is_some();

        let contribution_base = annual_salary.min(annual_wage_ceiling);
        let contributing = !transferred || input.contribute_after_transfer;

        let rates = policy.rate_for(age);
        let total_rate = rates.total();
        let uncapped = if contributing {
            contribution_base * total_rate
        } else {
            Decimal::ZERO
        };
        let (total_contribution, cap_applied) = match annual_cap {
            Some(cap) if uncapped > cap => (cap, true),
            _ => (uncapped, false),
        };
        if cap_applied {
            years_cap_applied += 1;
        }

        let employee_contribution = if total_rate.is_zero() {
            Decimal::ZERO
        } else {
            total_contribution * rates.employee / total_rate
        };
        let employer_contribution = total_contribution - employee_contribution;

        let limits = AllocationLimits {
            basic_healthcare_sum: policy.basic_healthcare_sum,
            retirement_target,
            transferred,
        };
        let credited = balances.allocate(
            total_contribution,
            &policy.allocation_for(age),
            &limits,
        );
        let interest = balances.apply_interest(&policy.interest);
        if balances.total() > BALANCE_LIMIT {
            return Err(CpfError::invalid(
                "policy.interest",
                format!("Account balances exceed {BALANCE_LIMIT} at age {age}"),
            ));
        }

        total_employee += employee_contribution;
        total_employer += employer_contribution;
        total_interest += interest.total();
        total_overflow += credited.medisave_overflow;

        ledger.push(LedgerYear {
            age,
            annual_salary,
            contribution_base,
            employee_contribution,
            employer_contribution,
            total_contribution,
            cap_applied,
            credited,
            interest,
            balances,
        });
    }

    // Retiring exactly at the transfer age still forms the account
    if transfer.is_none() && input.retirement_age >= transfer_age {
        transfer = Some(balances.transfer_to_retirement(
            input.retirement_age,
            &policy.retirement_sums,
            input.retirement_sum_target,
        ));
    }

    let retirement_setup = if transfer.is_some() {
        RetirementSetup::Complete
    } else {
        warnings.push(format!(
            "Retirement age {} precedes the age-{} transfer; Retirement account not formed",
            input.retirement_age, transfer_age
        ));
        RetirementSetup::Incomplete {
            retirement_age: input.retirement_age,
            transfer_age,
        }
    };

    if input.monthly_salary.is_zero() {
        warnings.push("Monthly salary is zero; no contributions were made".into());
    }
    if years_cap_applied > 0 {
        warnings.push(format!(
            "Annual contribution cap bound in {years_cap_applied} year(s)"
        ));
    }
    if total_overflow > Decimal::ZERO {
        warnings.push(format!(
            "Medisave reached the Basic Healthcare Sum; {} diverted to other accounts",
            total_overflow.round_dp(2)
        ));
    }
    if let Some(event) = &transfer {
        if event.achieved_tier.is_none() {
            warnings.push(format!(
                "Savings at age {} ({}) fall short of the Basic Retirement Sum",
                event.age,
                event.transferable.round_dp(2)
            ));
        }
    }

    let output = SimulationOutput {
        final_balances: balances,
        ledger,
        transfer,
        retirement_setup,
        total_employee_contribution: total_employee,
        total_employer_contribution: total_employer,
        total_interest,
        total_medisave_overflow: total_overflow,
        years_cap_applied,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "CPF lifetime contribution simulation (age-banded rates, account allocation, age-55 transfer)",
        &serde_json::json!({
            "policy_year": format!("{:?}", policy.year),
            "start_age": input.start_age,
            "retirement_age": input.retirement_age,
            "annual_wage_ceiling": annual_wage_ceiling.to_string(),
            "annual_contribution_cap": annual_cap.map(|c| c.to_string()),
            "retirement_sum_target": format!("{:?}", input.retirement_sum_target),
            "contribute_after_transfer": input.contribute_after_transfer,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
