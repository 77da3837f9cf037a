use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CpfError;
use crate::time_value::compound;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::CpfResult;

/// Rates closer than this are treated as equal in the annuity formulas.
const RATE_EPSILON: Decimal = dec!(0.000000000001);

const MONTHS_PER_YEAR: u32 = 12;

/// Longest payout horizon accepted, in years.
pub const MAX_PAYOUT_YEARS: u32 = 120;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutScheme {
    /// Constant monthly payment.
    #[default]
    Level,
    /// Payment rises by the escalation rate once every twelve months.
    Growing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayoutInput {
    /// Retirement balance to annuitise.
    pub principal: Money,
    pub scheme: PayoutScheme,
    /// Nominal annual rate, compounded monthly.
    pub nominal_annual_rate: Rate,
    pub payout_years: u32,
    /// Annual escalation for the growing scheme; absent means 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_rate: Option<Rate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutOutput {
    pub scheme: PayoutScheme,
    pub first_monthly_amount: Money,
    pub monthly_schedule: Vec<Money>,
    pub total_payout: Money,
    pub periods: u32,
    pub monthly_rate: Rate,
    pub escalation_rate: Rate,
}

/// One month of a payout verification ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmortizationRow {
    pub period: u32,
    pub opening_balance: Money,
    pub interest: Money,
    pub scheduled_payment: Money,
    pub payment: Money,
    pub closing_balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmortizationLedger {
    pub rows: Vec<AmortizationRow>,
    /// Balance left after the last period.
    pub residual_balance: Money,
    /// Periods where the payment was cut to balance plus interest.
    pub clamped_periods: u32,
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

fn out_of_range(field: &str) -> CpfError {
    CpfError::invalid(field, "Value pushes the payout arithmetic outside the Decimal range")
}

/// Level annuity-immediate payment: P r / (1 - (1+r)^-n).
fn level_payment(principal: Money, monthly_rate: Rate, periods: u32) -> CpfResult<Money> {
    if monthly_rate.abs() < RATE_EPSILON {
        return Ok(principal / Decimal::from(periods));
    }
    let growth =
        compound(monthly_rate, periods).ok_or_else(|| out_of_range("nominal_annual_rate"))?;
    if growth.is_zero() {
        return Err(CpfError::DivisionByZero {
            context: format!("discount factor at period {periods}"),
        });
    }
    let denom = Decimal::ONE - Decimal::ONE / growth;
    if denom.is_zero() {
        return Err(CpfError::DivisionByZero {
            context: "level annuity factor".into(),
        });
    }
    principal
        .checked_mul(monthly_rate)
        .and_then(|v| v.checked_div(denom))
        .ok_or_else(|| out_of_range("principal"))
}

/// Growing annuity first payment: P (r-g) / (1 - ((1+g)/(1+r))^n).
fn growing_first_payment(
    principal: Money,
    monthly_rate: Rate,
    monthly_growth: Rate,
    periods: u32,
) -> CpfResult<Money> {
    if (monthly_rate - monthly_growth).abs() < RATE_EPSILON {
        return Ok(principal / Decimal::from(periods));
    }
    let ratio = (Decimal::ONE + monthly_growth) / (Decimal::ONE + monthly_rate);
    let growth = compound(ratio - Decimal::ONE, periods)
        .ok_or_else(|| out_of_range("escalation_rate"))?;
    let denom = Decimal::ONE - growth;
    if denom.is_zero() {
        return Err(CpfError::DivisionByZero {
            context: "growing annuity factor".into(),
        });
    }
    principal
        .checked_mul(monthly_rate - monthly_growth)
        .and_then(|v| v.checked_div(denom))
        .ok_or_else(|| out_of_range("principal"))
}

/// Stepped schedule: payment_k = payment0 (1+e)^floor(k/12).
fn stepped_schedule(
    first: Money,
    annual_escalation: Rate,
    periods: u32,
) -> CpfResult<Vec<Money>> {
    let step = Decimal::ONE + annual_escalation;
    let mut payment = first;
    let mut schedule = Vec::with_capacity(periods as usize);
    for k in 0..periods {
        if k > 0 && k % MONTHS_PER_YEAR == 0 {
            payment = payment
                .checked_mul(step)
                .ok_or_else(|| out_of_range("escalation_rate"))?;
        }
        schedule.push(payment.max(Decimal::ZERO));
    }
    Ok(schedule)
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Convert a lump Retirement balance into a monthly payout stream.
pub fn compute_monthly_payout(input: &PayoutInput) -> CpfResult<ComputationOutput<PayoutOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.payout_years == 0 || input.payout_years > MAX_PAYOUT_YEARS {
        return Err(CpfError::invalid(
            "payout_years",
            format!("Must be between 1 and {MAX_PAYOUT_YEARS}"),
        ));
    }
    if input.nominal_annual_rate <= dec!(-1) {
        return Err(CpfError::invalid(
            "nominal_annual_rate",
            "Must be greater than -100%",
        ));
    }
    let escalation = input.escalation_rate.unwrap_or(Decimal::ZERO);
    if escalation <= dec!(-1) {
        return Err(CpfError::invalid(
            "escalation_rate",
            "Must be greater than -100%",
        ));
    }
    if input.scheme == PayoutScheme::Level && !escalation.is_zero() {
        warnings.push("Escalation rate is ignored for the level scheme".into());
    }

    let periods = input.payout_years * MONTHS_PER_YEAR;
    let monthly_rate = input.nominal_annual_rate / Decimal::from(MONTHS_PER_YEAR);

    let monthly_schedule = if input.principal <= Decimal::ZERO {
        warnings.push("Principal is zero; payout is zero for every period".into());
        vec![Decimal::ZERO; periods as usize]
    } else {
        match input.scheme {
            PayoutScheme::Level => {
                let payment = level_payment(input.principal, monthly_rate, periods)?;
                vec![payment.max(Decimal::ZERO); periods as usize]
            }
            PayoutScheme::Growing => {
                let monthly_growth = escalation / Decimal::from(MONTHS_PER_YEAR);
                let first =
                    growing_first_payment(input.principal, monthly_rate, monthly_growth, periods)?;
                stepped_schedule(first, escalation, periods)?
            }
        }
    };

    let first_monthly_amount = monthly_schedule.first().copied().unwrap_or(Decimal::ZERO);
    let total_payout = monthly_schedule
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))
        .ok_or_else(|| out_of_range("principal"))?;
    let scheme = input.scheme;
    let effective_escalation = match scheme {
        PayoutScheme::Level => Decimal::ZERO,
        PayoutScheme::Growing => escalation,
    };

    let output = PayoutOutput {
        scheme,
        first_monthly_amount,
        monthly_schedule,
        total_payout,
        periods,
        monthly_rate,
        escalation_rate: effective_escalation,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Annuity payout (level annuity-immediate or stepped growing annuity)",
        &serde_json::json!({
            "scheme": format!("{:?}", scheme),
            "nominal_annual_rate": input.nominal_annual_rate.to_string(),
            "payout_years": input.payout_years,
            "escalation_rate": effective_escalation.to_string(),
            "escalation_convention": "stepped every 12 months",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Run a payout schedule against a balance month by month:
/// `balance = balance (1+r) - payment`. Payments never go negative and are
/// cut to balance plus interest when the balance would otherwise overdraw.
pub fn amortize_schedule(
    principal: Money,
    monthly_rate: Rate,
    schedule: &[Money],
) -> CpfResult<AmortizationLedger> {
    let mut balance = principal.max(Decimal::ZERO);
    let mut rows = Vec::with_capacity(schedule.len());
    let mut clamped_periods = 0;

    for (k, scheduled) in schedule.iter().enumerate() {
        let opening_balance = balance;
        let interest = opening_balance
            .checked_mul(monthly_rate)
            .ok_or_else(|| out_of_range("monthly_rate"))?;
        let available = opening_balance
            .checked_add(interest)
            .ok_or_else(|| out_of_range("monthly_rate"))?
            .max(Decimal::ZERO);
        let scheduled_payment = (*scheduled).max(Decimal::ZERO);
        let payment = if scheduled_payment > available {
            clamped_periods += 1;
            available
        } else {
            scheduled_payment
        };
        balance = available - payment;

        rows.push(AmortizationRow {
            period: k as u32,
            opening_balance,
            interest,
            scheduled_payment,
            payment,
            closing_balance: balance,
        });
    }

    Ok(AmortizationLedger {
        rows,
        residual_balance: balance,
        clamped_periods,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
