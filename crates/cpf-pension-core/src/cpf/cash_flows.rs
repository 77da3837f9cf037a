use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cpf::policy::InterestRates;
use crate::cpf::simulation::{SimulationOutput, MAX_AGE};
use crate::error::CpfError;
use crate::time_value::compound;
use crate::types::{Frequency, Money};
use crate::CpfResult;

const MONTHS_PER_YEAR: u32 = 12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashFlowCategory {
    Contribution,
    Payout,
    Terminal,
}

/// One signed flow from the member's point of view: contributions are
/// negative, payouts and the terminal balance positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowEntry {
    pub period: u32,
    pub age: u32,
    pub amount: Money,
    pub category: CashFlowCategory,
    pub label: String,
}

/// Chronological cash-flow sequence at a single periodicity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowSeries {
    pub frequency: Frequency,
    pub entries: Vec<CashFlowEntry>,
    pub total_contributions: Money,
    pub total_payouts: Money,
    pub terminal_value: Money,
}

impl CashFlowSeries {
    /// Sum of all positive flows (payouts plus terminal value).
    pub fn total_benefits(&self) -> Money {
        self.total_payouts + self.terminal_value
    }

    /// Net flow per period index, zero-filled, ready for the IRR solver.
    pub fn amounts_by_period(&self) -> Vec<Money> {
        let len = self
            .entries
            .iter()
            .map(|e| e.period as usize + 1)
            .max()
            .unwrap_or(0);
        let mut amounts = vec![Decimal::ZERO; len];
        for entry in &self.entries {
            amounts[entry.period as usize] += entry.amount;
        }
        amounts
    }

    /// First age at which cumulative benefits cover cumulative employee
    /// contributions, undiscounted.
    pub fn break_even_age(&self) -> Option<u32> {
        let mut contributed = Decimal::ZERO;
        let mut received = Decimal::ZERO;
        for entry in &self.entries {
            if entry.amount < Decimal::ZERO {
                contributed -= entry.amount;
            } else {
                received += entry.amount;
            }
            if contributed > Decimal::ZERO && received > Decimal::ZERO && received >= contributed {
                return Some(entry.age);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

fn out_of_range() -> CpfError {
    CpfError::invalid(
        "terminal_age",
        "Residual balances grown to the terminal age leave the Decimal range",
    )
}

/// Residual Ordinary, Special and Medisave balances grown at their account
/// rates for `years`.
pub fn terminal_value(
    simulation: &SimulationOutput,
    rates: &InterestRates,
    years: u32,
) -> CpfResult<Money> {
    let b = &simulation.final_balances;
    let grown = |balance: Money, rate| {
        compound(rate, years).and_then(|factor| balance.checked_mul(factor))
    };
    grown(b.ordinary, rates.ordinary)
        .zip(grown(b.special, rates.special))
        .zip(grown(b.medisave, rates.medisave))
        .and_then(|((o, s), m)| o.checked_add(s)?.checked_add(m))
        .ok_or_else(out_of_range)
}

/// Assemble the signed cash-flow sequence for a simulated career and its
/// monthly payout schedule.
///
/// Work years contribute the employee share only. Payouts start at the
/// retirement age. A single terminal entry carrying the non-annuitised
/// balances at `terminal_age` is placed in the first period of that age,
/// right after the last payout.
pub fn build_cash_flows(
    simulation: &SimulationOutput,
    payout_schedule: &[Money],
    frequency: Frequency,
    terminal_age: u32,
    rates: &InterestRates,
) -> CpfResult<CashFlowSeries> {
    let retirement_age = match simulation.ledger.last() {
        Some(year) => year.age + 1,
        None => {
            return Err(CpfError::invalid(
                "simulation",
                "Simulation ledger is empty; no work years to build from",
            ))
        }
    };
    if terminal_age <= retirement_age || terminal_age > MAX_AGE {
        return Err(CpfError::invalid(
            "terminal_age",
            format!(
                "terminal_age ({terminal_age}) must be > retirement_age ({retirement_age}) \
                 and <= {MAX_AGE}"
            ),
        ));
    }

    let mut entries: Vec<CashFlowEntry> = Vec::new();
    let mut period: u32 = 0;
    let mut total_contributions = Decimal::ZERO;
    let mut total_payouts = Decimal::ZERO;

    for year in &simulation.ledger {
        total_contributions += year.employee_contribution;
        match frequency {
            Frequency::Annual => {
                entries.push(CashFlowEntry {
                    period,
                    age: year.age,
                    amount: -year.employee_contribution,
                    category: CashFlowCategory::Contribution,
                    label: format!("Employee contribution, age {}", year.age),
                });
                period += 1;
            }
            Frequency::Monthly => {
                let monthly = year.employee_contribution / Decimal::from(MONTHS_PER_YEAR);
                for month in 1..=MONTHS_PER_YEAR {
                    entries.push(CashFlowEntry {
                        period,
                        age: year.age,
                        amount: -monthly,
                        category: CashFlowCategory::Contribution,
                        label: format!("Employee contribution, age {} month {month}", year.age),
                    });
                    period += 1;
                }
            }
        }
    }

    match frequency {
        Frequency::Annual => {
            for (i, chunk) in payout_schedule.chunks(MONTHS_PER_YEAR as usize).enumerate() {
                let age = retirement_age + i as u32;
                let amount = chunk
                    .iter()
                    .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))
                    .ok_or_else(out_of_range)?;
                total_payouts = total_payouts
                    .checked_add(amount)
                    .ok_or_else(out_of_range)?;
                entries.push(CashFlowEntry {
                    period,
                    age,
                    amount,
                    category: CashFlowCategory::Payout,
                    label: format!("Annuity payout, age {age}"),
                });
                period += 1;
            }
        }
        Frequency::Monthly => {
            for (k, amount) in payout_schedule.iter().enumerate() {
                let k = k as u32;
                let age = retirement_age + k / MONTHS_PER_YEAR;
                total_payouts = total_payouts
                    .checked_add(*amount)
                    .ok_or_else(out_of_range)?;
                entries.push(CashFlowEntry {
                    period,
                    age,
                    amount: *amount,
                    category: CashFlowCategory::Payout,
                    label: format!(
                        "Annuity payout, age {age} month {}",
                        k % MONTHS_PER_YEAR + 1
                    ),
                });
                period += 1;
            }
        }
    }

    let periods_per_year = frequency.periods_per_year();
    let work_periods = simulation.ledger.len() as u32 * periods_per_year;
    let terminal_period =
        period.max(work_periods + (terminal_age - retirement_age) * periods_per_year);
    let terminal = terminal_value(simulation, rates, terminal_age - retirement_age)?;
    if total_payouts.checked_add(terminal).is_none() {
        return Err(out_of_range());
    }
    entries.push(CashFlowEntry {
        period: terminal_period,
        age: terminal_age,
        amount: terminal,
        category: CashFlowCategory::Terminal,
        label: format!("Residual balances at age {terminal_age}"),
    });

    Ok(CashFlowSeries {
        frequency,
        entries,
        total_contributions,
        total_payouts,
        terminal_value: terminal,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpf::accounts::AccountBalances;
    use crate::cpf::simulation::{simulate_contributions, SimulationInput};
    use rust_decimal_macros::dec;

    fn simulated(start_age: u32, retirement_age: u32) -> SimulationOutput {
        let input = SimulationInput {
            monthly_salary: dec!(5_000),
            start_age,
            retirement_age,
            monthly_wage_ceiling: None,
            annual_contribution_cap: None,
            salary_growth_rate: Decimal::ZERO,
            contribute_after_transfer: true,
            retirement_sum_target: Default::default(),
            opening_balances: AccountBalances::default(),
            policy: Default::default(),
        };
        simulate_contributions(&input).unwrap().result
    }

    fn flat_schedule(months: usize) -> Vec<Money> {
        vec![dec!(1_000); months]
    }

    #[test]
    fn test_annual_layout_and_signs() {
        let sim = simulated(60, 65);
        let series = build_cash_flows(
            &sim,
            &flat_schedule(24),
            Frequency::Annual,
            67,
            &InterestRates::default(),
        )
        .unwrap();

        // 5 work years, 2 payout years, 1 terminal
        assert_eq!(series.entries.len(), 8);
        assert!(series.entries[..5].iter().all(|e| e.amount < Decimal::ZERO));
        assert_eq!(series.entries[5].amount, dec!(12_000));
        assert_eq!(series.entries[5].age, 65);
        assert_eq!(series.entries[6].age, 66);

        let terminal = series.entries.last().unwrap();
        assert_eq!(terminal.category, CashFlowCategory::Terminal);
        assert_eq!(terminal.period, 7);
        assert_eq!(terminal.age, 67);
        assert_eq!(series.total_payouts, dec!(24_000));
    }

    #[test]
    fn test_only_employee_share_is_an_outflow() {
        let sim = simulated(60, 62);
        let series = build_cash_flows(
            &sim,
            &flat_schedule(12),
            Frequency::Annual,
            63,
            &InterestRates::default(),
        )
        .unwrap();
        assert_eq!(series.entries[0].amount, -sim.ledger[0].employee_contribution);
        assert_eq!(series.total_contributions, sim.total_employee_contribution);
    }

    #[test]
    fn test_monthly_layout() {
        let sim = simulated(60, 62);
        let series = build_cash_flows(
            &sim,
            &flat_schedule(12),
            Frequency::Monthly,
            63,
            &InterestRates::default(),
        )
        .unwrap();
        // 24 work months, 12 payout months, 1 terminal
        assert_eq!(series.entries.len(), 37);
        assert_eq!(series.entries[24].period, 24);
        assert_eq!(series.entries[24].age, 62);
        assert_eq!(series.entries[36].period, 36);

        let by_period = series.amounts_by_period();
        assert_eq!(by_period.len(), 37);
        assert_eq!(by_period[35], dec!(1_000));
        assert_eq!(by_period[36], series.terminal_value);

        let contributed: Money = series.entries[..12].iter().map(|e| -e.amount).sum();
        assert!((contributed - sim.ledger[0].employee_contribution).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_entries_are_chronological() {
        let sim = simulated(50, 60);
        let series = build_cash_flows(
            &sim,
            &flat_schedule(120),
            Frequency::Monthly,
            70,
            &InterestRates::default(),
        )
        .unwrap();
        assert!(series.entries.windows(2).all(|w| w[0].period <= w[1].period));
        assert_eq!(
            series
                .entries
                .iter()
                .filter(|e| e.category == CashFlowCategory::Terminal)
                .count(),
            1
        );
    }

    #[test]
    fn test_terminal_grows_residual_balances() {
        let sim = simulated(60, 65);
        let rates = InterestRates::default();
        let series =
            build_cash_flows(&sim, &flat_schedule(12), Frequency::Annual, 66, &rates).unwrap();
        let b = sim.final_balances;
        let expected = b.ordinary * dec!(1.025) + b.special * dec!(1.04) + b.medisave * dec!(1.04);
        assert_eq!(series.terminal_value, expected);
        assert!(series.terminal_value > Decimal::ZERO);
    }

    #[test]
    fn test_empty_schedule_dates_terminal_at_terminal_age() {
        let sim = simulated(60, 62);
        let series =
            build_cash_flows(&sim, &[], Frequency::Annual, 70, &InterestRates::default()).unwrap();
        assert_eq!(series.entries.len(), 3);
        // 2 work years, then 8 empty years up to age 70
        assert_eq!(series.entries[2].period, 10);
        assert_eq!(series.entries[2].age, 70);
    }

    #[test]
    fn test_terminal_follows_last_payout_period() {
        let sim = simulated(30, 65);
        for frequency in [Frequency::Annual, Frequency::Monthly] {
            let series = build_cash_flows(
                &sim,
                &flat_schedule(25 * 12),
                frequency,
                90,
                &InterestRates::default(),
            )
            .unwrap();
            let ppy = frequency.periods_per_year();
            let terminal = series.entries.last().unwrap();
            let last_payout = &series.entries[series.entries.len() - 2];

            assert_eq!(last_payout.category, CashFlowCategory::Payout);
            assert_eq!(last_payout.age, 89);
            assert_eq!(terminal.period, last_payout.period + 1);
            assert_eq!(terminal.period, (90 - 30) * ppy);
            assert_eq!(terminal.age, 90);
            assert!(series
                .entries
                .iter()
                .filter(|e| e.period == terminal.period)
                .all(|e| e.category == CashFlowCategory::Terminal));
        }
    }

    #[test]
    fn test_terminal_value_overflow_is_an_error() {
        let mut sim = simulated(60, 62);
        sim.final_balances.ordinary = dec!(1_000_000_000_000_000);
        let rates = InterestRates {
            ordinary: dec!(1),
            ..InterestRates::default()
        };
        assert!(matches!(
            terminal_value(&sim, &rates, 100),
            Err(CpfError::InvalidInput { .. })
        ));
        assert!(terminal_value(&sim, &rates, 10).is_ok());
    }

    #[test]
    fn test_terminal_age_must_follow_retirement() {
        let sim = simulated(60, 65);
        let result = build_cash_flows(
            &sim,
            &flat_schedule(12),
            Frequency::Annual,
            65,
            &InterestRates::default(),
        );
        assert!(matches!(result, Err(CpfError::InvalidInput { .. })));
    }

    #[test]
    fn test_break_even_age() {
        let series = CashFlowSeries {
            frequency: Frequency::Annual,
            entries: vec![
                CashFlowEntry {
                    period: 0,
                    age: 64,
                    amount: dec!(-1_000),
                    category: CashFlowCategory::Contribution,
                    label: String::new(),
                },
                CashFlowEntry {
                    period: 1,
                    age: 65,
                    amount: dec!(600),
                    category: CashFlowCategory::Payout,
                    label: String::new(),
                },
                CashFlowEntry {
                    period: 2,
                    age: 66,
                    amount: dec!(600),
                    category: CashFlowCategory::Payout,
                    label: String::new(),
                },
            ],
            total_contributions: dec!(1_000),
            total_payouts: dec!(1_200),
            terminal_value: Decimal::ZERO,
        };
        assert_eq!(series.break_even_age(), Some(66));
        assert_eq!(series.total_benefits(), dec!(1_200));
    }
}
