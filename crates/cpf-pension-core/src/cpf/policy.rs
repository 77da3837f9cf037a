use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CpfError;
use crate::types::{Money, Rate, MAX_AMOUNT};
use crate::CpfResult;

/// Allocation shares must sum to one within this tolerance.
const SHARE_SUM_TOLERANCE: Decimal = dec!(0.000000001);

/// Age at which Special and Ordinary savings form the Retirement account.
pub const TRANSFER_AGE: u32 = 55;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Regulatory year a built-in schedule was published for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyYear {
    Y2024,
    #[default]
    Y2025,
}

/// Employee and employer contribution rates, as fractions of wages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContributionRates {
    pub employee: Rate,
    pub employer: Rate,
}

impl ContributionRates {
    pub fn total(&self) -> Rate {
        self.employee + self.employer
    }
}

/// How a total contribution is split across the three receiving accounts.
/// Before the transfer age the middle share goes to Special, afterwards to
/// Retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationShares {
    pub ordinary: Rate,
    pub special_or_retirement: Rate,
    pub medisave: Rate,
}

impl AllocationShares {
    pub fn sum(&self) -> Decimal {
        self.ordinary + self.special_or_retirement + self.medisave
    }
}

/// Contribution rates applying from `from_age` until the next band.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateBand {
    pub from_age: u32,
    pub rates: ContributionRates,
}

/// Allocation shares applying from `from_age` until the next band.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationBand {
    pub from_age: u32,
    pub shares: AllocationShares,
}

impl AllocationBand {
    /// Build a band from the published "percentage of wage" columns. The
    /// medisave share absorbs rounding so the three shares sum to exactly one.
    pub fn from_wage_percentages(
        from_age: u32,
        ordinary_pct: Decimal,
        special_pct: Decimal,
        medisave_pct: Decimal,
    ) -> Self {
        let total = ordinary_pct + special_pct + medisave_pct;
        let ordinary = ordinary_pct / total;
        let special_or_retirement = special_pct / total;
        Self {
            from_age,
            shares: AllocationShares {
                ordinary,
                special_or_retirement,
                medisave: Decimal::ONE - ordinary - special_or_retirement,
            },
        }
    }
}

/// Age-banded contribution and allocation schedule. Both tables are step
/// functions: a lookup uses the last band whose `from_age` does not exceed
/// the age, so the oldest band applies indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContributionRatePolicy {
    pub rate_bands: Vec<RateBand>,
    pub allocation_bands: Vec<AllocationBand>,
}

/// Retirement-sum thresholds, ordered Basic < Full < Enhanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetirementSumTier {
    Basic,
    #[default]
    Full,
    Enhanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetirementSums {
    pub basic: Money,
    pub full: Money,
    pub enhanced: Money,
}

/// Annual interest credited to each account at year end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterestRates {
    pub ordinary: Rate,
    pub special: Rate,
    pub retirement: Rate,
    pub medisave: Rate,
}

impl Default for InterestRates {
    fn default() -> Self {
        Self {
            ordinary: dec!(0.025),
            special: dec!(0.04),
            retirement: dec!(0.04),
            medisave: dec!(0.04),
        }
    }
}

/// Immutable policy bundle passed into every simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CpfPolicy {
    pub year: PolicyYear,
    pub contribution: ContributionRatePolicy,
    /// Maximum monthly wage subject to contributions.
    pub monthly_wage_ceiling: Money,
    /// Ceiling on total (employee + employer) contributions in a year.
    pub annual_contribution_cap: Option<Money>,
    pub retirement_sums: RetirementSums,
    /// Medisave balance above which new medisave contributions overflow.
    pub basic_healthcare_sum: Money,
    pub interest: InterestRates,
    pub transfer_age: u32,
}

impl Default for CpfPolicy {
    fn default() -> Self {
        Self::for_year(PolicyYear::default())
    }
}

// ---------------------------------------------------------------------------
// Published schedules
// ---------------------------------------------------------------------------

fn rate_band(from_age: u32, employee: Decimal, employer: Decimal) -> RateBand {
    RateBand {
        from_age,
        rates: ContributionRates { employee, employer },
    }
}

impl ContributionRatePolicy {
    /// Private-sector rates for monthly wages above $750.
    pub fn for_year(year: PolicyYear) -> Self {
        match year {
            PolicyYear::Y2024 => Self {
                rate_bands: vec![
                    rate_band(0, dec!(0.20), dec!(0.17)),
                    rate_band(55, dec!(0.16), dec!(0.15)),
                    rate_band(60, dec!(0.105), dec!(0.115)),
                    rate_band(65, dec!(0.075), dec!(0.09)),
                    rate_band(70, dec!(0.05), dec!(0.075)),
                ],
                allocation_bands: vec![
                    AllocationBand::from_wage_percentages(0, dec!(23), dec!(6), dec!(8)),
                    AllocationBand::from_wage_percentages(35, dec!(21), dec!(7), dec!(9)),
                    AllocationBand::from_wage_percentages(45, dec!(19), dec!(8), dec!(10)),
                    AllocationBand::from_wage_percentages(50, dec!(15), dec!(11.5), dec!(10.5)),
                    AllocationBand::from_wage_percentages(55, dec!(12), dec!(8.5), dec!(10.5)),
                    AllocationBand::from_wage_percentages(60, dec!(3.5), dec!(8), dec!(10.5)),
                    AllocationBand::from_wage_percentages(65, dec!(1), dec!(5), dec!(10.5)),
                    AllocationBand::from_wage_percentages(70, dec!(1), dec!(1), dec!(10.5)),
                ],
            },
            PolicyYear::Y2025 => Self {
                rate_bands: vec![
                    rate_band(0, dec!(0.20), dec!(0.17)),
                    rate_band(55, dec!(0.17), dec!(0.155)),
                    rate_band(60, dec!(0.115), dec!(0.12)),
                    rate_band(65, dec!(0.075), dec!(0.09)),
                    rate_band(70, dec!(0.05), dec!(0.075)),
                ],
                allocation_bands: vec![
                    AllocationBand::from_wage_percentages(0, dec!(23), dec!(6), dec!(8)),
                    AllocationBand::from_wage_percentages(35, dec!(21), dec!(7), dec!(9)),
                    AllocationBand::from_wage_percentages(45, dec!(19), dec!(8), dec!(10)),
                    AllocationBand::from_wage_percentages(50, dec!(15), dec!(11.5), dec!(10.5)),
                    AllocationBand::from_wage_percentages(55, dec!(12), dec!(10), dec!(10.5)),
                    AllocationBand::from_wage_percentages(60, dec!(3.5), dec!(9.5), dec!(10.5)),
                    AllocationBand::from_wage_percentages(65, dec!(1), dec!(5), dec!(10.5)),
                    AllocationBand::from_wage_percentages(70, dec!(1), dec!(1), dec!(10.5)),
                ],
            },
        }
    }

    /// (employee, employer) rates for `age`.
    pub fn rate_for(&self, age: u32) -> ContributionRates {
        self.rate_bands
            .iter()
            .rev()
            .find(|band| band.from_age <= age)
            .or_else(|| self.rate_bands.first())
            .map(|band| band.rates)
            .unwrap_or(ContributionRates {
                employee: Decimal::ZERO,
                employer: Decimal::ZERO,
            })
    }

    /// (ordinary, special-or-retirement, medisave) shares for `age`.
    pub fn allocation_for(&self, age: u32) -> AllocationShares {
        self.allocation_bands
            .iter()
            .rev()
            .find(|band| band.from_age <= age)
            .or_else(|| self.allocation_bands.first())
            .map(|band| band.shares)
            .unwrap_or(AllocationShares {
                ordinary: Decimal::ONE,
                special_or_retirement: Decimal::ZERO,
                medisave: Decimal::ZERO,
            })
    }

    pub fn validate(&self) -> CpfResult<()> {
        if self.rate_bands.is_empty() {
            return Err(CpfError::invalid(
                "rate_bands",
                "At least one contribution rate band is required",
            ));
        }
        if self.allocation_bands.is_empty() {
            return Err(CpfError::invalid(
                "allocation_bands",
                "At least one allocation band is required",
            ));
        }

        let rate_ages: Vec<u32> = self.rate_bands.iter().map(|b| b.from_age).collect();
        check_ascending("rate_bands", &rate_ages)?;
        let allocation_ages: Vec<u32> = self.allocation_bands.iter().map(|b| b.from_age).collect();
        check_ascending("allocation_bands", &allocation_ages)?;

        for band in &self.rate_bands {
            let r = band.rates;
            for (name, value) in [("employee", r.employee), ("employer", r.employer)] {
                if value < Decimal::ZERO || value > Decimal::ONE {
                    return Err(CpfError::invalid(
                        "rate_bands",
                        format!(
                            "{name} rate {value} for ages from {} must be within [0, 1]",
                            band.from_age
                        ),
                    ));
                }
            }
            if r.total() > Decimal::ONE {
                return Err(CpfError::invalid(
                    "rate_bands",
                    format!("Combined rate for ages from {} exceeds 100%", band.from_age),
                ));
            }
        }

        for band in &self.allocation_bands {
            let s = band.shares;
            if s.ordinary < Decimal::ZERO
                || s.special_or_retirement < Decimal::ZERO
                || s.medisave < Decimal::ZERO
            {
                return Err(CpfError::invalid(
                    "allocation_bands",
                    format!("Negative share for ages from {}", band.from_age),
                ));
            }
            if (s.sum() - Decimal::ONE).abs() > SHARE_SUM_TOLERANCE {
                return Err(CpfError::invalid(
                    "allocation_bands",
                    format!(
                        "Shares for ages from {} sum to {}, expected 1",
                        band.from_age,
                        s.sum()
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn check_ascending(field: &str, ages: &[u32]) -> CpfResult<()> {
    if ages.first() != Some(&0) {
        return Err(CpfError::invalid(field, "The first band must start at age 0"));
    }
    if ages.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CpfError::invalid(
            field,
            "Band start ages must be strictly ascending",
        ));
    }
    Ok(())
}

impl RetirementSums {
    pub fn for_year(year: PolicyYear) -> Self {
        match year {
            PolicyYear::Y2024 => Self {
                basic: dec!(102_900),
                full: dec!(205_800),
                enhanced: dec!(308_700),
            },
            PolicyYear::Y2025 => Self {
                basic: dec!(106_500),
                full: dec!(213_000),
                enhanced: dec!(426_000),
            },
        }
    }

    pub fn amount_for(&self, tier: RetirementSumTier) -> Money {
        match tier {
            RetirementSumTier::Basic => self.basic,
            RetirementSumTier::Full => self.full,
            RetirementSumTier::Enhanced => self.enhanced,
        }
    }

    /// Highest tier whose threshold does not exceed `amount`.
    pub fn tier_for(&self, amount: Money) -> Option<RetirementSumTier> {
        if amount >= self.enhanced {
            Some(RetirementSumTier::Enhanced)
        } else if amount >= self.full {
            Some(RetirementSumTier::Full)
        } else if amount >= self.basic {
            Some(RetirementSumTier::Basic)
        } else {
            None
        }
    }
}

impl CpfPolicy {
    pub fn for_year(year: PolicyYear) -> Self {
        let (monthly_wage_ceiling, basic_healthcare_sum) = match year {
            PolicyYear::Y2024 => (dec!(6_800), dec!(71_500)),
            PolicyYear::Y2025 => (dec!(7_400), dec!(75_500)),
        };
        Self {
            year,
            contribution: ContributionRatePolicy::for_year(year),
            monthly_wage_ceiling,
            // Annual salary ceiling of $102,000 at the 37% combined rate
            annual_contribution_cap: Some(dec!(37_740)),
            retirement_sums: RetirementSums::for_year(year),
            basic_healthcare_sum,
            interest: InterestRates::default(),
            transfer_age: TRANSFER_AGE,
        }
    }

    pub fn rate_for(&self, age: u32) -> ContributionRates {
        self.contribution.rate_for(age)
    }

    pub fn allocation_for(&self, age: u32) -> AllocationShares {
        self.contribution.allocation_for(age)
    }

    pub fn validate(&self) -> CpfResult<()> {
        self.contribution.validate()?;

        if self.monthly_wage_ceiling < Decimal::ZERO || self.monthly_wage_ceiling > MAX_AMOUNT {
            return Err(CpfError::invalid(
                "monthly_wage_ceiling",
                format!("Must lie between 0 and {MAX_AMOUNT}"),
            ));
        }
        if let Some(cap) = self.annual_contribution_cap {
            if cap < Decimal::ZERO {
                return Err(CpfError::invalid(
                    "annual_contribution_cap",
                    "Cannot be negative",
                ));
            }
        }
        let sums = &self.retirement_sums;
        if sums.basic < Decimal::ZERO || sums.basic > sums.full || sums.full > sums.enhanced {
            return Err(CpfError::invalid(
                "retirement_sums",
                "Expected 0 <= basic <= full <= enhanced",
            ));
        }
        if self.basic_healthcare_sum < Decimal::ZERO {
            return Err(CpfError::invalid(
                "basic_healthcare_sum",
                "Cannot be negative",
            ));
        }
        let i = &self.interest;
        if [i.ordinary, i.special, i.retirement, i.medisave]
            .iter()
            .any(|r| *r <= dec!(-1) || *r > Decimal::ONE)
        {
            return Err(CpfError::invalid(
                "interest",
                "Interest rates must lie in (-100%, 100%]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BREAKPOINTS: [u32; 6] = [35, 45, 50, 55, 60, 65];

    #[test]
    fn test_allocation_shares_sum_to_one() {
        for year in [PolicyYear::Y2024, PolicyYear::Y2025] {
            let policy = ContributionRatePolicy::for_year(year);
            for age in 0..=100 {
                let sum = policy.allocation_for(age).sum();
                assert!(
                    (sum - Decimal::ONE).abs() <= SHARE_SUM_TOLERANCE,
                    "{year:?} age {age}: shares sum to {sum}"
                );
            }
        }
    }

    #[test]
    fn test_builtin_schedules_validate() {
        CpfPolicy::for_year(PolicyYear::Y2024).validate().unwrap();
        CpfPolicy::for_year(PolicyYear::Y2025).validate().unwrap();
    }

    #[test]
    fn test_schedule_changes_at_every_breakpoint() {
        let policy = ContributionRatePolicy::for_year(PolicyYear::Y2025);
        for age in BREAKPOINTS {
            let below = (policy.rate_for(age - 1), policy.allocation_for(age - 1));
            let at = (policy.rate_for(age), policy.allocation_for(age));
            assert_ne!(below, at, "no change at breakpoint {age}");
        }
    }

    #[test]
    fn test_rate_lookup_2025() {
        let policy = ContributionRatePolicy::for_year(PolicyYear::Y2025);
        let young = policy.rate_for(30);
        assert_eq!(young.employee, dec!(0.20));
        assert_eq!(young.employer, dec!(0.17));
        assert_eq!(young.total(), dec!(0.37));

        let at_55 = policy.rate_for(55);
        assert_eq!(at_55.total(), dec!(0.325));
        assert_eq!(policy.rate_for(54).total(), dec!(0.37));
    }

    #[test]
    fn test_oldest_band_applies_indefinitely() {
        let policy = ContributionRatePolicy::for_year(PolicyYear::Y2025);
        assert_eq!(policy.rate_for(70), policy.rate_for(120));
        assert_eq!(policy.allocation_for(70), policy.allocation_for(u32::MAX));
    }

    #[test]
    fn test_allocation_from_wage_percentages() {
        let band = AllocationBand::from_wage_percentages(0, dec!(23), dec!(6), dec!(8));
        // 23/37 ≈ 0.6216
        assert!((band.shares.ordinary - dec!(0.6216)).abs() < dec!(0.0001));
        assert!((band.shares.special_or_retirement - dec!(0.1622)).abs() < dec!(0.0001));
        assert_eq!(band.shares.sum(), Decimal::ONE);
    }

    #[test]
    fn test_rates_within_unit_interval() {
        let policy = ContributionRatePolicy::for_year(PolicyYear::Y2024);
        for band in &policy.rate_bands {
            assert!(band.rates.employee >= Decimal::ZERO && band.rates.employee <= Decimal::ONE);
            assert!(band.rates.employer >= Decimal::ZERO && band.rates.employer <= Decimal::ONE);
        }
    }

    #[test]
    fn test_tier_for_thresholds() {
        let sums = RetirementSums::for_year(PolicyYear::Y2025);
        assert_eq!(sums.tier_for(dec!(50_000)), None);
        assert_eq!(sums.tier_for(dec!(106_500)), Some(RetirementSumTier::Basic));
        assert_eq!(sums.tier_for(dec!(213_000)), Some(RetirementSumTier::Full));
        assert_eq!(sums.tier_for(dec!(300_000)), Some(RetirementSumTier::Full));
        assert_eq!(sums.tier_for(dec!(500_000)), Some(RetirementSumTier::Enhanced));
    }

    #[test]
    fn test_validate_rejects_bad_shares() {
        let mut policy = ContributionRatePolicy::for_year(PolicyYear::Y2025);
        policy.allocation_bands[0].shares.medisave = dec!(0.5);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsorted_bands() {
        let mut policy = ContributionRatePolicy::for_year(PolicyYear::Y2025);
        policy.rate_bands.swap(1, 2);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_rate_above_one() {
        let mut policy = ContributionRatePolicy::for_year(PolicyYear::Y2025);
        policy.rate_bands[0].rates.employee = dec!(1.2);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_misordered_retirement_sums() {
        let mut policy = CpfPolicy::default();
        policy.retirement_sums.full = dec!(1);
        assert!(policy.validate().is_err());
    }
}
