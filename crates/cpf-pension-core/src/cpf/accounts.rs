use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cpf::policy::{AllocationShares, InterestRates, RetirementSumTier, RetirementSums};
use crate::types::Money;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The four CPF account balances. All amounts stay non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountBalances {
    pub ordinary: Money,
    pub special: Money,
    pub retirement: Money,
    pub medisave: Money,
}

/// Interest credited to each account in one year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestCredit {
    pub ordinary: Money,
    pub special: Money,
    pub retirement: Money,
    pub medisave: Money,
}

impl InterestCredit {
    pub fn total(&self) -> Money {
        self.ordinary + self.special + self.retirement + self.medisave
    }
}

/// Where one year's contribution landed after overflow handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredit {
    pub ordinary: Money,
    pub special: Money,
    pub retirement: Money,
    pub medisave: Money,
    /// Portion of the medisave share diverted because the Basic Healthcare
    /// Sum was reached.
    pub medisave_overflow: Money,
}

impl AccountCredit {
    pub fn total(&self) -> Money {
        self.ordinary + self.special + self.retirement + self.medisave
    }
}

/// Caps that govern where a contribution may go.
#[derive(Debug, Clone, Copy)]
pub struct AllocationLimits {
    pub basic_healthcare_sum: Money,
    /// Retirement balance target once the account exists.
    pub retirement_target: Money,
    /// Whether the transfer has run (Special closed, Retirement open).
    pub transferred: bool,
}

/// Record of the one-time transfer into the Retirement account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub age: u32,
    pub ordinary_before: Money,
    pub special_before: Money,
    pub retirement_before: Money,
    /// Ordinary + Special at the moment of transfer.
    pub transferable: Money,
    pub target_tier: RetirementSumTier,
    pub target: Money,
    pub moved_from_special: Money,
    pub moved_from_ordinary: Money,
    /// Special savings above the target, returned to Ordinary.
    pub special_to_ordinary: Money,
    pub ordinary_after: Money,
    pub retirement_after: Money,
    /// Highest retirement sum covered by Ordinary + Special, if any.
    pub achieved_tier: Option<RetirementSumTier>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl AccountBalances {
    pub fn total(&self) -> Money {
        self.ordinary + self.special + self.retirement + self.medisave
    }

    /// Balances that are not annuitised: everything but Retirement.
    pub fn non_annuitised(&self) -> Money {
        self.ordinary + self.special + self.medisave
    }

    pub fn is_non_negative(&self) -> bool {
        self.ordinary >= Decimal::ZERO
            && self.special >= Decimal::ZERO
            && self.retirement >= Decimal::ZERO
            && self.medisave >= Decimal::ZERO
    }

    /// Credit one year of interest to every account.
    pub fn apply_interest(&mut self, rates: &InterestRates) -> InterestCredit {
        let credit = InterestCredit {
            ordinary: self.ordinary * rates.ordinary,
            special: self.special * rates.special,
            retirement: self.retirement * rates.retirement,
            medisave: self.medisave * rates.medisave,
        };
        self.ordinary += credit.ordinary;
        self.special += credit.special;
        self.retirement += credit.retirement;
        self.medisave += credit.medisave;
        credit
    }

    /// Split `total` by `shares` and credit it, diverting medisave overflow.
    ///
    /// Before the transfer, overflow above the Basic Healthcare Sum goes to
    /// Special. Afterwards both the retirement share and any overflow fill
    /// Retirement up to its target, and the remainder goes to Ordinary.
    pub fn allocate(
        &mut self,
        total: Money,
        shares: &AllocationShares,
        limits: &AllocationLimits,
    ) -> AccountCredit {
        if total <= Decimal::ZERO {
            return AccountCredit::default();
        }

        let mut ordinary = total * shares.ordinary;
        let middle = total * shares.special_or_retirement;
        // Medisave takes the remainder so the split conserves `total` exactly
        let medisave_share = (total - ordinary - middle).max(Decimal::ZERO);

        let medisave_room = (limits.basic_healthcare_sum - self.medisave).max(Decimal::ZERO);
        let medisave = medisave_share.min(medisave_room);
        let overflow = medisave_share - medisave;

        let mut special = Decimal::ZERO;
        let mut retirement = Decimal::ZERO;

        if limits.transferred {
            let mut room = (limits.retirement_target - self.retirement).max(Decimal::ZERO);
            for portion in [middle, overflow] {
                let kept = portion.min(room);
                retirement += kept;
                room -= kept;
                ordinary += portion - kept;
            }
        } else {
            special = middle + overflow;
        }

        self.ordinary += ordinary;
        self.special += special;
        self.retirement += retirement;
        self.medisave += medisave;

        AccountCredit {
            ordinary,
            special,
            retirement,
            medisave,
            medisave_overflow: overflow,
        }
    }

    /// Form the Retirement account: Special first, then Ordinary, until the
    /// target tier's sum is reached. Special left over moves to Ordinary, so
    /// Ordinary + Special + Retirement is conserved.
    pub fn transfer_to_retirement(
        &mut self,
        age: u32,
        sums: &RetirementSums,
        target_tier: RetirementSumTier,
    ) -> TransferEvent {
        let ordinary_before = self.ordinary;
        let special_before = self.special;
        let retirement_before = self.retirement;
        let transferable = ordinary_before + special_before;
        let target = sums.amount_for(target_tier);

        let gap = (target - retirement_before).max(Decimal::ZERO);
        let moved_from_special = special_before.min(gap);
        let moved_from_ordinary = ordinary_before.min(gap - moved_from_special);
        let special_to_ordinary = special_before - moved_from_special;

        self.special = Decimal::ZERO;
        self.ordinary = ordinary_before - moved_from_ordinary + special_to_ordinary;
        self.retirement = retirement_before + moved_from_special + moved_from_ordinary;

        TransferEvent {
            age,
            ordinary_before,
            special_before,
            retirement_before,
            transferable,
            target_tier,
            target,
            moved_from_special,
            moved_from_ordinary,
            special_to_ordinary,
            ordinary_after: self.ordinary,
            retirement_after: self.retirement,
            achieved_tier: sums.tier_for(transferable),
        }
    }
}
