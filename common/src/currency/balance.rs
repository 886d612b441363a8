use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Kind;

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Balance overflow")]
    Overflow,

    #[error("Insufficient balance: need {need}, have {have}")]
    Insufficient { need: u64, have: u64 },
}

/// Per-(user, kind) ledger cell.
///
/// `version` is the optimistic-lock counter: the storage layer bumps it by
/// exactly one on every successful save and rejects saves whose in-memory
/// version no longer matches the stored one. The amount is unsigned so the
/// non-negativity invariant holds by construction; withdrawals go through
/// checked arithmetic instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: String,
    pub kind: Kind,
    pub amount: u64,
    pub version: u64,
}

impl Balance {
    /// Fresh cell as lazily created on the first grant for a (user, kind).
    pub fn initial(user_id: impl Into<String>, kind: Kind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            amount: 0,
            version: 0,
        }
    }

    pub fn deposit(&mut self, amount: u64) -> Result<(), BalanceError> {
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or(BalanceError::Overflow)?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: u64) -> Result<(), BalanceError> {
        if amount > self.amount {
            return Err(BalanceError::Insufficient {
                need: amount,
                have: self.amount,
            });
        }
        self.amount -= amount;
        Ok(())
    }
}
