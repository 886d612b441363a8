use std::time::Duration;

use log::{debug, trace};
use mint_common::{
    context::Context,
    currency::{Balance, Kind},
};
use tokio::time::sleep;

use super::{error::LedgerError, storage::Storage};

/// Attempts per mutation, counting the first one.
pub const MAX_SAVE_ATTEMPTS: usize = 3;
/// Backoff before retry n is `BASE_RETRY_BACKOFF << (n - 1)`.
pub const BASE_RETRY_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Grant(u64),
    Consume(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub balance_before: u64,
    pub balance_after: u64,
    pub version: u64,
}

/// Single-balance mutation under optimistic locking.
///
/// Balances are the contention hotspot of the whole service; instead of
/// row locks the save is a versioned CAS, and a lost race re-reads and
/// retries with exponential backoff until the attempts run out.
#[derive(Debug, Clone, Copy)]
pub struct BalanceMutator {
    max_attempts: usize,
    base_backoff: Duration,
}

impl Default for BalanceMutator {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SAVE_ATTEMPTS,
            base_backoff: BASE_RETRY_BACKOFF,
        }
    }
}

impl BalanceMutator {
    #[cfg(test)]
    pub fn with_tuning(max_attempts: usize, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
        }
    }

    pub async fn apply<S: Storage>(
        &self,
        storage: &S,
        ctx: &Context,
        user_id: &str,
        kind: Kind,
        change: BalanceChange,
    ) -> Result<MutationOutcome, LedgerError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = self.base_backoff * (1u32 << (attempt - 1));
                trace!(
                    "retrying balance save for {}/{} in {:?} (attempt {})",
                    user_id,
                    kind,
                    backoff,
                    attempt + 1
                );
                sleep(backoff).await;
            }

            let mut balance = match storage.find_balance(ctx, user_id, kind).await? {
                Some(balance) => balance,
                None => match change {
                    // first grant creates the cell lazily
                    BalanceChange::Grant(_) => {
                        let fresh = Balance::initial(user_id, kind);
                        match storage.create_balance(ctx, &fresh).await {
                            Ok(()) => fresh,
                            Err(LedgerError::VersionConflict { .. })
                                if attempt + 1 < self.max_attempts =>
                            {
                                attempt += 1;
                                continue;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    BalanceChange::Consume(_) => {
                        return Err(LedgerError::CurrencyNotFound {
                            user_id: user_id.to_string(),
                            kind,
                        })
                    }
                },
            };

            let balance_before = balance.amount;
            match change {
                BalanceChange::Grant(amount) => balance.deposit(amount)?,
                BalanceChange::Consume(amount) => balance.withdraw(amount)?,
            }

            match storage.save_balance(ctx, &balance).await {
                Ok(saved) => {
                    return Ok(MutationOutcome {
                        balance_before,
                        balance_after: saved.amount,
                        version: saved.version,
                    })
                }
                Err(LedgerError::VersionConflict { .. }) if attempt + 1 < self.max_attempts => {
                    attempt += 1;
                }
                Err(err) => {
                    if matches!(err, LedgerError::VersionConflict { .. }) {
                        debug!(
                            "balance save for {}/{} still conflicting after {} attempts",
                            user_id, kind, self.max_attempts
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
