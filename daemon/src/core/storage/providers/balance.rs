use async_trait::async_trait;
use mint_common::{
    context::Context,
    currency::{Balance, Kind},
};

use crate::core::error::LedgerError;

#[async_trait]
pub trait BalanceProvider {
    /// Get the balance cell for (user, kind), if it exists.
    async fn find_balance(
        &self,
        ctx: &Context,
        user_id: &str,
        kind: Kind,
    ) -> Result<Option<Balance>, LedgerError>;

    /// Insert a fresh cell. Fails with a version conflict when the cell
    /// already exists or is being created by a concurrent transaction, so
    /// callers fall back to their read-retry path.
    async fn create_balance(&self, ctx: &Context, balance: &Balance) -> Result<(), LedgerError>;

    /// Versioned save. Fails with `VersionConflict` iff the stored version
    /// differs from `balance.version` at save time (the CAS analogue of
    /// `UPDATE .. WHERE version = :v` matching no row). On success the
    /// stored version is `balance.version + 1`; the returned row carries it.
    async fn save_balance(&self, ctx: &Context, balance: &Balance)
        -> Result<Balance, LedgerError>;
}
