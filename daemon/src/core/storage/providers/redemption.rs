use async_trait::async_trait;
use mint_common::{
    context::Context,
    currency::{Redemption, RedemptionCode},
};

use crate::core::error::LedgerError;

#[async_trait]
pub trait RedemptionProvider {
    async fn find_code(
        &self,
        ctx: &Context,
        code: &str,
    ) -> Result<Option<RedemptionCode>, LedgerError>;

    /// Persist the use counter. A code claimed by a concurrent transaction
    /// fails with `NotRedeemable`; the caller's unit-of-work rolls back and
    /// no grant happens.
    async fn update_code(&self, ctx: &Context, code: &RedemptionCode) -> Result<(), LedgerError>;

    /// Seed a code row. Admin surface only.
    async fn save_code(&self, ctx: &Context, code: &RedemptionCode) -> Result<(), LedgerError>;

    async fn has_user_redeemed(
        &self,
        ctx: &Context,
        code: &str,
        user_id: &str,
    ) -> Result<bool, LedgerError>;

    /// Record a redemption; unique per (code, user). Losing the uniqueness
    /// race fails with `AlreadyRedeemed`.
    async fn save_redemption(
        &self,
        ctx: &Context,
        redemption: &Redemption,
    ) -> Result<(), LedgerError>;
}
