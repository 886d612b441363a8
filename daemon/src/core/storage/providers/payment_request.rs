use async_trait::async_trait;
use mint_common::{context::Context, currency::PaymentRequest};

use crate::core::error::LedgerError;

#[async_trait]
pub trait PaymentRequestProvider {
    async fn find_payment_request(
        &self,
        ctx: &Context,
        payment_request_id: &str,
    ) -> Result<Option<PaymentRequest>, LedgerError>;

    /// Insert a fresh request. The row is unique on `payment_request_id`;
    /// losing that race fails with `AlreadyProcessed`.
    async fn save_payment_request(
        &self,
        ctx: &Context,
        request: &PaymentRequest,
    ) -> Result<(), LedgerError>;

    /// Update an existing request. Guarded like `UPDATE .. WHERE state =
    /// 'pending'`: a row that is terminal, or claimed by a concurrent
    /// transaction, fails with `AlreadyProcessed`.
    async fn update_payment_request(
        &self,
        ctx: &Context,
        request: &PaymentRequest,
    ) -> Result<(), LedgerError>;
}
