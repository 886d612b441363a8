use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::TimestampMillis;

use super::Metadata;

/// Payment request lifecycle.
///
/// `Pending` is the only state from which processing may proceed; the three
/// other states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Accepted, settlement not yet attempted or still in flight.
    Pending,
    /// Settled, balances consumed.
    Completed,
    /// Settlement failed (insufficient balance).
    Failed,
    /// Cancelled before settlement.
    Cancelled,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }
}

#[derive(Debug, Error)]
#[error("Illegal payment transition from {from:?}")]
pub struct IllegalTransition {
    pub from: PaymentState,
}

/// Idempotency anchor for externally-initiated payments.
///
/// `payment_request_id` is the external id and the idempotency key: the row
/// is unique on it, and a replay against a terminal state short-circuits
/// without touching any balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub payment_request_id: String,
    pub user_id: String,
    pub amount: u64,
    /// Opaque label ("JPY", ...), never interpreted.
    pub currency_label: String,
    pub state: PaymentState,
    #[serde(default)]
    pub method_data: Metadata,
    #[serde(default)]
    pub details: Metadata,
    #[serde(default)]
    pub response: Metadata,
    pub created_at: TimestampMillis,
    pub updated_at: TimestampMillis,
}

impl PaymentRequest {
    pub fn pending(
        payment_request_id: impl Into<String>,
        user_id: impl Into<String>,
        amount: u64,
        currency_label: impl Into<String>,
        method_data: Metadata,
        details: Metadata,
        now: TimestampMillis,
    ) -> Self {
        Self {
            payment_request_id: payment_request_id.into(),
            user_id: user_id.into(),
            amount,
            currency_label: currency_label.into(),
            state: PaymentState::Pending,
            method_data,
            details,
            response: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: PaymentState, now: TimestampMillis) -> Result<(), IllegalTransition> {
        if self.state.is_terminal() {
            return Err(IllegalTransition { from: self.state });
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(
        &mut self,
        response: Metadata,
        now: TimestampMillis,
    ) -> Result<(), IllegalTransition> {
        self.transition(PaymentState::Completed, now)?;
        self.response = response;
        Ok(())
    }

    pub fn fail(&mut self, now: TimestampMillis) -> Result<(), IllegalTransition> {
        self.transition(PaymentState::Failed, now)
    }

    pub fn cancel(&mut self, now: TimestampMillis) -> Result<(), IllegalTransition> {
        self.transition(PaymentState::Cancelled, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest::pending(
            "pr1",
            "u1",
            500,
            "JPY",
            Metadata::new(),
            Metadata::new(),
            1_000,
        )
    }

    #[test]
    fn pending_completes_once() {
        let mut pr = request();
        pr.complete(Metadata::new(), 2_000).unwrap();
        assert_eq!(pr.state, PaymentState::Completed);
        assert_eq!(pr.updated_at, 2_000);

        // terminal states refuse any further transition
        assert!(pr.fail(3_000).is_err());
        assert!(pr.complete(Metadata::new(), 3_000).is_err());
        assert_eq!(pr.updated_at, 2_000);
    }

    #[test]
    fn pending_fails_once() {
        let mut pr = request();
        pr.fail(2_000).unwrap();
        assert_eq!(pr.state, PaymentState::Failed);
        assert!(pr.cancel(3_000).is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentState::Pending.is_terminal());
        assert!(PaymentState::Completed.is_terminal());
        assert!(PaymentState::Failed.is_terminal());
        assert!(PaymentState::Cancelled.is_terminal());
    }
}
