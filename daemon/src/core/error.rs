use mint_common::currency::{BalanceError, Kind};
use thiserror::Error;

/// Closed error taxonomy of the ledger core.
///
/// The first ten variants are domain outcomes surfaced verbatim to the
/// transports; `Internal` is the sink for unexpected storage failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Amount must be strictly positive")]
    InvalidAmount,

    #[error("Unknown currency kind '{0}'")]
    InvalidKind(String),

    #[error("No {kind} balance for user {user_id}")]
    CurrencyNotFound { user_id: String, kind: Kind },

    #[error("Insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u64, have: u64 },

    #[error("Version conflict on balance {user_id}/{kind}")]
    VersionConflict { user_id: String, kind: Kind },

    #[error("Redemption code '{0}' not found")]
    CodeNotFound(String),

    #[error("Code '{0}' is not redeemable")]
    NotRedeemable(String),

    #[error("User {user_id} already redeemed code '{code}'")]
    AlreadyRedeemed { code: String, user_id: String },

    #[error("No ledger entries recorded for payment request '{0}'")]
    PaymentNotFound(String),

    #[error("Payment request '{0}' was already processed")]
    AlreadyProcessed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LedgerError {
    /// Stable label used by the "error" counter.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidKind(_) => "invalid_kind",
            Self::CurrencyNotFound { .. } => "currency_not_found",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::VersionConflict { .. } => "version_conflict",
            Self::CodeNotFound(_) => "code_not_found",
            Self::NotRedeemable(_) => "not_redeemable",
            Self::AlreadyRedeemed { .. } => "user_already_redeemed",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::Internal(_) => "internal",
        }
    }

    // Custom JSON-RPC codes stay inside the implementation-defined range
    pub fn rpc_code(&self) -> i16 {
        match self {
            Self::InvalidAmount => -101,
            Self::InvalidKind(_) => -102,
            Self::CurrencyNotFound { .. } => -103,
            Self::InsufficientBalance { .. } => -104,
            Self::VersionConflict { .. } => -105,
            Self::CodeNotFound(_) => -106,
            Self::NotRedeemable(_) => -107,
            Self::AlreadyRedeemed { .. } => -108,
            Self::PaymentNotFound(_) => -109,
            Self::AlreadyProcessed(_) => -110,
            Self::Internal(_) => -32603,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAmount | Self::InvalidKind(_) => 400,
            Self::CurrencyNotFound { .. } | Self::CodeNotFound(_) | Self::PaymentNotFound(_) => 404,
            Self::InsufficientBalance { .. }
            | Self::VersionConflict { .. }
            | Self::NotRedeemable(_)
            | Self::AlreadyRedeemed { .. }
            | Self::AlreadyProcessed(_) => 409,
            Self::Internal(_) => 500,
        }
    }
}

impl From<BalanceError> for LedgerError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::Insufficient { need, have } => {
                LedgerError::InsufficientBalance { need, have }
            }
            BalanceError::Overflow => LedgerError::Internal(anyhow::anyhow!("Balance overflow")),
        }
    }
}
