use serde::{Deserialize, Serialize};

use crate::time::TimestampMillis;

use super::{Kind, Metadata};

/// Suffix appended to the shared root id for the FREE leg of a composite
/// mutation.
pub const FREE_ENTRY_SUFFIX: &str = "_free";
/// Suffix appended to the shared root id for the PAID leg.
pub const PAID_ENTRY_SUFFIX: &str = "_paid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Grant,
    Consume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Failed,
}

/// Immutable record of one balance mutation.
///
/// Append-only: once written the entry is never updated. Composite
/// operations (priority consume, payment settlement) write one entry per
/// touched kind, sharing a root id with the `_free` / `_paid` suffixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub transaction_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub kind: Kind,
    pub amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub status: EntryStatus,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_request_id: Option<String>,
    pub created_at: TimestampMillis,
}

impl TransactionEntry {
    /// Completed grant: balance went up by `amount`.
    pub fn grant(
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
        kind: Kind,
        amount: u64,
        balance_before: u64,
        metadata: Metadata,
        created_at: TimestampMillis,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            entry_type: EntryType::Grant,
            kind,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            status: EntryStatus::Completed,
            metadata,
            payment_request_id: None,
            created_at,
        }
    }

    /// Completed consume: balance went down by `amount`.
    pub fn consume(
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
        kind: Kind,
        amount: u64,
        balance_before: u64,
        metadata: Metadata,
        created_at: TimestampMillis,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            entry_type: EntryType::Consume,
            kind,
            amount,
            balance_before,
            balance_after: balance_before - amount,
            status: EntryStatus::Completed,
            metadata,
            payment_request_id: None,
            created_at,
        }
    }

    pub fn with_payment_request(mut self, payment_request_id: impl Into<String>) -> Self {
        self.payment_request_id = Some(payment_request_id.into());
        self
    }

    /// Root shared by the two legs of a composite mutation, with the
    /// per-kind suffix stripped. Plain entries return their own id.
    pub fn root_id(&self) -> &str {
        self.transaction_id
            .strip_suffix(FREE_ENTRY_SUFFIX)
            .or_else(|| self.transaction_id.strip_suffix(PAID_ENTRY_SUFFIX))
            .unwrap_or(&self.transaction_id)
    }
}

/// Id of the FREE leg under the given root.
pub fn free_entry_id(root: &str) -> String {
    format!("{}{}", root, FREE_ENTRY_SUFFIX)
}

/// Id of the PAID leg under the given root.
pub fn paid_entry_id(root: &str) -> String {
    format!("{}{}", root, PAID_ENTRY_SUFFIX)
}
