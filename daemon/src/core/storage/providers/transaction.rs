use async_trait::async_trait;
use mint_common::{
    context::Context,
    currency::{EntryType, Kind, TransactionEntry},
};

use crate::core::error::LedgerError;

/// Optional narrowing applied to a user's history query.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFilter {
    pub kind: Option<Kind>,
    pub entry_type: Option<EntryType>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &TransactionEntry) -> bool {
        self.kind.map_or(true, |kind| entry.kind == kind)
            && self
                .entry_type
                .map_or(true, |entry_type| entry.entry_type == entry_type)
    }
}

#[async_trait]
pub trait TransactionProvider {
    /// Append one immutable log entry; `transaction_id` is unique.
    async fn save_entry(&self, ctx: &Context, entry: &TransactionEntry)
        -> Result<(), LedgerError>;

    async fn find_entry_by_id(
        &self,
        ctx: &Context,
        transaction_id: &str,
    ) -> Result<Option<TransactionEntry>, LedgerError>;

    /// Page through a user's entries, newest first. The returned total is
    /// the filtered count ignoring pagination.
    async fn find_entries_by_user(
        &self,
        ctx: &Context,
        user_id: &str,
        filter: HistoryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TransactionEntry>, usize), LedgerError>;

    /// All entries settled under a payment request, in write order
    /// (FREE leg before PAID leg).
    async fn find_entries_by_payment_request(
        &self,
        ctx: &Context,
        payment_request_id: &str,
    ) -> Result<Vec<TransactionEntry>, LedgerError>;
}
