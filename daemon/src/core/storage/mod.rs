mod memory;
mod providers;

pub use self::{memory::MemoryStorage, providers::*};

/// Full storage surface required by the ledger use cases.
///
/// One trait per entity keeps each contract small; a backend implements the
/// union. All shared state lives behind this trait, the application holds
/// no cross-request caches.
pub trait Storage:
    BalanceProvider
    + TransactionProvider
    + PaymentRequestProvider
    + RedemptionProvider
    + TransactionalProvider
    + Sync
    + Send
    + 'static
{
}

impl<T> Storage for T where
    T: BalanceProvider
        + TransactionProvider
        + PaymentRequestProvider
        + RedemptionProvider
        + TransactionalProvider
        + Sync
        + Send
        + 'static
{
}
