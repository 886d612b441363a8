mod mutator_tests;
mod storage_tests;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use mint_common::{
    context::Context,
    time::{Clock, TimestampMillis},
};

use super::{ids::IdGenerator, ledger::Ledger, storage::MemoryStorage, storage::Storage};

/// Deterministic ids: txn_1, txn_2, ... / red_1, red_2, ...
pub struct SequentialIdGenerator {
    transactions: AtomicU64,
    redemptions: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self {
            transactions: AtomicU64::new(0),
            redemptions: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn transaction_id(&self) -> String {
        format!("txn_{}", self.transactions.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn redemption_id(&self) -> String {
        format!("red_{}", self.redemptions.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Clock pinned by the test.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: TimestampMillis) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: TimestampMillis) {
        self.now.store(now, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> TimestampMillis {
        self.now.load(Ordering::Relaxed)
    }
}

pub const TEST_NOW: TimestampMillis = 1_000_000;

pub fn test_ledger() -> (Ledger<MemoryStorage>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(TEST_NOW));
    let ledger = Ledger::new(
        Arc::new(MemoryStorage::new()),
        clock.clone(),
        Arc::new(SequentialIdGenerator::new()),
    );
    (ledger, clock)
}

/// Context bound to a fresh transaction on the given storage.
pub async fn open_transaction<S: Storage>(storage: &S) -> (Context, super::storage::TxHandle) {
    let handle = storage.begin_transaction().await.unwrap();
    let mut ctx = Context::new();
    ctx.store(handle.clone());
    (ctx, handle)
}
