use mint_common::{
    context::Context,
    currency::{Balance, Kind, Metadata, PaymentRequest, Redemption, TransactionEntry},
};

use crate::core::{
    error::LedgerError,
    storage::{
        BalanceProvider, HistoryFilter, MemoryStorage, PaymentRequestProvider,
        RedemptionProvider, TransactionProvider, TransactionalProvider,
    },
};

use super::open_transaction;

fn entry(id: &str, user: &str) -> TransactionEntry {
    TransactionEntry::grant(id, user, Kind::Paid, 100, 0, Metadata::new(), 1)
}

#[tokio::test]
async fn save_bumps_version_by_one() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    let mut balance = Balance::initial("u1", Kind::Paid);
    storage.create_balance(&ctx, &balance).await.unwrap();

    balance.deposit(100).unwrap();
    let saved = storage.save_balance(&ctx, &balance).await.unwrap();
    assert_eq!(saved.version, 1);
    assert_eq!(saved.amount, 100);

    let stored = storage
        .find_balance(&ctx, "u1", Kind::Paid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn stale_version_save_conflicts() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    let mut balance = Balance::initial("u1", Kind::Paid);
    storage.create_balance(&ctx, &balance).await.unwrap();
    balance.deposit(100).unwrap();
    storage.save_balance(&ctx, &balance).await.unwrap();

    // still holding version 0
    let stale = balance;
    assert!(matches!(
        storage.save_balance(&ctx, &stale).await,
        Err(LedgerError::VersionConflict { .. })
    ));

    // the stored row is untouched by the failed save
    let stored = storage
        .find_balance(&ctx, "u1", Kind::Paid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.amount, 100);
}

#[tokio::test]
async fn uncommitted_writes_are_invisible_until_commit() {
    let storage = MemoryStorage::new();
    let (tx_ctx, handle) = open_transaction(&storage).await;

    let balance = Balance::initial("u1", Kind::Free);
    storage.create_balance(&tx_ctx, &balance).await.unwrap();
    storage.save_entry(&tx_ctx, &entry("txn_1", "u1")).await.unwrap();

    // the transaction sees its own writes
    assert!(storage
        .find_balance(&tx_ctx, "u1", Kind::Free)
        .await
        .unwrap()
        .is_some());
    assert!(storage
        .find_entry_by_id(&tx_ctx, "txn_1")
        .await
        .unwrap()
        .is_some());

    // outside readers do not
    let outside = Context::new();
    assert!(storage
        .find_balance(&outside, "u1", Kind::Free)
        .await
        .unwrap()
        .is_none());
    assert!(storage
        .find_entry_by_id(&outside, "txn_1")
        .await
        .unwrap()
        .is_none());

    storage.commit_transaction(handle).await.unwrap();

    // both writes became visible together
    assert!(storage
        .find_balance(&outside, "u1", Kind::Free)
        .await
        .unwrap()
        .is_some());
    assert!(storage
        .find_entry_by_id(&outside, "txn_1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn rollback_discards_every_write() {
    let storage = MemoryStorage::new();
    let (tx_ctx, handle) = open_transaction(&storage).await;

    storage
        .create_balance(&tx_ctx, &Balance::initial("u1", Kind::Paid))
        .await
        .unwrap();
    storage.save_entry(&tx_ctx, &entry("txn_1", "u1")).await.unwrap();
    storage.rollback_transaction(handle).await.unwrap();

    let ctx = Context::new();
    assert!(storage
        .find_balance(&ctx, "u1", Kind::Paid)
        .await
        .unwrap()
        .is_none());
    assert!(storage.find_entry_by_id(&ctx, "txn_1").await.unwrap().is_none());

    // the slot is free again after the discarded create
    storage
        .create_balance(&ctx, &Balance::initial("u1", Kind::Paid))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_writer_hits_busy_row() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    let mut balance = Balance::initial("u1", Kind::Paid);
    storage.create_balance(&ctx, &balance).await.unwrap();
    balance.deposit(100).unwrap();
    let committed = storage.save_balance(&ctx, &balance).await.unwrap();

    // first transaction stages a save and holds the row
    let (tx1_ctx, _handle1) = open_transaction(&storage).await;
    let mut first = committed.clone();
    first.deposit(10).unwrap();
    storage.save_balance(&tx1_ctx, &first).await.unwrap();

    // a second transaction saving the same cell loses, whatever version it
    // holds
    let (tx2_ctx, _handle2) = open_transaction(&storage).await;
    let mut second = committed.clone();
    second.deposit(20).unwrap();
    assert!(matches!(
        storage.save_balance(&tx2_ctx, &second).await,
        Err(LedgerError::VersionConflict { .. })
    ));
}

#[tokio::test]
async fn dropped_transaction_acts_as_rolled_back() {
    let storage = MemoryStorage::new();
    let (tx_ctx, handle) = open_transaction(&storage).await;
    storage
        .create_balance(&tx_ctx, &Balance::initial("u1", Kind::Free))
        .await
        .unwrap();

    // the request future went away without settling
    drop(tx_ctx);
    drop(handle);

    let ctx = Context::new();
    assert!(storage
        .find_balance(&ctx, "u1", Kind::Free)
        .await
        .unwrap()
        .is_none());
    // and the orphaned pending row does not block a new writer
    storage
        .create_balance(&ctx, &Balance::initial("u1", Kind::Free))
        .await
        .unwrap();
}

#[tokio::test]
async fn transaction_ids_are_unique() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    storage.save_entry(&ctx, &entry("txn_1", "u1")).await.unwrap();

    let duplicate = storage.save_entry(&ctx, &entry("txn_1", "u2")).await;
    assert!(matches!(duplicate, Err(LedgerError::Internal(_))));
}

#[tokio::test]
async fn history_pages_newest_first_with_total() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    for i in 1..=5 {
        storage
            .save_entry(&ctx, &entry(&format!("txn_{}", i), "u1"))
            .await
            .unwrap();
    }
    storage.save_entry(&ctx, &entry("txn_other", "u2")).await.unwrap();

    let (page, total) = storage
        .find_entries_by_user(&ctx, "u1", HistoryFilter::default(), 2, 1)
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    // newest first, offset skips the newest
    assert_eq!(page[0].transaction_id, "txn_4");
    assert_eq!(page[1].transaction_id, "txn_3");
}

#[tokio::test]
async fn payment_request_is_unique_on_id() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    let request = PaymentRequest::pending(
        "pr1",
        "u1",
        100,
        "JPY",
        Metadata::new(),
        Metadata::new(),
        1,
    );
    storage.save_payment_request(&ctx, &request).await.unwrap();

    assert!(matches!(
        storage.save_payment_request(&ctx, &request).await,
        Err(LedgerError::AlreadyProcessed(_))
    ));
}

#[tokio::test]
async fn settled_payment_request_refuses_updates() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    let mut request = PaymentRequest::pending(
        "pr1",
        "u1",
        100,
        "JPY",
        Metadata::new(),
        Metadata::new(),
        1,
    );
    storage.save_payment_request(&ctx, &request).await.unwrap();
    request.complete(Metadata::new(), 2).unwrap();
    storage.update_payment_request(&ctx, &request).await.unwrap();

    // a second settlement attempt is the `WHERE state = 'pending'` race
    assert!(matches!(
        storage.update_payment_request(&ctx, &request).await,
        Err(LedgerError::AlreadyProcessed(_))
    ));
}

#[tokio::test]
async fn redemption_is_unique_per_code_and_user() {
    let storage = MemoryStorage::new();
    let ctx = Context::new();
    let redemption = Redemption {
        redemption_id: "red_1".to_string(),
        code: "WELCOME".to_string(),
        user_id: "u1".to_string(),
        transaction_id: "txn_1".to_string(),
        redeemed_at: 1,
    };
    storage.save_redemption(&ctx, &redemption).await.unwrap();
    assert!(storage.has_user_redeemed(&ctx, "WELCOME", "u1").await.unwrap());
    assert!(!storage.has_user_redeemed(&ctx, "WELCOME", "u2").await.unwrap());

    let again = Redemption {
        redemption_id: "red_2".to_string(),
        ..redemption
    };
    assert!(matches!(
        storage.save_redemption(&ctx, &again).await,
        Err(LedgerError::AlreadyRedeemed { .. })
    ));
}
