use std::{sync::Arc, time::Duration};

use mint_common::{
    context::Context,
    currency::{Balance, Kind},
};
use tokio::time::sleep;

use crate::core::{
    error::LedgerError,
    mutator::{BalanceChange, BalanceMutator},
    storage::{BalanceProvider, MemoryStorage, TransactionalProvider},
};

use super::open_transaction;

async fn seed_balance(storage: &MemoryStorage, user: &str, kind: Kind, amount: u64) -> Balance {
    let ctx = Context::new();
    let mut balance = Balance::initial(user, kind);
    storage.create_balance(&ctx, &balance).await.unwrap();
    balance.deposit(amount).unwrap();
    storage.save_balance(&ctx, &balance).await.unwrap()
}

#[tokio::test]
async fn grant_creates_the_missing_cell() {
    let storage = MemoryStorage::new();
    let mutator = BalanceMutator::default();
    let (ctx, handle) = open_transaction(&storage).await;

    let outcome = mutator
        .apply(&storage, &ctx, "u1", Kind::Paid, BalanceChange::Grant(1000))
        .await
        .unwrap();
    assert_eq!(outcome.balance_before, 0);
    assert_eq!(outcome.balance_after, 1000);
    // lazily created at version 0, bumped to 1 by the grant save
    assert_eq!(outcome.version, 1);

    storage.commit_transaction(handle).await.unwrap();
    let stored = storage
        .find_balance(&Context::new(), "u1", Kind::Paid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount, 1000);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn consume_without_cell_is_currency_not_found() {
    let storage = MemoryStorage::new();
    let mutator = BalanceMutator::default();
    let (ctx, _handle) = open_transaction(&storage).await;

    let err = mutator
        .apply(&storage, &ctx, "u1", Kind::Free, BalanceChange::Consume(1))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CurrencyNotFound { .. }));
}

#[tokio::test]
async fn consume_over_balance_is_insufficient() {
    let storage = MemoryStorage::new();
    let mutator = BalanceMutator::default();
    seed_balance(&storage, "u1", Kind::Paid, 100).await;
    let (ctx, handle) = open_transaction(&storage).await;

    let err = mutator
        .apply(&storage, &ctx, "u1", Kind::Paid, BalanceChange::Consume(101))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            need: 101,
            have: 100
        }
    ));

    storage.rollback_transaction(handle).await.unwrap();
    let stored = storage
        .find_balance(&Context::new(), "u1", Kind::Paid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount, 100);
}

#[tokio::test]
async fn consume_to_exactly_zero_succeeds() {
    let storage = MemoryStorage::new();
    let mutator = BalanceMutator::default();
    seed_balance(&storage, "u1", Kind::Free, 100).await;
    let (ctx, handle) = open_transaction(&storage).await;

    let outcome = mutator
        .apply(&storage, &ctx, "u1", Kind::Free, BalanceChange::Consume(100))
        .await
        .unwrap();
    assert_eq!(outcome.balance_after, 0);
    storage.commit_transaction(handle).await.unwrap();
}

#[tokio::test]
async fn lost_race_retries_after_the_winner_commits() {
    let storage = Arc::new(MemoryStorage::new());
    let committed = seed_balance(&storage, "u1", Kind::Paid, 100).await;

    // the winner stages a competing save and holds the row
    let (winner_ctx, winner_handle) = open_transaction(storage.as_ref()).await;
    let mut winner = committed.clone();
    winner.deposit(10).unwrap();
    storage.save_balance(&winner_ctx, &winner).await.unwrap();

    // the loser starts mutating while the row is busy
    let mutator = BalanceMutator::with_tuning(3, Duration::from_millis(20));
    let (loser_ctx, loser_handle) = open_transaction(storage.as_ref()).await;
    let task_storage = storage.clone();
    let task = tokio::spawn(async move {
        let outcome = mutator
            .apply(
                task_storage.as_ref(),
                &loser_ctx,
                "u1",
                Kind::Paid,
                BalanceChange::Grant(5),
            )
            .await?;
        task_storage.commit_transaction(loser_handle).await?;
        Ok::<_, LedgerError>(outcome)
    });

    // let the first attempt fail, then release the row
    sleep(Duration::from_millis(5)).await;
    storage.commit_transaction(winner_handle).await.unwrap();

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.balance_before, 110);
    assert_eq!(outcome.balance_after, 115);
    assert_eq!(outcome.version, 3);
}

#[tokio::test]
async fn conflicts_surface_after_attempts_run_out() {
    let storage = MemoryStorage::new();
    let committed = seed_balance(&storage, "u1", Kind::Paid, 100).await;

    // a transaction holds the row for the whole test
    let (holder_ctx, _holder_handle) = open_transaction(&storage).await;
    let mut holder = committed.clone();
    holder.deposit(1).unwrap();
    storage.save_balance(&holder_ctx, &holder).await.unwrap();

    let mutator = BalanceMutator::with_tuning(3, Duration::from_millis(1));
    let (ctx, _handle) = open_transaction(&storage).await;
    let err = mutator
        .apply(&storage, &ctx, "u1", Kind::Paid, BalanceChange::Grant(5))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::VersionConflict { .. }));
}
