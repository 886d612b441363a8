//! In-memory reference backend.
//!
//! Committed rows live in plain maps; a write issued inside a unit-of-work
//! is staged as a *pending* row tagged with the owning transaction id and a
//! liveness token. Readers inside the transaction see their own pending
//! rows, everyone else sees committed state only, and commit publishes the
//! whole write set under one lock. A transaction whose handle was dropped
//! without settling (cancelled request) leaves only dead pending rows,
//! which every access treats as absent and prunes.

use std::{
    collections::HashMap,
    mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use log::trace;
use mint_common::{
    context::Context,
    currency::{Balance, Kind, PaymentRequest, Redemption, RedemptionCode, TransactionEntry},
};

use crate::core::error::LedgerError;

use super::providers::{
    ambient_transaction, BalanceProvider, HistoryFilter, PaymentRequestProvider,
    RedemptionProvider, TransactionProvider, TransactionalProvider, TxHandle,
};

struct Pending<T> {
    tx: u64,
    alive: Weak<()>,
    value: T,
}

impl<T> Pending<T> {
    fn is_live(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

#[derive(Default)]
struct BalanceCell {
    committed: Option<Balance>,
    pending: Option<Pending<Balance>>,
}

impl BalanceCell {
    fn prune(&mut self) {
        if self.pending.as_ref().is_some_and(|p| !p.is_live()) {
            self.pending = None;
        }
    }

    fn is_empty(&self) -> bool {
        self.committed.is_none() && self.pending.is_none()
    }
}

type BalanceKey = (String, Kind);
/// (code, user_id)
type RedemptionKey = (String, String);

#[derive(Default)]
struct Inner {
    balances: HashMap<BalanceKey, BalanceCell>,
    entries: Vec<TransactionEntry>,
    pending_entries: Vec<Pending<TransactionEntry>>,
    payment_requests: HashMap<String, PaymentRequest>,
    pending_payment_requests: HashMap<String, Pending<PaymentRequest>>,
    codes: HashMap<String, RedemptionCode>,
    pending_codes: HashMap<String, Pending<RedemptionCode>>,
    redemptions: HashMap<RedemptionKey, Redemption>,
    pending_redemptions: HashMap<RedemptionKey, Pending<Redemption>>,
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
    next_tx_id: AtomicU64,
}

/// Transaction identity of the ambient unit-of-work: id plus liveness.
fn tx_of(ctx: &Context) -> Option<(u64, Weak<()>)> {
    ambient_transaction(ctx).map(|handle| (handle.id(), handle.liveness()))
}

fn version_conflict(balance: &Balance) -> LedgerError {
    LedgerError::VersionConflict {
        user_id: balance.user_id.clone(),
        kind: balance.kind,
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("storage lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("storage lock poisoned")
    }

    /// Settle a transaction: publish its pending rows when `commit` is
    /// true, discard them otherwise. Dead rows from abandoned transactions
    /// are dropped either way.
    fn settle(&self, tx: u64, commit: bool) {
        let mut inner = self.write();

        for cell in inner.balances.values_mut() {
            if let Some(pending) = &cell.pending {
                if pending.tx == tx {
                    let pending = cell.pending.take();
                    if commit {
                        if let Some(pending) = pending {
                            cell.committed = Some(pending.value);
                        }
                    }
                } else if !pending.is_live() {
                    cell.pending = None;
                }
            }
        }
        inner.balances.retain(|_, cell| !cell.is_empty());

        for pending in mem::take(&mut inner.pending_entries) {
            if pending.tx == tx {
                if commit {
                    inner.entries.push(pending.value);
                }
            } else if pending.is_live() {
                inner.pending_entries.push(pending);
            }
        }

        for (key, pending) in mem::take(&mut inner.pending_payment_requests) {
            if pending.tx == tx {
                if commit {
                    inner.payment_requests.insert(key, pending.value);
                }
            } else if pending.is_live() {
                inner.pending_payment_requests.insert(key, pending);
            }
        }

        for (key, pending) in mem::take(&mut inner.pending_codes) {
            if pending.tx == tx {
                if commit {
                    inner.codes.insert(key, pending.value);
                }
            } else if pending.is_live() {
                inner.pending_codes.insert(key, pending);
            }
        }

        for (key, pending) in mem::take(&mut inner.pending_redemptions) {
            if pending.tx == tx {
                if commit {
                    inner.redemptions.insert(key, pending.value);
                }
            } else if pending.is_live() {
                inner.pending_redemptions.insert(key, pending);
            }
        }
    }
}

#[async_trait]
impl TransactionalProvider for MemoryStorage {
    async fn begin_transaction(&self) -> Result<TxHandle, LedgerError> {
        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("begin transaction {}", id);
        Ok(TxHandle::new(id))
    }

    async fn commit_transaction(&self, handle: TxHandle) -> Result<(), LedgerError> {
        trace!("commit transaction {}", handle.id());
        self.settle(handle.id(), true);
        Ok(())
    }

    async fn rollback_transaction(&self, handle: TxHandle) -> Result<(), LedgerError> {
        trace!("rollback transaction {}", handle.id());
        self.settle(handle.id(), false);
        Ok(())
    }
}

#[async_trait]
impl BalanceProvider for MemoryStorage {
    async fn find_balance(
        &self,
        ctx: &Context,
        user_id: &str,
        kind: Kind,
    ) -> Result<Option<Balance>, LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();
        let Some(cell) = inner.balances.get(&(user_id.to_string(), kind)) else {
            return Ok(None);
        };

        if let (Some(pending), Some((tx_id, _))) = (&cell.pending, &tx) {
            if pending.is_live() && pending.tx == *tx_id {
                return Ok(Some(pending.value.clone()));
            }
        }
        Ok(cell.committed.clone())
    }

    async fn create_balance(&self, ctx: &Context, balance: &Balance) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();
        let cell = inner
            .balances
            .entry((balance.user_id.clone(), balance.kind))
            .or_default();
        cell.prune();

        // an existing row, committed or being created concurrently, makes
        // the insert lose; callers re-read and retry
        if cell.committed.is_some() || cell.pending.is_some() {
            return Err(version_conflict(balance));
        }

        match tx {
            Some((tx_id, alive)) => {
                cell.pending = Some(Pending {
                    tx: tx_id,
                    alive,
                    value: balance.clone(),
                });
            }
            None => cell.committed = Some(balance.clone()),
        }
        Ok(())
    }

    async fn save_balance(
        &self,
        ctx: &Context,
        balance: &Balance,
    ) -> Result<Balance, LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();
        let Some(cell) = inner
            .balances
            .get_mut(&(balance.user_id.clone(), balance.kind))
        else {
            return Err(version_conflict(balance));
        };
        cell.prune();

        // a live pending write from another transaction is the busy-row
        // case: the versioned update would match no committed row
        match (&cell.pending, &tx) {
            (Some(pending), Some((tx_id, _))) if pending.tx != *tx_id => {
                return Err(version_conflict(balance));
            }
            (Some(_), None) => return Err(version_conflict(balance)),
            _ => {}
        }

        let visible_version = match &cell.pending {
            Some(pending) => Some(pending.value.version),
            None => cell.committed.as_ref().map(|stored| stored.version),
        };
        if visible_version != Some(balance.version) {
            trace!(
                "stale save on balance {}/{}: stored {:?}, held {}",
                balance.user_id,
                balance.kind,
                visible_version,
                balance.version
            );
            return Err(version_conflict(balance));
        }

        let mut saved = balance.clone();
        saved.version += 1;
        match tx {
            Some((tx_id, alive)) => {
                cell.pending = Some(Pending {
                    tx: tx_id,
                    alive,
                    value: saved.clone(),
                });
            }
            None => cell.committed = Some(saved.clone()),
        }
        Ok(saved)
    }
}

#[async_trait]
impl TransactionProvider for MemoryStorage {
    async fn save_entry(
        &self,
        ctx: &Context,
        entry: &TransactionEntry,
    ) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();

        let duplicate = inner
            .entries
            .iter()
            .any(|stored| stored.transaction_id == entry.transaction_id)
            || inner
                .pending_entries
                .iter()
                .any(|p| p.is_live() && p.value.transaction_id == entry.transaction_id);
        if duplicate {
            return Err(LedgerError::Internal(anyhow!(
                "Duplicate transaction entry '{}'",
                entry.transaction_id
            )));
        }

        match tx {
            Some((tx_id, alive)) => inner.pending_entries.push(Pending {
                tx: tx_id,
                alive,
                value: entry.clone(),
            }),
            None => inner.entries.push(entry.clone()),
        }
        Ok(())
    }

    async fn find_entry_by_id(
        &self,
        ctx: &Context,
        transaction_id: &str,
    ) -> Result<Option<TransactionEntry>, LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();

        if let Some((tx_id, _)) = &tx {
            let own = inner
                .pending_entries
                .iter()
                .find(|p| p.is_live() && p.tx == *tx_id && p.value.transaction_id == transaction_id);
            if let Some(pending) = own {
                return Ok(Some(pending.value.clone()));
            }
        }
        Ok(inner
            .entries
            .iter()
            .find(|stored| stored.transaction_id == transaction_id)
            .cloned())
    }

    async fn find_entries_by_user(
        &self,
        ctx: &Context,
        user_id: &str,
        filter: HistoryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TransactionEntry>, usize), LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();

        let mut matched: Vec<&TransactionEntry> = inner
            .entries
            .iter()
            .filter(|entry| entry.user_id == user_id && filter.matches(entry))
            .collect();
        if let Some((tx_id, _)) = &tx {
            matched.extend(
                inner
                    .pending_entries
                    .iter()
                    .filter(|p| p.is_live() && p.tx == *tx_id)
                    .map(|p| &p.value)
                    .filter(|entry| entry.user_id == user_id && filter.matches(entry)),
            );
        }

        // newest first
        matched.reverse();
        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_entries_by_payment_request(
        &self,
        ctx: &Context,
        payment_request_id: &str,
    ) -> Result<Vec<TransactionEntry>, LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();

        let mut matched: Vec<TransactionEntry> = inner
            .entries
            .iter()
            .filter(|entry| entry.payment_request_id.as_deref() == Some(payment_request_id))
            .cloned()
            .collect();
        if let Some((tx_id, _)) = &tx {
            matched.extend(
                inner
                    .pending_entries
                    .iter()
                    .filter(|p| {
                        p.is_live()
                            && p.tx == *tx_id
                            && p.value.payment_request_id.as_deref() == Some(payment_request_id)
                    })
                    .map(|p| p.value.clone()),
            );
        }
        Ok(matched)
    }
}

#[async_trait]
impl PaymentRequestProvider for MemoryStorage {
    async fn find_payment_request(
        &self,
        ctx: &Context,
        payment_request_id: &str,
    ) -> Result<Option<PaymentRequest>, LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();

        if let Some((tx_id, _)) = &tx {
            if let Some(pending) = inner.pending_payment_requests.get(payment_request_id) {
                if pending.is_live() && pending.tx == *tx_id {
                    return Ok(Some(pending.value.clone()));
                }
            }
        }
        Ok(inner.payment_requests.get(payment_request_id).cloned())
    }

    async fn save_payment_request(
        &self,
        ctx: &Context,
        request: &PaymentRequest,
    ) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();

        let exists = inner
            .payment_requests
            .contains_key(&request.payment_request_id)
            || inner
                .pending_payment_requests
                .get(&request.payment_request_id)
                .is_some_and(|p| p.is_live());
        if exists {
            return Err(LedgerError::AlreadyProcessed(
                request.payment_request_id.clone(),
            ));
        }

        match tx {
            Some((tx_id, alive)) => {
                inner.pending_payment_requests.insert(
                    request.payment_request_id.clone(),
                    Pending {
                        tx: tx_id,
                        alive,
                        value: request.clone(),
                    },
                );
            }
            None => {
                inner
                    .payment_requests
                    .insert(request.payment_request_id.clone(), request.clone());
            }
        }
        Ok(())
    }

    async fn update_payment_request(
        &self,
        ctx: &Context,
        request: &PaymentRequest,
    ) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();

        if let Some(pending) = inner.pending_payment_requests.get(&request.payment_request_id) {
            if pending.is_live() {
                match &tx {
                    // claimed by a concurrent transaction
                    Some((tx_id, _)) if pending.tx != *tx_id => {
                        return Err(LedgerError::AlreadyProcessed(
                            request.payment_request_id.clone(),
                        ))
                    }
                    None => {
                        return Err(LedgerError::AlreadyProcessed(
                            request.payment_request_id.clone(),
                        ))
                    }
                    _ => {}
                }
            }
        }

        let current = match &tx {
            Some((tx_id, _)) => inner
                .pending_payment_requests
                .get(&request.payment_request_id)
                .filter(|p| p.is_live() && p.tx == *tx_id)
                .map(|p| &p.value)
                .or_else(|| inner.payment_requests.get(&request.payment_request_id)),
            None => inner.payment_requests.get(&request.payment_request_id),
        };
        let Some(current) = current else {
            return Err(LedgerError::Internal(anyhow!(
                "Payment request '{}' does not exist",
                request.payment_request_id
            )));
        };
        // the `WHERE state = 'pending'` analogue: a settled row is final
        if current.state.is_terminal() {
            return Err(LedgerError::AlreadyProcessed(
                request.payment_request_id.clone(),
            ));
        }

        match tx {
            Some((tx_id, alive)) => {
                inner.pending_payment_requests.insert(
                    request.payment_request_id.clone(),
                    Pending {
                        tx: tx_id,
                        alive,
                        value: request.clone(),
                    },
                );
            }
            None => {
                inner
                    .payment_requests
                    .insert(request.payment_request_id.clone(), request.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RedemptionProvider for MemoryStorage {
    async fn find_code(
        &self,
        ctx: &Context,
        code: &str,
    ) -> Result<Option<RedemptionCode>, LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();

        if let Some((tx_id, _)) = &tx {
            if let Some(pending) = inner.pending_codes.get(code) {
                if pending.is_live() && pending.tx == *tx_id {
                    return Ok(Some(pending.value.clone()));
                }
            }
        }
        Ok(inner.codes.get(code).cloned())
    }

    async fn save_code(&self, ctx: &Context, code: &RedemptionCode) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();

        let exists = inner.codes.contains_key(&code.code)
            || inner
                .pending_codes
                .get(&code.code)
                .is_some_and(|p| p.is_live());
        if exists {
            return Err(LedgerError::Internal(anyhow!(
                "Redemption code '{}' already exists",
                code.code
            )));
        }

        match tx {
            Some((tx_id, alive)) => {
                inner.pending_codes.insert(
                    code.code.clone(),
                    Pending {
                        tx: tx_id,
                        alive,
                        value: code.clone(),
                    },
                );
            }
            None => {
                inner.codes.insert(code.code.clone(), code.clone());
            }
        }
        Ok(())
    }

    async fn update_code(&self, ctx: &Context, code: &RedemptionCode) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();

        if let Some(pending) = inner.pending_codes.get(&code.code) {
            if pending.is_live() {
                let owned_by_us = matches!(&tx, Some((tx_id, _)) if pending.tx == *tx_id);
                if !owned_by_us {
                    // another redemption holds the row; fail safe, the
                    // caller's unit-of-work rolls back
                    return Err(LedgerError::NotRedeemable(code.code.clone()));
                }
            }
        }
        if !inner.codes.contains_key(&code.code)
            && !inner
                .pending_codes
                .get(&code.code)
                .is_some_and(|p| p.is_live())
        {
            return Err(LedgerError::Internal(anyhow!(
                "Redemption code '{}' does not exist",
                code.code
            )));
        }

        match tx {
            Some((tx_id, alive)) => {
                inner.pending_codes.insert(
                    code.code.clone(),
                    Pending {
                        tx: tx_id,
                        alive,
                        value: code.clone(),
                    },
                );
            }
            None => {
                inner.codes.insert(code.code.clone(), code.clone());
            }
        }
        Ok(())
    }

    async fn has_user_redeemed(
        &self,
        ctx: &Context,
        code: &str,
        user_id: &str,
    ) -> Result<bool, LedgerError> {
        let tx = tx_of(ctx);
        let inner = self.read();
        let key = (code.to_string(), user_id.to_string());

        if inner.redemptions.contains_key(&key) {
            return Ok(true);
        }
        if let Some((tx_id, _)) = &tx {
            if inner
                .pending_redemptions
                .get(&key)
                .is_some_and(|p| p.is_live() && p.tx == *tx_id)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn save_redemption(
        &self,
        ctx: &Context,
        redemption: &Redemption,
    ) -> Result<(), LedgerError> {
        let tx = tx_of(ctx);
        let mut inner = self.write();
        let key = (redemption.code.clone(), redemption.user_id.clone());

        // unique per (code, user), counting writes still in flight
        let exists = inner.redemptions.contains_key(&key)
            || inner
                .pending_redemptions
                .get(&key)
                .is_some_and(|p| p.is_live());
        if exists {
            return Err(LedgerError::AlreadyRedeemed {
                code: redemption.code.clone(),
                user_id: redemption.user_id.clone(),
            });
        }

        match tx {
            Some((tx_id, alive)) => {
                inner.pending_redemptions.insert(
                    key,
                    Pending {
                        tx: tx_id,
                        alive,
                        value: redemption.clone(),
                    },
                );
            }
            None => {
                inner.redemptions.insert(key, redemption.clone());
            }
        }
        Ok(())
    }
}
