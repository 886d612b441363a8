use std::{future::Future, sync::Arc};

use anyhow::anyhow;
use log::{debug, warn};
use metrics::{counter, gauge};
use mint_common::{
    api::{
        BalanceResult, ConsumeResult, CreateCodeParams, GrantResult, HistoryParams, HistoryResult,
        ProcessPaymentParams, ProcessPaymentResult, RedeemResult,
    },
    context::Context,
    currency::{
        free_entry_id, paid_entry_id, ConsumptionDetail, Kind, Metadata, PaymentRequest,
        PaymentState, Redemption, RedemptionCode, TransactionEntry, UnknownKind,
    },
    time::{Clock, TimestampMillis},
};

use super::{
    error::LedgerError,
    ids::IdGenerator,
    mutator::{BalanceChange, BalanceMutator, MutationOutcome},
    storage::{HistoryFilter, Storage},
};

/// History page size when the caller does not ask for one.
pub const DEFAULT_HISTORY_PAGE: usize = 20;
/// Hard cap on a single history page.
pub const MAX_HISTORY_PAGE: usize = 100;

/// Kind label accepted by consume that spends FREE first, then PAID.
pub const AUTO_KIND_LABEL: &str = "auto";

/// The transactional application core: every balance mutation runs through
/// one of these use cases, inside a single unit-of-work.
pub struct Ledger<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    mutator: BalanceMutator,
}

impl<S: Storage> Ledger<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            storage,
            clock,
            ids,
            mutator: BalanceMutator::default(),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Run `body` inside one unit-of-work: commit iff it returns `Ok`,
    /// roll back otherwise. A rollback failure is logged, the body's error
    /// still wins.
    pub async fn with_transaction<T, F, Fut>(&self, body: F) -> Result<T, LedgerError>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let handle = self.storage.begin_transaction().await?;
        let mut ctx = Context::new();
        ctx.store(handle.clone());

        match body(ctx).await {
            Ok(value) => {
                self.storage.commit_transaction(handle).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.storage.rollback_transaction(handle).await {
                    warn!("Rollback failed after {:#}: {:#}", err, rollback_err);
                }
                Err(err)
            }
        }
    }

    fn parse_kind(label: &str) -> Result<Kind, LedgerError> {
        label
            .parse()
            .map_err(|err: UnknownKind| LedgerError::InvalidKind(err.0))
    }

    fn record_mutation(user_id: &str, kind: Kind, op: &'static str, outcome: &MutationOutcome) {
        counter!("transaction", "op" => op, "kind" => kind.as_str()).increment(1);
        gauge!("currency_balance", "user_id" => user_id.to_string(), "kind" => kind.as_str())
            .set(outcome.balance_after as f64);
    }

    /// Grant `amount` of a single kind and log it.
    pub async fn grant(
        &self,
        user_id: &str,
        kind_label: &str,
        amount: u64,
        metadata: Metadata,
    ) -> Result<GrantResult, LedgerError> {
        let kind = Self::parse_kind(kind_label)?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let transaction_id = self.ids.transaction_id();
        let created_at = self.clock.now_millis();
        let entry_id = transaction_id.clone();
        let outcome = self
            .with_transaction(|ctx| async move {
                let outcome = self
                    .mutator
                    .apply(
                        self.storage.as_ref(),
                        &ctx,
                        user_id,
                        kind,
                        BalanceChange::Grant(amount),
                    )
                    .await?;
                let entry = TransactionEntry::grant(
                    entry_id,
                    user_id,
                    kind,
                    amount,
                    outcome.balance_before,
                    metadata,
                    created_at,
                );
                self.storage.save_entry(&ctx, &entry).await?;
                Ok(outcome)
            })
            .await?;

        Self::record_mutation(user_id, kind, "grant", &outcome);
        debug!("granted {} {} to {}", amount, kind, user_id);
        Ok(GrantResult {
            transaction_id,
            balance: outcome.balance_after,
        })
    }

    /// Consume `amount` of a single kind; the "auto" label spends FREE
    /// first and charges the remainder to PAID.
    pub async fn consume(
        &self,
        user_id: &str,
        kind_label: &str,
        amount: u64,
        metadata: Metadata,
    ) -> Result<ConsumeResult, LedgerError> {
        if kind_label == AUTO_KIND_LABEL {
            return self.consume_with_priority(user_id, amount, metadata).await;
        }
        let kind = Self::parse_kind(kind_label)?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let transaction_id = self.ids.transaction_id();
        let created_at = self.clock.now_millis();
        let entry_id = transaction_id.clone();
        let outcome = self
            .with_transaction(|ctx| async move {
                let outcome = self
                    .mutator
                    .apply(
                        self.storage.as_ref(),
                        &ctx,
                        user_id,
                        kind,
                        BalanceChange::Consume(amount),
                    )
                    .await?;
                let entry = TransactionEntry::consume(
                    entry_id,
                    user_id,
                    kind,
                    amount,
                    outcome.balance_before,
                    metadata,
                    created_at,
                );
                self.storage.save_entry(&ctx, &entry).await?;
                Ok(outcome)
            })
            .await?;

        Self::record_mutation(user_id, kind, "consume", &outcome);
        debug!("consumed {} {} from {}", amount, kind, user_id);
        Ok(ConsumeResult {
            transaction_id,
            total_consumed: amount,
            balance: Some(outcome.balance_after),
            details: None,
        })
    }

    /// Spend FREE first, then PAID, atomically.
    pub async fn consume_with_priority(
        &self,
        user_id: &str,
        amount: u64,
        metadata: Metadata,
    ) -> Result<ConsumeResult, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        // Advisory fast-fail outside the unit-of-work: no side effects when
        // the combined balance cannot cover the amount. PAID is only read
        // when FREE does not cover the request on its own.
        let read_ctx = Context::new();
        let free = self
            .storage
            .find_balance(&read_ctx, user_id, Kind::Free)
            .await?
            .map(|balance| balance.amount)
            .unwrap_or(0);
        if free < amount {
            let paid = self
                .storage
                .find_balance(&read_ctx, user_id, Kind::Paid)
                .await?
                .map(|balance| balance.amount)
                .unwrap_or(0);
            let total = free.saturating_add(paid);
            if total < amount {
                return Err(LedgerError::InsufficientBalance {
                    need: amount,
                    have: total,
                });
            }
        }

        let root = self.ids.transaction_id();
        let created_at = self.clock.now_millis();
        let details = self
            .with_transaction(|ctx| {
                let root = root.clone();
                async move {
                    self.settle_split(&ctx, user_id, amount, &metadata, &root, None, created_at)
                        .await
                }
            })
            .await?;

        debug!(
            "priority consume of {} from {} split over {} entries",
            amount,
            user_id,
            details.len()
        );
        Ok(ConsumeResult {
            transaction_id: root,
            total_consumed: amount,
            balance: None,
            details: Some(details),
        })
    }

    /// FREE-then-PAID double entry shared by priority consume and payment
    /// settlement. With a payment id the PAID side is pre-checked before
    /// being mutated (missing PAID counts as zero); without one, a missing
    /// PAID cell is the caller's error. The inner consumes stay
    /// authoritative either way.
    async fn settle_split(
        &self,
        ctx: &Context,
        user_id: &str,
        amount: u64,
        metadata: &Metadata,
        root: &str,
        payment_request_id: Option<&str>,
        created_at: TimestampMillis,
    ) -> Result<Vec<ConsumptionDetail>, LedgerError> {
        let mut details = Vec::new();
        let mut remaining = amount;

        if let Some(free) = self.storage.find_balance(ctx, user_id, Kind::Free).await? {
            if free.amount > 0 {
                let take = remaining.min(free.amount);
                let outcome = self
                    .mutator
                    .apply(
                        self.storage.as_ref(),
                        ctx,
                        user_id,
                        Kind::Free,
                        BalanceChange::Consume(take),
                    )
                    .await?;
                let mut entry = TransactionEntry::consume(
                    free_entry_id(root),
                    user_id,
                    Kind::Free,
                    take,
                    outcome.balance_before,
                    metadata.clone(),
                    created_at,
                );
                if let Some(id) = payment_request_id {
                    entry = entry.with_payment_request(id);
                }
                self.storage.save_entry(ctx, &entry).await?;
                Self::record_mutation(user_id, Kind::Free, "consume", &outcome);
                details.push(ConsumptionDetail {
                    kind: Kind::Free,
                    amount: take,
                    balance_before: outcome.balance_before,
                    balance_after: outcome.balance_after,
                });
                remaining -= take;
            }
        }

        if remaining > 0 {
            let paid = self.storage.find_balance(ctx, user_id, Kind::Paid).await?;
            if payment_request_id.is_some() {
                let available = paid.as_ref().map(|balance| balance.amount).unwrap_or(0);
                if remaining > available {
                    return Err(LedgerError::InsufficientBalance {
                        need: remaining,
                        have: available,
                    });
                }
            } else if paid.is_none() {
                return Err(LedgerError::CurrencyNotFound {
                    user_id: user_id.to_string(),
                    kind: Kind::Paid,
                });
            }

            let outcome = self
                .mutator
                .apply(
                    self.storage.as_ref(),
                    ctx,
                    user_id,
                    Kind::Paid,
                    BalanceChange::Consume(remaining),
                )
                .await?;
            let mut entry = TransactionEntry::consume(
                paid_entry_id(root),
                user_id,
                Kind::Paid,
                remaining,
                outcome.balance_before,
                metadata.clone(),
                created_at,
            );
            if let Some(id) = payment_request_id {
                entry = entry.with_payment_request(id);
            }
            self.storage.save_entry(ctx, &entry).await?;
            Self::record_mutation(user_id, Kind::Paid, "consume", &outcome);
            details.push(ConsumptionDetail {
                kind: Kind::Paid,
                amount: remaining,
                balance_before: outcome.balance_before,
                balance_after: outcome.balance_after,
            });
        }

        Ok(details)
    }

    /// Idempotent payment settlement keyed on the external request id.
    pub async fn process_payment(
        &self,
        params: ProcessPaymentParams,
    ) -> Result<ProcessPaymentResult, LedgerError> {
        let ProcessPaymentParams {
            payment_request_id,
            user_id,
            amount,
            currency,
            method_data,
            details,
        } = params;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let read_ctx = Context::new();
        let now = self.clock.now_millis();
        if let Some(existing) = self
            .storage
            .find_payment_request(&read_ctx, &payment_request_id)
            .await?
        {
            match existing.state {
                // replay: answer from the committed entries, mutate nothing
                PaymentState::Completed => return self.replay_completed_payment(&existing).await,
                PaymentState::Failed | PaymentState::Cancelled => {
                    return Err(LedgerError::AlreadyProcessed(payment_request_id))
                }
                PaymentState::Pending => {}
            }
        } else {
            let request = PaymentRequest::pending(
                &payment_request_id,
                &user_id,
                amount,
                &currency,
                method_data,
                details,
                now,
            );
            // persisted before the unit-of-work so a failed settlement can
            // still be recorded on the request afterwards
            self.storage
                .save_payment_request(&read_ctx, &request)
                .await?;
        }

        let root = self.ids.transaction_id();
        let settled = self
            .with_transaction(|ctx| {
                let root = root.clone();
                let payment_request_id = payment_request_id.clone();
                let user_id = user_id.clone();
                async move {
                    let metadata = Metadata::new();
                    let consumption = self
                        .settle_split(
                            &ctx,
                            &user_id,
                            amount,
                            &metadata,
                            &root,
                            Some(&payment_request_id),
                            now,
                        )
                        .await?;

                    let mut request = self
                        .storage
                        .find_payment_request(&ctx, &payment_request_id)
                        .await?
                        .ok_or_else(|| {
                            LedgerError::Internal(anyhow!(
                                "Payment request '{}' vanished mid-settlement",
                                payment_request_id
                            ))
                        })?;
                    let mut response = Metadata::new();
                    response.insert("transaction_id".to_string(), root.clone().into());
                    response.insert("total_consumed".to_string(), (amount as i64).into());
                    for detail in &consumption {
                        response.insert(
                            format!("{}_amount", detail.kind),
                            (detail.amount as i64).into(),
                        );
                    }
                    request
                        .complete(response, now)
                        .map_err(|_| LedgerError::AlreadyProcessed(payment_request_id.clone()))?;
                    self.storage.update_payment_request(&ctx, &request).await?;
                    Ok(consumption)
                }
            })
            .await;

        match settled {
            Ok(consumption) => {
                let total = consumption.iter().map(|detail| detail.amount).sum();
                debug!(
                    "payment request '{}' settled for {} over {} entries",
                    payment_request_id,
                    total,
                    consumption.len()
                );
                Ok(ProcessPaymentResult {
                    payment_request_id,
                    transaction_id: root,
                    state: PaymentState::Completed,
                    total_consumed: total,
                    details: consumption,
                })
            }
            Err(err @ LedgerError::InsufficientBalance { .. }) => {
                // the consumption rolled back with the unit-of-work; the
                // failure itself is recorded durably on the request
                self.mark_payment_failed(&payment_request_id, now).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn mark_payment_failed(&self, payment_request_id: &str, now: TimestampMillis) {
        let ctx = Context::new();
        let request = match self
            .storage
            .find_payment_request(&ctx, payment_request_id)
            .await
        {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(
                    "Payment request '{}' missing while marking it failed",
                    payment_request_id
                );
                return;
            }
            Err(err) => {
                warn!(
                    "Could not load payment request '{}' to mark it failed: {:#}",
                    payment_request_id, err
                );
                return;
            }
        };

        let mut request = request;
        if request.fail(now).is_err() {
            // already settled by a concurrent call
            return;
        }
        if let Err(err) = self.storage.update_payment_request(&ctx, &request).await {
            warn!(
                "Could not mark payment request '{}' as failed: {:#}",
                payment_request_id, err
            );
        }
    }

    async fn replay_completed_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProcessPaymentResult, LedgerError> {
        let ctx = Context::new();
        let entries = self
            .storage
            .find_entries_by_payment_request(&ctx, &request.payment_request_id)
            .await?;
        if entries.is_empty() {
            return Err(LedgerError::PaymentNotFound(
                request.payment_request_id.clone(),
            ));
        }

        let transaction_id = entries[0].root_id().to_string();
        let details: Vec<ConsumptionDetail> = entries
            .iter()
            .map(|entry| ConsumptionDetail {
                kind: entry.kind,
                amount: entry.amount,
                balance_before: entry.balance_before,
                balance_after: entry.balance_after,
            })
            .collect();
        let total = details.iter().map(|detail| detail.amount).sum();
        debug!(
            "replaying completed payment request '{}'",
            request.payment_request_id
        );
        Ok(ProcessPaymentResult {
            payment_request_id: request.payment_request_id.clone(),
            transaction_id,
            state: PaymentState::Completed,
            total_consumed: total,
            details,
        })
    }

    /// Redeem a bulk-grant code for the calling user, once.
    pub async fn redeem_code(&self, code: &str, user_id: &str) -> Result<RedeemResult, LedgerError> {
        let read_ctx = Context::new();
        let now = self.clock.now_millis();
        let stored = self
            .storage
            .find_code(&read_ctx, code)
            .await?
            .ok_or_else(|| LedgerError::CodeNotFound(code.to_string()))?;
        if let Err(reason) = stored.redeemable_at(now) {
            debug!("code '{}' not redeemable: {}", code, reason);
            return Err(LedgerError::NotRedeemable(code.to_string()));
        }
        if self
            .storage
            .has_user_redeemed(&read_ctx, code, user_id)
            .await?
        {
            return Err(LedgerError::AlreadyRedeemed {
                code: code.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let transaction_id = self.ids.transaction_id();
        let redemption_id = self.ids.redemption_id();
        let (kind, amount, balance_after) = self
            .with_transaction(|ctx| {
                let transaction_id = transaction_id.clone();
                let redemption_id = redemption_id.clone();
                async move {
                    let mut stored = self
                        .storage
                        .find_code(&ctx, code)
                        .await?
                        .ok_or_else(|| LedgerError::CodeNotFound(code.to_string()))?;
                    // authoritative re-check: the pre-check may have lost a
                    // race for the last use
                    stored
                        .consume_use()
                        .map_err(|_| LedgerError::NotRedeemable(code.to_string()))?;
                    self.storage.update_code(&ctx, &stored).await?;

                    let outcome = self
                        .mutator
                        .apply(
                            self.storage.as_ref(),
                            &ctx,
                            user_id,
                            stored.kind,
                            BalanceChange::Grant(stored.amount),
                        )
                        .await?;

                    let mut metadata = Metadata::new();
                    metadata.insert("code".to_string(), stored.code.clone().into());
                    metadata.insert("redemption_id".to_string(), redemption_id.clone().into());
                    let entry = TransactionEntry::grant(
                        transaction_id.clone(),
                        user_id,
                        stored.kind,
                        stored.amount,
                        outcome.balance_before,
                        metadata,
                        now,
                    );
                    self.storage.save_entry(&ctx, &entry).await?;

                    let record = Redemption {
                        redemption_id,
                        code: stored.code.clone(),
                        user_id: user_id.to_string(),
                        transaction_id,
                        redeemed_at: now,
                    };
                    self.storage.save_redemption(&ctx, &record).await?;

                    Self::record_mutation(user_id, stored.kind, "grant", &outcome);
                    Ok((stored.kind, stored.amount, outcome.balance_after))
                }
            })
            .await?;

        debug!("user {} redeemed code '{}' for {} {}", user_id, code, amount, kind);
        Ok(RedeemResult {
            transaction_id,
            redemption_id,
            kind,
            amount,
            balance: balance_after,
        })
    }

    /// Seed a redeemable code. Admin surface only; autocommitted.
    pub async fn create_code(
        &self,
        params: CreateCodeParams,
    ) -> Result<RedemptionCode, LedgerError> {
        if params.amount == 0 || params.max_uses == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let code = RedemptionCode {
            code: params.code,
            code_type: params.code_type,
            kind: params.kind,
            amount: params.amount,
            max_uses: params.max_uses,
            current_uses: 0,
            valid_from: params.valid_from,
            valid_until: params.valid_until,
            enabled: params.enabled,
            metadata: params.metadata,
        };
        let ctx = Context::new();
        self.storage.save_code(&ctx, &code).await?;
        debug!("seeded redemption code '{}'", code.code);
        Ok(code)
    }

    /// Both balances of a user; absent cells read as zero.
    pub async fn get_balance(&self, user_id: &str) -> Result<BalanceResult, LedgerError> {
        let ctx = Context::new();
        let paid = self
            .storage
            .find_balance(&ctx, user_id, Kind::Paid)
            .await?
            .map(|balance| balance.amount)
            .unwrap_or(0);
        let free = self
            .storage
            .find_balance(&ctx, user_id, Kind::Free)
            .await?
            .map(|balance| balance.amount)
            .unwrap_or(0);
        Ok(BalanceResult { paid, free })
    }

    /// Page through a user's ledger entries, newest first.
    pub async fn get_history(&self, params: HistoryParams) -> Result<HistoryResult, LedgerError> {
        let ctx = Context::new();
        let limit = if params.limit == 0 {
            DEFAULT_HISTORY_PAGE
        } else {
            params.limit.min(MAX_HISTORY_PAGE)
        };
        let filter = HistoryFilter {
            kind: params.kind,
            entry_type: params.entry_type,
        };
        let (entries, total) = self
            .storage
            .find_entries_by_user(&ctx, &params.user_id, filter, limit, params.offset)
            .await?;
        Ok(HistoryResult { entries, total })
    }
}
