//! Transaction orchestration
//!
//! The orchestrator sequences every multi-step flow: it claims the
//! idempotency token, records a PENDING ledger transaction, drives the
//! wallet and inventory managers, and lands the transaction in exactly one
//! terminal status. A ticket purchase is the two-phase case: reserve
//! capacity, debit the wallet, then commit the ticket and the COMMITTED
//! status in one atomic store transaction. If that commit fails after the
//! debit settled, the orchestrator compensates by reversing the charge and
//! the reservation, retrying until the reversal lands.
//!
//! Only a flow's own verdict is ever recorded against its token. Lost
//! version races release the claim so the caller can retry; storage faults
//! and deadlines leave the record PENDING and the claim held, to be
//! resolved through [`TransactionOrchestrator::resolve_pending`].

use crate::core::idempotency::{BeginOutcome, IdempotencyRegistry};
use crate::core::inventory::{Reservation, SlotInventoryManager};
use crate::core::retry::RetryPolicy;
use crate::core::wallet::WalletAccountManager;
use crate::store::{LedgerKey, LedgerStore, LedgerValue, LedgerWrite, Version};
use crate::types::{
    DepositIntent, EngineError, IdempotencyToken, OperationOutcome, OperationResult,
    PurchaseIntent, PurchaseReceipt, RefundIntent, ReleaseMarker, Ticket, Transaction,
    TransactionId, TransactionKind, TransactionReceipt, TransactionStatus, WithdrawIntent,
};
use chrono::Utc;
use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backoff policy shared by all optimistic write loops
    pub retry: RetryPolicy,

    /// Wall-clock budget for one operation, end to end
    pub request_timeout: Duration,

    /// Inline compensation attempts before detaching to a background task
    pub compensation_attempts: u32,

    /// Base URL that issued ticket ids are appended to
    pub ticket_url_base: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(5),
            compensation_attempts: 8,
            ticket_url_base: "https://tickets.example.com/tickets".to_string(),
        }
    }
}

/// Sequences deposits, withdrawals, purchases, and refunds over one store
#[derive(Clone)]
pub struct TransactionOrchestrator {
    store: Arc<dyn LedgerStore>,
    inventory: SlotInventoryManager,
    wallet: WalletAccountManager,
    registry: IdempotencyRegistry,
    config: EngineConfig,
}

impl TransactionOrchestrator {
    /// Wire up an orchestrator and its managers over a shared store
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        TransactionOrchestrator {
            inventory: SlotInventoryManager::new(Arc::clone(&store), config.retry.clone()),
            wallet: WalletAccountManager::new(Arc::clone(&store), config.retry.clone()),
            registry: IdempotencyRegistry::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    /// The slot inventory manager, for event publication and inspection
    pub fn inventory(&self) -> &SlotInventoryManager {
        &self.inventory
    }

    /// The wallet manager, for balance inspection
    pub fn wallet(&self) -> &WalletAccountManager {
        &self.wallet
    }

    /// Credit a wallet, creating the account on first use
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateInFlight`] while the token's first
    /// execution is still running, or the replayed terminal error of an
    /// earlier execution.
    pub async fn deposit(&self, intent: DepositIntent) -> Result<TransactionReceipt, EngineError> {
        let token = intent.token.clone();
        let txn = Transaction::pending(
            TransactionKind::Deposit,
            intent.card_id,
            intent.amount,
            intent.token,
        );
        match self
            .execute(&token, "deposit", future::ready(Ok(txn)), |txn, version| {
                self.deposit_flow(txn, version)
            })
            .await?
        {
            OperationOutcome::Deposit(receipt) => Ok(receipt),
            other => Err(token_reuse(&token, &other)),
        }
    }

    /// Debit a wallet; requires sufficient balance
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientFunds`] or
    /// [`EngineError::AccountNotFound`] as terminal rejections, replayed on
    /// retries of the same token.
    pub async fn withdraw(
        &self,
        intent: WithdrawIntent,
    ) -> Result<TransactionReceipt, EngineError> {
        let token = intent.token.clone();
        let txn = Transaction::pending(
            TransactionKind::Withdrawal,
            intent.card_id,
            intent.amount,
            intent.token,
        );
        match self
            .execute(&token, "withdraw", future::ready(Ok(txn)), |txn, version| {
                self.withdraw_flow(txn, version)
            })
            .await?
        {
            OperationOutcome::Withdraw(receipt) => Ok(receipt),
            other => Err(token_reuse(&token, &other)),
        }
    }

    /// Purchase tickets: reserve capacity, debit the charge, issue a ticket
    ///
    /// The charge is the slot's per-ticket price times the quantity. The
    /// ticket and the COMMITTED status land in one atomic store commit; if
    /// that commit fails after the debit settled, the charge and the
    /// reservation are reversed and [`EngineError::PurchaseReversed`] is
    /// returned.
    ///
    /// # Errors
    ///
    /// Terminal rejections ([`EngineError::SlotNotFound`],
    /// [`EngineError::InsufficientCapacity`],
    /// [`EngineError::InsufficientFunds`]) leave no side effects behind.
    pub async fn purchase_ticket(
        &self,
        intent: PurchaseIntent,
    ) -> Result<PurchaseReceipt, EngineError> {
        let token = intent.token.clone();
        match self
            .execute(
                &token,
                "purchase",
                self.prepare_purchase(intent),
                |txn, version| self.purchase_flow(txn, version),
            )
            .await?
        {
            OperationOutcome::Purchase(receipt) => Ok(receipt),
            other => Err(token_reuse(&token, &other)),
        }
    }

    /// Reverse a committed ticket purchase
    ///
    /// Credits the charge back, returns the capacity, deletes the ticket,
    /// and marks the original COMPENSATED, all in one atomic store commit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRefundable`] unless the referenced
    /// transaction is a committed ticket purchase.
    pub async fn refund(&self, intent: RefundIntent) -> Result<TransactionReceipt, EngineError> {
        let token = intent.token.clone();
        match self
            .execute(
                &token,
                "refund",
                self.prepare_refund(intent),
                |txn, version| self.refund_flow(txn, version),
            )
            .await?
        {
            OperationOutcome::Refund(receipt) => Ok(receipt),
            other => Err(token_reuse(&token, &other)),
        }
    }

    /// Transactions still PENDING, awaiting reconciliation
    ///
    /// A transaction stays PENDING only if its flow was cut short, for
    /// example by the request deadline or a storage fault. Operators drain
    /// this list and resolve each record through
    /// [`TransactionOrchestrator::resolve_pending`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on storage faults.
    pub async fn pending_transactions(&self) -> Result<Vec<Transaction>, EngineError> {
        let mut pending: Vec<Transaction> = self
            .store
            .scan_transactions()
            .await?
            .into_iter()
            .filter(|txn| txn.status == TransactionStatus::Pending)
            .collect();
        pending.sort_by_key(|txn| txn.created_at);
        Ok(pending)
    }

    /// Land an operator verdict on a PENDING transaction
    ///
    /// The record moves to the given terminal status and the idempotency
    /// claim for its token resolves, so retries of the token stop seeing
    /// [`EngineError::DuplicateInFlight`]: they replay the receipt for a
    /// COMMITTED verdict and the original deadline failure otherwise.
    ///
    /// The verdict is the operator's, reached after checking which side
    /// effects actually landed; the engine only records it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] unless the record is
    /// PENDING, and rejects a COMMITTED verdict on a purchase that never
    /// got its ticket.
    pub async fn resolve_pending(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, EngineError> {
        let versioned = self
            .store
            .read_transaction(transaction_id)
            .await?
            .ok_or_else(|| EngineError::transaction_not_found(transaction_id))?;
        let txn = versioned.value;
        if txn.status != TransactionStatus::Pending {
            return Err(EngineError::invalid_transition(
                transaction_id,
                txn.status,
                status,
            ));
        }
        if txn.kind == TransactionKind::TicketPurchase
            && status == TransactionStatus::Committed
            && txn.ticket_id.is_none()
        {
            return Err(EngineError::store(format!(
                "purchase {transaction_id} cannot resolve to COMMITTED without a ticket"
            )));
        }

        let settled = self.settle(txn, versioned.version, status).await?;
        let result = self.resolution_result(&settled);
        self.registry.complete(&settled.token, result).await?;
        info!(transaction = %settled.id, status = ?settled.status, "pending transaction resolved");
        Ok(settled)
    }

    /// Run a flow once per token, replaying stored results on retries
    ///
    /// `prepare` validates the intent and shapes the PENDING record, which
    /// is then written before the deadline starts ticking; whatever cuts
    /// the flow short afterwards leaves a record behind to reconcile. The
    /// recording rules at the end:
    ///
    /// - verdicts (success or terminal rejection) resolve the claim and
    ///   replay on retries;
    /// - an exhausted version race releases the claim, the token may retry;
    /// - a storage fault keeps the claim held, because the flow's side
    ///   effects are unknown until the record is resolved.
    async fn execute<PFut, F, Fut>(
        &self,
        token: &IdempotencyToken,
        operation: &str,
        prepare: PFut,
        run: F,
    ) -> OperationResult
    where
        PFut: Future<Output = Result<Transaction, EngineError>>,
        F: FnOnce(Transaction, Version) -> Fut,
        Fut: Future<Output = OperationResult>,
    {
        match self.registry.begin(token).await? {
            BeginOutcome::New => {}
            BeginOutcome::InFlight => return Err(EngineError::duplicate_in_flight(token)),
            BeginOutcome::Completed(result) => {
                info!(%token, operation, "replaying stored result");
                return result;
            }
        }

        let txn = match prepare.await {
            Ok(txn) => txn,
            Err(e) if e.is_transient() => {
                // Nothing was recorded yet; let the token run again
                self.abandon_claim(token).await;
                return Err(e);
            }
            Err(e) => {
                let result = Err(e);
                self.registry.complete(token, result.clone()).await?;
                return result;
            }
        };

        let version = match self.record_pending(&txn).await {
            Ok(version) => version,
            Err(e) => {
                self.abandon_claim(token).await;
                return Err(e);
            }
        };

        let result = match timeout(self.config.request_timeout, run(txn, version)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%token, operation, "deadline exceeded, leaving record for reconciliation");
                return Err(EngineError::deadline_exceeded(operation));
            }
        };

        match &result {
            Err(e) if e.is_conflict() => self.abandon_claim(token).await,
            Err(EngineError::Store { .. }) => {
                warn!(%token, operation, "storage fault mid-flow, record left for reconciliation");
            }
            _ => self.registry.complete(token, result.clone()).await?,
        }
        result
    }

    async fn deposit_flow(&self, txn: Transaction, version: Version) -> OperationResult {
        match self.wallet.credit(&txn.card_id, txn.amount).await {
            Ok(balance) => {
                let txn = self.settle(txn, version, TransactionStatus::Committed).await?;
                info!(card = %txn.card_id, amount = txn.amount, balance, "deposit committed");
                Ok(OperationOutcome::Deposit(TransactionReceipt {
                    transaction: txn,
                    message: "Deposit successful".to_string(),
                }))
            }
            Err(e) => {
                self.settle_rejection(txn, version, &e).await;
                Err(e)
            }
        }
    }

    async fn withdraw_flow(&self, txn: Transaction, version: Version) -> OperationResult {
        match self.wallet.debit(&txn.card_id, txn.amount).await {
            Ok(balance) => {
                let txn = self.settle(txn, version, TransactionStatus::Committed).await?;
                info!(card = %txn.card_id, amount = txn.amount, balance, "withdrawal committed");
                Ok(OperationOutcome::Withdraw(TransactionReceipt {
                    transaction: txn,
                    message: "Withdrawal successful".to_string(),
                }))
            }
            Err(e) => {
                self.settle_rejection(txn, version, &e).await;
                Err(e)
            }
        }
    }

    /// Price the purchase and shape its PENDING record
    async fn prepare_purchase(&self, intent: PurchaseIntent) -> Result<Transaction, EngineError> {
        let slot = self.inventory.slot(&intent.event_slot_id).await?;
        if slot.retired {
            return Err(EngineError::slot_not_found(&intent.event_slot_id));
        }
        let charge = slot
            .price
            .checked_mul(u64::from(intent.quantity))
            .ok_or_else(|| EngineError::arithmetic_overflow("purchase charge", &intent.card_id))?;

        Ok(Transaction::pending(
            TransactionKind::TicketPurchase,
            intent.card_id,
            charge,
            intent.token,
        )
        .with_slot(intent.event_slot_id, intent.quantity))
    }

    async fn purchase_flow(&self, txn: Transaction, version: Version) -> OperationResult {
        let slot_id = txn
            .event_slot_id
            .clone()
            .ok_or_else(|| missing_field(&txn, "slot reference"))?;
        let quantity = txn.quantity.ok_or_else(|| missing_field(&txn, "quantity"))?;

        // Phase one: hold the capacity
        let reservation = match self.inventory.reserve(&slot_id, quantity).await {
            Ok(reservation) => reservation,
            Err(e) => {
                self.settle_rejection(txn, version, &e).await;
                return Err(e);
            }
        };

        // Phase two: take the charge
        if let Err(e) = self.wallet.debit(&txn.card_id, txn.amount).await {
            // Nothing was charged; give the capacity back before failing
            self.release_or_escalate(txn.id, reservation).await;
            self.settle_rejection(txn, version, &e).await;
            return Err(e);
        }

        // Commit: ticket and COMMITTED status land together or not at all
        let ticket = Ticket::new(slot_id.clone(), txn.token.owner(), quantity, txn.id);
        let mut committed = txn.clone();
        committed.ticket_id = Some(ticket.id);
        committed.transition(TransactionStatus::Committed)?;

        let writes = vec![
            LedgerWrite::create(LedgerKey::Ticket(ticket.id), LedgerValue::Ticket(ticket.clone())),
            LedgerWrite::update(
                LedgerKey::Transaction(txn.id),
                LedgerValue::Transaction(committed),
                version,
            ),
        ];
        match self.store.transact(writes).await {
            Ok(()) => {
                info!(
                    transaction = %txn.id,
                    ticket = %ticket.id,
                    slot = %slot_id,
                    quantity,
                    charge = txn.amount,
                    "ticket purchase committed"
                );
                Ok(OperationOutcome::Purchase(PurchaseReceipt {
                    message: "Ticket purchased successfully".to_string(),
                    ticket_url: Some(format!("{}/{}", self.config.ticket_url_base, ticket.id)),
                }))
            }
            Err(commit_err) => {
                warn!(
                    transaction = %txn.id,
                    error = %commit_err,
                    "ticket commit failed after settled debit, compensating"
                );
                self.compensate(txn.clone(), version, reservation).await;
                Err(EngineError::purchase_reversed(txn.id))
            }
        }
    }

    /// Validate the refund target and shape the refund's PENDING record
    async fn prepare_refund(&self, intent: RefundIntent) -> Result<Transaction, EngineError> {
        let original = self
            .store
            .read_transaction(intent.transaction_id)
            .await?
            .ok_or_else(|| EngineError::transaction_not_found(intent.transaction_id))?;
        let purchase = original.value;
        if purchase.kind != TransactionKind::TicketPurchase {
            return Err(EngineError::not_refundable(
                purchase.id,
                "only ticket purchases are refundable",
            ));
        }
        if purchase.status != TransactionStatus::Committed {
            return Err(EngineError::not_refundable(
                purchase.id,
                "transaction is not committed",
            ));
        }
        let slot_id = purchase
            .event_slot_id
            .clone()
            .ok_or_else(|| missing_field(&purchase, "slot reference"))?;
        let quantity = purchase
            .quantity
            .ok_or_else(|| missing_field(&purchase, "quantity"))?;
        if purchase.ticket_id.is_none() {
            return Err(missing_field(&purchase, "ticket reference"));
        }

        Ok(Transaction::pending(
            TransactionKind::Refund,
            purchase.card_id.clone(),
            purchase.amount,
            intent.token,
        )
        .with_slot(slot_id, quantity)
        .with_refund_of(purchase.id))
    }

    async fn refund_flow(&self, refund: Transaction, refund_version: Version) -> OperationResult {
        let purchase_id = refund
            .refund_of
            .ok_or_else(|| missing_field(&refund, "purchase reference"))?;
        let slot_id = refund
            .event_slot_id
            .clone()
            .ok_or_else(|| missing_field(&refund, "slot reference"))?;
        let quantity = refund
            .quantity
            .ok_or_else(|| missing_field(&refund, "quantity"))?;

        for attempt in 0..self.config.retry.max_attempts {
            // Fresh reads each attempt; any of these records may have moved
            let current = self
                .store
                .read_transaction(purchase_id)
                .await?
                .ok_or_else(|| EngineError::transaction_not_found(purchase_id))?;
            if current.value.status != TransactionStatus::Committed {
                let reason = EngineError::not_refundable(purchase_id, "already reversed");
                self.settle_rejection(refund, refund_version, &reason).await;
                return Err(reason);
            }
            let ticket_id = current
                .value
                .ticket_id
                .ok_or_else(|| missing_field(&current.value, "ticket reference"))?;

            let account = self
                .store
                .read_account(&refund.card_id)
                .await?
                .ok_or_else(|| EngineError::account_not_found(&refund.card_id))?;
            let mut wallet = account.value;
            wallet.credit(refund.amount)?;

            let slot = self
                .store
                .read_slot(&slot_id)
                .await?
                .ok_or_else(|| EngineError::slot_not_found(&slot_id))?;
            let mut slot_value = slot.value;
            slot_value.release(quantity);

            let ticket = self
                .store
                .read_ticket(ticket_id)
                .await?
                .ok_or_else(|| missing_field(&current.value, "ticket record"))?;

            let mut reversed = current.value.clone();
            reversed.transition(TransactionStatus::Compensated)?;
            let mut committed_refund = refund.clone();
            committed_refund.transition(TransactionStatus::Committed)?;

            let writes = vec![
                LedgerWrite::update(
                    LedgerKey::Account(refund.card_id.clone()),
                    LedgerValue::Account(wallet),
                    account.version,
                ),
                LedgerWrite::update(
                    LedgerKey::Slot(slot_id.clone()),
                    LedgerValue::Slot(slot_value),
                    slot.version,
                ),
                LedgerWrite::update(
                    LedgerKey::Transaction(purchase_id),
                    LedgerValue::Transaction(reversed),
                    current.version,
                ),
                LedgerWrite::delete(LedgerKey::Ticket(ticket_id), ticket.version),
                LedgerWrite::update(
                    LedgerKey::Transaction(refund.id),
                    LedgerValue::Transaction(committed_refund.clone()),
                    refund_version,
                ),
            ];
            match self.store.transact(writes).await {
                Ok(()) => {
                    info!(
                        refund = %refund.id,
                        purchase = %purchase_id,
                        amount = refund.amount,
                        "refund committed"
                    );
                    return Ok(OperationOutcome::Refund(TransactionReceipt {
                        transaction: committed_refund,
                        message: "Refund successful".to_string(),
                    }));
                }
                Err(e) if e.is_conflict() => {
                    sleep(self.config.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => {
                    self.settle_rejection(refund, refund_version, &e).await;
                    return Err(e);
                }
            }
        }

        let conflict = EngineError::conflict(LedgerKey::Transaction(purchase_id).to_string());
        self.settle_rejection(refund, refund_version, &conflict).await;
        Err(conflict)
    }

    /// Create the PENDING transaction record at intent time
    async fn record_pending(&self, txn: &Transaction) -> Result<Version, EngineError> {
        self.store
            .write_if_version(
                LedgerKey::Transaction(txn.id),
                LedgerValue::Transaction(txn.clone()),
                None,
            )
            .await
    }

    /// Conditionally write the transaction's terminal status
    async fn settle(
        &self,
        mut txn: Transaction,
        version: Version,
        status: TransactionStatus,
    ) -> Result<Transaction, EngineError> {
        txn.transition(status)?;
        self.store
            .write_if_version(
                LedgerKey::Transaction(txn.id),
                LedgerValue::Transaction(txn.clone()),
                Some(version),
            )
            .await?;
        Ok(txn)
    }

    /// Record a flow's rejection on its PENDING record
    ///
    /// Verdicts mark the record FAILED. An exhausted version race applied
    /// nothing, so its record is discarded outright; a storage fault leaves
    /// the record PENDING because the flow's side effects are unknown.
    async fn settle_rejection(&self, txn: Transaction, version: Version, error: &EngineError) {
        match error {
            EngineError::Conflict { .. } => self.discard_pending(txn, version).await,
            EngineError::Store { .. } => {}
            _ => self.mark_failed(txn, version).await,
        }
    }

    /// Mark a transaction FAILED; the original rejection is what the caller
    /// sees, so a fault here is only logged
    async fn mark_failed(&self, txn: Transaction, version: Version) {
        let id = txn.id;
        if let Err(e) = self.settle(txn, version, TransactionStatus::Failed).await {
            warn!(transaction = %id, error = %e, "failed to record FAILED status");
        }
    }

    /// Remove a PENDING record whose flow applied no side effects
    async fn discard_pending(&self, txn: Transaction, version: Version) {
        let write = LedgerWrite::delete(LedgerKey::Transaction(txn.id), version);
        if let Err(e) = self.store.transact(vec![write]).await {
            warn!(transaction = %txn.id, error = %e, "failed to discard pending record");
        }
    }

    /// Drop an in-flight claim; a fault here only delays the next retry
    async fn abandon_claim(&self, token: &IdempotencyToken) {
        if let Err(e) = self.registry.abandon(token).await {
            warn!(%token, error = %e, "failed to release idempotency claim");
        }
    }

    /// Return held capacity, retrying on a detached task if it will not land
    ///
    /// Called when a debit was rejected after the reservation was taken.
    /// The caller's rejection stands either way, but the capacity must come
    /// back; release is keyed by the reservation's marker, so the retries
    /// are safe to repeat.
    async fn release_or_escalate(&self, transaction: TransactionId, reservation: Reservation) {
        if let Err(e) = self.inventory.release(&reservation).await {
            warn!(
                %transaction,
                error = %e,
                "release failed after rejected debit, detaching background retries"
            );
            let orchestrator = self.clone();
            tokio::spawn(async move {
                loop {
                    match orchestrator.inventory.release(&reservation).await {
                        Ok(()) => {
                            info!(%transaction, "held capacity released");
                            return;
                        }
                        Err(e) => {
                            warn!(%transaction, error = %e, "release attempt failed");
                            sleep(orchestrator.config.retry.max_delay).await;
                        }
                    }
                }
            });
        }
    }

    /// Reverse a settled debit whose ticket commit never landed
    ///
    /// Retries inline first, then hands the reversal to a detached task so
    /// the caller gets the terminal failure without waiting out a flaky
    /// store. The reversal itself is one atomic store commit, keyed by the
    /// reservation's release marker so replays are no-ops.
    async fn compensate(&self, txn: Transaction, version: Version, reservation: Reservation) {
        for attempt in 0..self.config.compensation_attempts {
            match self.try_compensate(&txn, version, &reservation).await {
                Ok(()) => {
                    info!(transaction = %txn.id, "purchase compensated");
                    return;
                }
                Err(e) => {
                    warn!(transaction = %txn.id, error = %e, attempt, "compensation attempt failed");
                    sleep(self.config.retry.delay_for_attempt(attempt)).await;
                }
            }
        }

        warn!(transaction = %txn.id, "compensation still pending, detaching background retries");
        let orchestrator = self.clone();
        tokio::spawn(async move {
            loop {
                match orchestrator.try_compensate(&txn, version, &reservation).await {
                    Ok(()) => {
                        info!(transaction = %txn.id, "purchase compensated");
                        return;
                    }
                    Err(e) => {
                        warn!(transaction = %txn.id, error = %e, "compensation attempt failed");
                        sleep(orchestrator.config.retry.max_delay).await;
                    }
                }
            }
        });
    }

    async fn try_compensate(
        &self,
        txn: &Transaction,
        version: Version,
        reservation: &Reservation,
    ) -> Result<(), EngineError> {
        // The marker commits with the rest of the reversal, so its presence
        // means a previous attempt already landed in full
        if self.store.read_release(reservation.id).await?.is_some() {
            return Ok(());
        }

        let account = self
            .store
            .read_account(&txn.card_id)
            .await?
            .ok_or_else(|| EngineError::account_not_found(&txn.card_id))?;
        let mut wallet = account.value;
        wallet.credit(txn.amount)?;

        let slot = self
            .store
            .read_slot(&reservation.slot_id)
            .await?
            .ok_or_else(|| EngineError::slot_not_found(&reservation.slot_id))?;
        let mut slot_value = slot.value;
        slot_value.release(reservation.quantity);

        let mut compensated = txn.clone();
        compensated.transition(TransactionStatus::Compensated)?;

        let marker = ReleaseMarker {
            reservation: reservation.id,
            slot: reservation.slot_id.clone(),
            quantity: reservation.quantity,
            released_at: Utc::now(),
        };
        let writes = vec![
            LedgerWrite::create(
                LedgerKey::Release(reservation.id),
                LedgerValue::Release(marker),
            ),
            LedgerWrite::update(
                LedgerKey::Slot(reservation.slot_id.clone()),
                LedgerValue::Slot(slot_value),
                slot.version,
            ),
            LedgerWrite::update(
                LedgerKey::Account(txn.card_id.clone()),
                LedgerValue::Account(wallet),
                account.version,
            ),
            LedgerWrite::update(
                LedgerKey::Transaction(txn.id),
                LedgerValue::Transaction(compensated),
                version,
            ),
        ];
        self.store.transact(writes).await
    }

    /// The result replayed for a token whose record was resolved by hand
    fn resolution_result(&self, txn: &Transaction) -> OperationResult {
        match txn.status {
            TransactionStatus::Committed => Ok(match txn.kind {
                TransactionKind::Deposit => OperationOutcome::Deposit(TransactionReceipt {
                    transaction: txn.clone(),
                    message: "Deposit successful".to_string(),
                }),
                TransactionKind::Withdrawal => OperationOutcome::Withdraw(TransactionReceipt {
                    transaction: txn.clone(),
                    message: "Withdrawal successful".to_string(),
                }),
                TransactionKind::Refund => OperationOutcome::Refund(TransactionReceipt {
                    transaction: txn.clone(),
                    message: "Refund successful".to_string(),
                }),
                TransactionKind::TicketPurchase => OperationOutcome::Purchase(PurchaseReceipt {
                    message: "Ticket purchased successfully".to_string(),
                    ticket_url: txn
                        .ticket_id
                        .map(|id| format!("{}/{}", self.config.ticket_url_base, id)),
                }),
            }),
            TransactionStatus::Compensated if txn.kind == TransactionKind::TicketPurchase => {
                Err(EngineError::purchase_reversed(txn.id))
            }
            _ => Err(EngineError::deadline_exceeded(operation_name(txn.kind))),
        }
    }
}

/// A stored result was replayed for a token first used by a different
/// operation; the registry keeps tokens unique per operation, so this is a
/// caller contract violation
fn token_reuse(token: &IdempotencyToken, outcome: &OperationOutcome) -> EngineError {
    EngineError::store(format!(
        "token {token} was first used by a different operation ({outcome:?})"
    ))
}

fn missing_field(txn: &Transaction, missing: &str) -> EngineError {
    EngineError::store(format!("transaction {} is missing its {missing}", txn.id))
}

fn operation_name(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Deposit => "deposit",
        TransactionKind::Withdrawal => "withdraw",
        TransactionKind::TicketPurchase => "purchase",
        TransactionKind::Refund => "refund",
    }
}
