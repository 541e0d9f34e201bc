//! Ledger transaction and ticket types
//!
//! Every engine operation is recorded as a [`Transaction`]: created PENDING
//! at intent time and driven to exactly one terminal status. Tickets are
//! issued only together with a committed purchase transaction, inside the
//! same multi-key store commit.

use crate::types::error::EngineError;
use crate::types::ids::{
    Amount, CardId, IdempotencyToken, OwnerId, SlotId, TicketId, TransactionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of ledger transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Credit funds to a wallet, creating the account on first use
    Deposit,

    /// Debit funds from a wallet; requires sufficient balance
    Withdrawal,

    /// Reserve slot capacity and debit the computed charge
    TicketPurchase,

    /// Reverse a committed purchase: credit the wallet and release capacity
    Refund,
}

/// Lifecycle status of a ledger transaction
///
/// Transitions are monotone. A transaction never returns to PENDING, and a
/// terminal FAILED or COMPENSATED record is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created at intent time; side effects may be partially applied
    Pending,

    /// All side effects applied and durable
    Committed,

    /// Rejected before any surviving side effect
    Failed,

    /// Side effects reversed after a partial failure or an explicit refund
    Compensated,
}

impl TransactionStatus {
    /// Whether moving to `next` respects the monotone transition rules
    ///
    /// Allowed: PENDING to COMMITTED or FAILED, PENDING to COMPENSATED when
    /// a debit settled but the commit never landed, and COMMITTED to
    /// COMPENSATED via an explicit reversal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Committed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
                | (TransactionStatus::Pending, TransactionStatus::Compensated)
                | (TransactionStatus::Committed, TransactionStatus::Compensated)
        )
    }

    /// Whether the status is terminal for the original caller
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// A single ledger transaction record
///
/// Exactly one transaction exists per distinct idempotency token; the
/// registry enforces this before the record is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier
    pub id: TransactionId,

    /// Wallet account the transaction debits or credits
    pub card_id: CardId,

    /// Amount in minor currency units; always positive
    pub amount: Amount,

    /// What the transaction does
    pub kind: TransactionKind,

    /// Current lifecycle status
    pub status: TransactionStatus,

    /// Idempotency token that created this transaction
    pub token: IdempotencyToken,

    /// Creation timestamp (intent time)
    pub created_at: DateTime<Utc>,

    /// Referenced event slot, for purchases and refunds
    pub event_slot_id: Option<SlotId>,

    /// Ticket quantity, for purchases and refunds
    pub quantity: Option<u32>,

    /// Ticket issued by this transaction, set at commit time
    pub ticket_id: Option<TicketId>,

    /// For refunds, the purchase transaction being reversed
    pub refund_of: Option<TransactionId>,
}

impl Transaction {
    /// Create a new PENDING transaction at intent time
    pub fn pending(
        kind: TransactionKind,
        card_id: CardId,
        amount: Amount,
        token: IdempotencyToken,
    ) -> Self {
        Transaction {
            id: TransactionId::new(),
            card_id,
            amount,
            kind,
            status: TransactionStatus::Pending,
            token,
            created_at: Utc::now(),
            event_slot_id: None,
            quantity: None,
            ticket_id: None,
            refund_of: None,
        }
    }

    /// Attach the slot reference and quantity of a purchase or refund
    pub fn with_slot(mut self, slot_id: SlotId, quantity: u32) -> Self {
        self.event_slot_id = Some(slot_id);
        self.quantity = Some(quantity);
        self
    }

    /// Mark this transaction as the reversal of a committed purchase
    pub fn with_refund_of(mut self, original: TransactionId) -> Self {
        self.refund_of = Some(original);
        self
    }

    /// Apply a status transition, enforcing monotonicity
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] if the change would move
    /// the transaction backwards or mutate a terminal record.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::invalid_transition(self.id, self.status, next));
        }
        self.status = next;
        Ok(())
    }
}

/// A ticket issued for a committed purchase transaction
///
/// Owns a 1:1 reference to its transaction; the store commit that creates a
/// ticket also marks the transaction COMMITTED, so a ticket exists exactly
/// when its owning transaction is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,

    /// Slot the ticket admits to
    pub event_slot_id: SlotId,

    /// Verified identity of the purchaser
    pub owner_id: OwnerId,

    /// Number of admissions
    pub quantity: u32,

    /// Owning purchase transaction
    pub transaction_id: TransactionId,
}

impl Ticket {
    /// Create a ticket for a purchase about to be committed
    pub fn new(
        event_slot_id: SlotId,
        owner_id: OwnerId,
        quantity: u32,
        transaction_id: TransactionId,
    ) -> Self {
        Ticket {
            id: TicketId::new(),
            event_slot_id,
            owner_id,
            quantity,
            transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn card() -> CardId {
        CardId::from_card_number("1234-5678-9012-3456")
    }

    #[rstest]
    #[case(TransactionStatus::Pending, TransactionStatus::Committed, true)]
    #[case(TransactionStatus::Pending, TransactionStatus::Failed, true)]
    #[case(TransactionStatus::Pending, TransactionStatus::Compensated, true)]
    #[case(TransactionStatus::Committed, TransactionStatus::Compensated, true)]
    #[case(TransactionStatus::Committed, TransactionStatus::Pending, false)]
    #[case(TransactionStatus::Committed, TransactionStatus::Failed, false)]
    #[case(TransactionStatus::Failed, TransactionStatus::Committed, false)]
    #[case(TransactionStatus::Failed, TransactionStatus::Compensated, false)]
    #[case(TransactionStatus::Compensated, TransactionStatus::Committed, false)]
    fn test_status_transitions(
        #[case] from: TransactionStatus,
        #[case] to: TransactionStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_pending_transaction_defaults() {
        let txn = Transaction::pending(
            TransactionKind::Deposit,
            card(),
            100,
            IdempotencyToken::from("tok-1"),
        );

        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.amount, 100);
        assert!(txn.event_slot_id.is_none());
        assert!(txn.ticket_id.is_none());
        assert!(txn.refund_of.is_none());
    }

    #[test]
    fn test_transition_to_committed() {
        let mut txn = Transaction::pending(
            TransactionKind::Withdrawal,
            card(),
            250,
            IdempotencyToken::from("tok-2"),
        );

        txn.transition(TransactionStatus::Committed).unwrap();
        assert_eq!(txn.status, TransactionStatus::Committed);
    }

    #[test]
    fn test_terminal_record_is_immutable() {
        let mut txn = Transaction::pending(
            TransactionKind::Withdrawal,
            card(),
            250,
            IdempotencyToken::from("tok-3"),
        );
        txn.transition(TransactionStatus::Failed).unwrap();

        let result = txn.transition(TransactionStatus::Committed);
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
        assert_eq!(txn.status, TransactionStatus::Failed);
    }

    #[test]
    fn test_purchase_carries_slot_reference() {
        let txn = Transaction::pending(
            TransactionKind::TicketPurchase,
            card(),
            600,
            IdempotencyToken::from("tok-4"),
        )
        .with_slot(SlotId::from("slot-1"), 3);

        assert_eq!(txn.event_slot_id, Some(SlotId::from("slot-1")));
        assert_eq!(txn.quantity, Some(3));
    }
}
