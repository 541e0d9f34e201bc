//! Error types for the ticketing engine
//!
//! Every fallible operation in the engine returns [`EngineError`]. Variants
//! carry enough context to log and diagnose a rejected operation without
//! consulting the store.
//!
//! # Error Categories
//!
//! - **Terminal rejections**: insufficient capacity or funds, unknown slots,
//!   cards, or transactions. Returned to the caller directly, never retried.
//! - **Transient conflicts**: optimistic version conflicts surfaced after the
//!   internal retry budget is exhausted. Safe for the caller to retry.
//! - **Duplicate handling**: a token whose first execution is still running.
//! - **Internal faults**: storage failures and invariant violations.
//!
//! Errors are serializable because a terminal failure is stored in the
//! idempotency registry and replayed verbatim on retries of the same token.

use crate::types::ids::{Amount, CardId, IdempotencyToken, SlotId, TransactionId};
use crate::types::transaction::TransactionStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the ticketing engine
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EngineError {
    /// The referenced event slot does not exist or has been retired
    ///
    /// Soft-retired slots keep their records for existing tickets but are
    /// no longer reservable, so they are reported the same as unknown slots.
    #[error("Event slot {slot} not found")]
    SlotNotFound {
        /// Slot identifier from the intent
        slot: SlotId,
    },

    /// No wallet account exists for the card
    ///
    /// Accounts are created lazily on first deposit; debits against a card
    /// that never deposited are rejected.
    #[error("No wallet account for card {card}")]
    AccountNotFound {
        /// Normalized card key
        card: CardId,
    },

    /// The referenced ledger transaction does not exist
    #[error("Transaction {transaction} not found")]
    TransactionNotFound {
        /// Transaction identifier
        transaction: TransactionId,
    },

    /// Reserving would push the slot past its capacity
    ///
    /// Terminal; the slot state is unchanged.
    #[error("Insufficient capacity on slot {slot}: remaining {remaining}, requested {requested}")]
    InsufficientCapacity {
        /// Slot identifier
        slot: SlotId,
        /// Seats still unreserved
        remaining: u32,
        /// Seats requested
        requested: u32,
    },

    /// The wallet balance does not cover the debit
    ///
    /// Terminal; the balance is unchanged.
    #[error("Insufficient funds on card {card}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Normalized card key
        card: CardId,
        /// Balance at the time of the attempt
        balance: Amount,
        /// Requested debit amount
        requested: Amount,
    },

    /// An optimistic conditional write lost its race
    ///
    /// Retried internally with bounded backoff; surfaced only once the retry
    /// budget is exhausted, at which point the caller may safely retry.
    #[error("Version conflict on {key}")]
    Conflict {
        /// Ledger key that conflicted
        key: String,
    },

    /// The same idempotency token is currently being processed
    ///
    /// The caller should retry later with the same token to receive the
    /// original terminal result; resubmitting under a new token would double
    /// the side effects.
    #[error("Operation for token {token} is already in flight")]
    DuplicateInFlight {
        /// The duplicated token
        token: IdempotencyToken,
    },

    /// The request-scoped deadline elapsed before the flow finished
    ///
    /// The transaction record is left PENDING for reconciliation rather than
    /// guessed at as failed.
    #[error("Deadline exceeded while processing {operation}")]
    DeadlineExceeded {
        /// Flow that timed out
        operation: String,
    },

    /// A settled debit is still awaiting reversal
    ///
    /// Surfaced only to internal reconciliation, never to the original
    /// caller, who already received the terminal failure.
    #[error("Compensation pending for transaction {transaction}")]
    CompensationPending {
        /// Transaction being reversed
        transaction: TransactionId,
    },

    /// Ticket issuance failed after a successful debit and the charge was
    /// (or is being) reversed
    #[error("Ticket purchase {transaction} could not be completed; the charge was reversed")]
    PurchaseReversed {
        /// The reversed purchase transaction
        transaction: TransactionId,
    },

    /// Intent amount outside the inherited 2-4 digit contract
    #[error("Invalid amount '{amount}': must be 2 to 4 digits")]
    InvalidAmount {
        /// The rejected amount string
        amount: String,
    },

    /// Intent quantity outside the inherited 1..=15 contract
    #[error("Invalid quantity {quantity}: must be between 1 and 15")]
    InvalidQuantity {
        /// The rejected quantity
        quantity: u32,
    },

    /// Slot published with a non-positive capacity
    #[error("Invalid capacity {capacity} for slot {slot}: must be positive")]
    InvalidCapacity {
        /// Slot identifier
        slot: SlotId,
        /// The rejected capacity
        capacity: u32,
    },

    /// The transaction is not a committed ticket purchase
    #[error("Transaction {transaction} cannot be refunded: {reason}")]
    NotRefundable {
        /// Transaction identifier
        transaction: TransactionId,
        /// Why the refund was rejected
        reason: String,
    },

    /// A status change would violate the monotone transition rules
    #[error("Illegal status transition for transaction {transaction}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Transaction identifier
        transaction: TransactionId,
        /// Status before the attempted change
        from: TransactionStatus,
        /// Rejected target status
        to: TransactionStatus,
    },

    /// Balance or charge arithmetic would overflow
    #[error("Arithmetic overflow in {operation} for card {card}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Normalized card key
        card: CardId,
    },

    /// The ledger store failed or returned a malformed record
    #[error("Ledger store error: {message}")]
    Store {
        /// Description of the storage fault
        message: String,
    },
}

// Helper functions for creating common errors

impl EngineError {
    /// Create a SlotNotFound error
    pub fn slot_not_found(slot: &SlotId) -> Self {
        EngineError::SlotNotFound { slot: slot.clone() }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(card: &CardId) -> Self {
        EngineError::AccountNotFound { card: card.clone() }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(transaction: TransactionId) -> Self {
        EngineError::TransactionNotFound { transaction }
    }

    /// Create an InsufficientCapacity error
    pub fn insufficient_capacity(slot: &SlotId, remaining: u32, requested: u32) -> Self {
        EngineError::InsufficientCapacity {
            slot: slot.clone(),
            remaining,
            requested,
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(card: &CardId, balance: Amount, requested: Amount) -> Self {
        EngineError::InsufficientFunds {
            card: card.clone(),
            balance,
            requested,
        }
    }

    /// Create a Conflict error
    pub fn conflict(key: impl Into<String>) -> Self {
        EngineError::Conflict { key: key.into() }
    }

    /// Create a DuplicateInFlight error
    pub fn duplicate_in_flight(token: &IdempotencyToken) -> Self {
        EngineError::DuplicateInFlight {
            token: token.clone(),
        }
    }

    /// Create a DeadlineExceeded error
    pub fn deadline_exceeded(operation: &str) -> Self {
        EngineError::DeadlineExceeded {
            operation: operation.to_string(),
        }
    }

    /// Create a CompensationPending error
    pub fn compensation_pending(transaction: TransactionId) -> Self {
        EngineError::CompensationPending { transaction }
    }

    /// Create a PurchaseReversed error
    pub fn purchase_reversed(transaction: TransactionId) -> Self {
        EngineError::PurchaseReversed { transaction }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: &str) -> Self {
        EngineError::InvalidAmount {
            amount: amount.to_string(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(quantity: u32) -> Self {
        EngineError::InvalidQuantity { quantity }
    }

    /// Create an InvalidCapacity error
    pub fn invalid_capacity(slot: &SlotId, capacity: u32) -> Self {
        EngineError::InvalidCapacity {
            slot: slot.clone(),
            capacity,
        }
    }

    /// Create a NotRefundable error
    pub fn not_refundable(transaction: TransactionId, reason: &str) -> Self {
        EngineError::NotRefundable {
            transaction,
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(
        transaction: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Self {
        EngineError::InvalidTransition {
            transaction,
            from,
            to,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, card: &CardId) -> Self {
        EngineError::ArithmeticOverflow {
            operation: operation.to_string(),
            card: card.clone(),
        }
    }

    /// Create a Store error
    pub fn store(message: impl Into<String>) -> Self {
        EngineError::Store {
            message: message.into(),
        }
    }

    /// Whether the error is a transient version conflict
    ///
    /// Conflicts are the only errors retried by the optimistic loops; every
    /// other variant is terminal for the attempt that produced it.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    /// Whether the error describes a transient fault rather than a verdict
    ///
    /// Transient errors (lost version races, storage faults) are never
    /// recorded as the terminal result of an idempotency token: the same
    /// token must be able to run again once the contention or the fault
    /// clears.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict { .. } | EngineError::Store { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::slot_not_found(
        EngineError::slot_not_found(&SlotId::from("slot-1")),
        "Event slot slot-1 not found"
    )]
    #[case::insufficient_capacity(
        EngineError::insufficient_capacity(&SlotId::from("slot-1"), 4, 6),
        "Insufficient capacity on slot slot-1: remaining 4, requested 6"
    )]
    #[case::insufficient_funds(
        EngineError::insufficient_funds(&CardId::from_card_number("1234-5678-9012-3456"), 500, 700),
        "Insufficient funds on card 1234567890123456: balance 500, requested 700"
    )]
    #[case::conflict(
        EngineError::conflict("slot/slot-1"),
        "Version conflict on slot/slot-1"
    )]
    #[case::duplicate_in_flight(
        EngineError::duplicate_in_flight(&IdempotencyToken::from("tok-9")),
        "Operation for token tok-9 is already in flight"
    )]
    #[case::deadline_exceeded(
        EngineError::deadline_exceeded("purchase"),
        "Deadline exceeded while processing purchase"
    )]
    #[case::invalid_amount(
        EngineError::invalid_amount("7"),
        "Invalid amount '7': must be 2 to 4 digits"
    )]
    #[case::invalid_quantity(
        EngineError::invalid_quantity(16),
        "Invalid quantity 16: must be between 1 and 15"
    )]
    fn test_error_display(#[case] error: EngineError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_is_conflict() {
        assert!(EngineError::conflict("account/1").is_conflict());
        assert!(!EngineError::deadline_exceeded("deposit").is_conflict());
    }

    #[test]
    fn test_is_transient() {
        assert!(EngineError::conflict("account/1").is_transient());
        assert!(EngineError::store("write fault").is_transient());
        assert!(!EngineError::invalid_amount("7").is_transient());
        assert!(!EngineError::deadline_exceeded("deposit").is_transient());
    }
}
