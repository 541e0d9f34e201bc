//! Terminal operation outcomes and idempotency records
//!
//! Every operation resolves to an [`OperationResult`] which is stored in the
//! idempotency registry and replayed verbatim when the same token is
//! presented again. The payloads mirror the response shapes the HTTP layer
//! exposes: a transaction plus a fixed message, or a message plus an
//! optional ticket URL.

use crate::types::error::EngineError;
use crate::types::ids::{IdempotencyToken, ReservationId, SlotId};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal result of a deposit, withdrawal, or refund
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// The committed ledger transaction
    pub transaction: Transaction,

    /// Fixed outcome message
    pub message: String,
}

/// Terminal result of a ticket purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// Fixed outcome message
    pub message: String,

    /// Ticket URL; present only for committed purchases
    pub ticket_url: Option<String>,
}

/// Successful outcome of any engine operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// Deposit receipt
    Deposit(TransactionReceipt),

    /// Withdrawal receipt
    Withdraw(TransactionReceipt),

    /// Purchase receipt
    Purchase(PurchaseReceipt),

    /// Refund receipt
    Refund(TransactionReceipt),
}

/// Terminal result stored per idempotency token
pub type OperationResult = Result<OperationOutcome, EngineError>;

/// Resolution state of an idempotency token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdempotencyState {
    /// First execution still running; duplicates must wait, never re-execute
    InFlight,

    /// Terminal result recorded; replayed to every retry of the token
    Done(OperationResult),
}

/// Registry record for one idempotency token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyEntry {
    /// The token this entry deduplicates
    pub token: IdempotencyToken,

    /// Current resolution state
    pub state: IdempotencyState,

    /// When the first execution began
    pub created_at: DateTime<Utc>,
}

impl IdempotencyEntry {
    /// Create the PENDING marker inserted by the first execution
    pub fn in_flight(token: IdempotencyToken) -> Self {
        IdempotencyEntry {
            token,
            state: IdempotencyState::InFlight,
            created_at: Utc::now(),
        }
    }
}

/// Marker committed alongside a capacity release
///
/// Written in the same store transaction as the slot decrement, keyed by the
/// reservation handle. A second release of the same handle finds the marker
/// and becomes a no-op instead of a double release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMarker {
    /// The released reservation handle
    pub reservation: ReservationId,

    /// Slot the capacity was returned to
    pub slot: SlotId,

    /// Quantity released
    pub quantity: u32,

    /// When the release committed
    pub released_at: DateTime<Utc>,
}
