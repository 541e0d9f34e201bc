//! Types module
//!
//! Core data structures used throughout the engine:
//! - `ids`: identifier newtypes and the `Amount` alias
//! - `intent`: validated operation intents
//! - `slot`: event slot capacity state
//! - `account`: wallet account state
//! - `transaction`: ledger transactions and tickets
//! - `outcome`: terminal results and idempotency records
//! - `error`: the engine error type

pub mod account;
pub mod error;
pub mod ids;
pub mod intent;
pub mod outcome;
pub mod slot;
pub mod transaction;

pub use account::WalletAccount;
pub use error::EngineError;
pub use ids::{
    Amount, CardId, EventId, IdempotencyToken, OwnerId, ReservationId, SlotId, TicketId,
    TransactionId,
};
pub use intent::{
    DepositIntent, PurchaseIntent, RefundIntent, WithdrawIntent, MAX_PURCHASE_QUANTITY,
};
pub use outcome::{
    IdempotencyEntry, IdempotencyState, OperationOutcome, OperationResult, PurchaseReceipt,
    ReleaseMarker, TransactionReceipt,
};
pub use slot::EventSlot;
pub use transaction::{Ticket, Transaction, TransactionKind, TransactionStatus};
