//! Ledger store abstraction
//!
//! All mutable shared state (slot reservations, wallet balances, transaction
//! records, idempotency entries) lives behind the [`LedgerStore`] trait as
//! versioned records. The engine never takes an in-process lock in place of
//! the store's conditional writes, so multiple engine instances can share
//! one store safely.
//!
//! The trait mirrors a transactional key-value store:
//! - `read` returns a value with its version
//! - `write_if_version` is an atomic compare-and-swap on the version
//! - `transact` applies a multi-key conditional batch atomically
//!
//! [`memory::MemoryLedger`] is the bundled adapter used in tests and for
//! single-store deployments.

pub mod memory;

use crate::types::{
    CardId, EngineError, EventSlot, IdempotencyEntry, IdempotencyToken, ReleaseMarker,
    ReservationId, SlotId, Ticket, TicketId, Transaction, TransactionId, WalletAccount,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::MemoryLedger;

/// Monotonic record version used for optimistic concurrency
///
/// A freshly created record has version 1; every successful conditional
/// write increments it.
pub type Version = u64;

/// Key addressing one record in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKey {
    /// Event slot record
    Slot(SlotId),

    /// Wallet account record
    Account(CardId),

    /// Ledger transaction record
    Transaction(TransactionId),

    /// Issued ticket record
    Ticket(TicketId),

    /// Idempotency registry entry
    Idempotency(IdempotencyToken),

    /// Per-reservation release marker
    Release(ReservationId),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKey::Slot(id) => write!(f, "slot/{id}"),
            LedgerKey::Account(id) => write!(f, "account/{id}"),
            LedgerKey::Transaction(id) => write!(f, "transaction/{id}"),
            LedgerKey::Ticket(id) => write!(f, "ticket/{id}"),
            LedgerKey::Idempotency(token) => write!(f, "idempotency/{token}"),
            LedgerKey::Release(id) => write!(f, "release/{id}"),
        }
    }
}

/// Value stored under a [`LedgerKey`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerValue {
    /// Event slot record
    Slot(EventSlot),

    /// Wallet account record
    Account(WalletAccount),

    /// Ledger transaction record
    Transaction(Transaction),

    /// Issued ticket record
    Ticket(Ticket),

    /// Idempotency registry entry
    Idempotency(IdempotencyEntry),

    /// Per-reservation release marker
    Release(ReleaseMarker),
}

/// A value together with its store version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The record payload
    pub value: T,

    /// Version observed at read time
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Wrap a value with its version
    pub fn new(value: T, version: Version) -> Self {
        Versioned { value, version }
    }
}

/// One conditional write inside a multi-key transaction
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerWrite {
    /// Key to write
    pub key: LedgerKey,

    /// New value, or `None` to delete the record
    pub value: Option<LedgerValue>,

    /// Expected current version; `None` means the key must not exist
    pub expected: Option<Version>,
}

impl LedgerWrite {
    /// Conditional update of an existing record
    pub fn update(key: LedgerKey, value: LedgerValue, expected: Version) -> Self {
        LedgerWrite {
            key,
            value: Some(value),
            expected: Some(expected),
        }
    }

    /// Creation of a record that must not exist yet
    pub fn create(key: LedgerKey, value: LedgerValue) -> Self {
        LedgerWrite {
            key,
            value: Some(value),
            expected: None,
        }
    }

    /// Conditional deletion of an existing record
    pub fn delete(key: LedgerKey, expected: Version) -> Self {
        LedgerWrite {
            key,
            value: None,
            expected: Some(expected),
        }
    }
}

fn type_mismatch(key: &LedgerKey) -> EngineError {
    EngineError::store(format!("record type mismatch at {key}"))
}

/// Durable, transactional record storage with optimistic concurrency
///
/// Operations against the same key are linearized by the store; operations
/// against different keys are unordered unless batched in one `transact`
/// call. Every method may block briefly on a store round trip; callers bound
/// whole flows with a request-scoped timeout rather than per-call deadlines.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read a record together with its current version
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on storage faults.
    async fn read(&self, key: &LedgerKey) -> Result<Option<Versioned<LedgerValue>>, EngineError>;

    /// Conditionally write a record
    ///
    /// With `expected = Some(v)` the write succeeds only if the current
    /// version is exactly `v`; with `expected = None` it succeeds only if
    /// the key does not exist. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Conflict`] if the condition fails and
    /// [`EngineError::Store`] on storage faults.
    async fn write_if_version(
        &self,
        key: LedgerKey,
        value: LedgerValue,
        expected: Option<Version>,
    ) -> Result<Version, EngineError>;

    /// Apply a batch of conditional writes atomically
    ///
    /// Either every write (and delete) in the batch is applied or none is.
    /// A key may appear at most once per batch; with a repeated key the
    /// later version checks would run against state the batch itself
    /// changes, so adapters reject such batches with [`EngineError::Store`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Conflict`] naming the first key whose
    /// condition failed, or [`EngineError::Store`] on storage faults or a
    /// repeated key.
    async fn transact(&self, writes: Vec<LedgerWrite>) -> Result<(), EngineError>;

    /// List all transaction records, for reconciliation and inspection
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on storage faults.
    async fn scan_transactions(&self) -> Result<Vec<Transaction>, EngineError>;

    /// Typed read of an event slot
    async fn read_slot(
        &self,
        id: &SlotId,
    ) -> Result<Option<Versioned<EventSlot>>, EngineError> {
        let key = LedgerKey::Slot(id.clone());
        match self.read(&key).await? {
            Some(Versioned {
                value: LedgerValue::Slot(slot),
                version,
            }) => Ok(Some(Versioned::new(slot, version))),
            Some(_) => Err(type_mismatch(&key)),
            None => Ok(None),
        }
    }

    /// Typed read of a wallet account
    async fn read_account(
        &self,
        card: &CardId,
    ) -> Result<Option<Versioned<WalletAccount>>, EngineError> {
        let key = LedgerKey::Account(card.clone());
        match self.read(&key).await? {
            Some(Versioned {
                value: LedgerValue::Account(account),
                version,
            }) => Ok(Some(Versioned::new(account, version))),
            Some(_) => Err(type_mismatch(&key)),
            None => Ok(None),
        }
    }

    /// Typed read of a ledger transaction
    async fn read_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Versioned<Transaction>>, EngineError> {
        let key = LedgerKey::Transaction(id);
        match self.read(&key).await? {
            Some(Versioned {
                value: LedgerValue::Transaction(txn),
                version,
            }) => Ok(Some(Versioned::new(txn, version))),
            Some(_) => Err(type_mismatch(&key)),
            None => Ok(None),
        }
    }

    /// Typed read of an issued ticket
    async fn read_ticket(&self, id: TicketId) -> Result<Option<Versioned<Ticket>>, EngineError> {
        let key = LedgerKey::Ticket(id);
        match self.read(&key).await? {
            Some(Versioned {
                value: LedgerValue::Ticket(ticket),
                version,
            }) => Ok(Some(Versioned::new(ticket, version))),
            Some(_) => Err(type_mismatch(&key)),
            None => Ok(None),
        }
    }

    /// Typed read of an idempotency registry entry
    async fn read_idempotency(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<Versioned<IdempotencyEntry>>, EngineError> {
        let key = LedgerKey::Idempotency(token.clone());
        match self.read(&key).await? {
            Some(Versioned {
                value: LedgerValue::Idempotency(entry),
                version,
            }) => Ok(Some(Versioned::new(entry, version))),
            Some(_) => Err(type_mismatch(&key)),
            None => Ok(None),
        }
    }

    /// Typed read of a release marker
    async fn read_release(
        &self,
        id: ReservationId,
    ) -> Result<Option<Versioned<ReleaseMarker>>, EngineError> {
        let key = LedgerKey::Release(id);
        match self.read(&key).await? {
            Some(Versioned {
                value: LedgerValue::Release(marker),
                version,
            }) => Ok(Some(Versioned::new(marker, version))),
            Some(_) => Err(type_mismatch(&key)),
            None => Ok(None),
        }
    }
}
