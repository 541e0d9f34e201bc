//! Ticketing Engine Library
//! # Overview
//!
//! This library implements a ticket inventory and wallet transaction engine:
//! finite-capacity event slots that are never oversold, wallet accounts whose
//! balances move only through atomic conditional writes, and a two-phase
//! ticket purchase that either issues a ticket or reverses every side effect.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (EventSlot, WalletAccount, Transaction, etc.)
//! - [`store`] - The versioned ledger store abstraction and its in-memory adapter
//! - [`core`] - Business logic components:
//!   - [`core::orchestrator`] - Multi-step flow sequencing and compensation
//!   - [`core::inventory`] - Slot capacity reservations and releases
//!   - [`core::wallet`] - Balance credits and debits
//!   - [`core::idempotency`] - Token registry deduplicating retries
//!
//! # Operations
//!
//! The engine supports four operations, each deduplicated by an idempotency
//! token:
//!
//! - **Deposit**: Credit funds to a wallet, creating the account on first use
//! - **Withdrawal**: Debit funds from a wallet (requires sufficient balance)
//! - **Ticket purchase**: Reserve slot capacity, debit the charge, issue a ticket
//! - **Refund**: Reverse a committed purchase, restoring funds and capacity
//!
//! # Concurrency
//!
//! All shared state lives in the ledger store as versioned records. Writers
//! use compare-and-swap on record versions with bounded backoff instead of
//! in-process locks, so multiple engine instances can share one store and the
//! no-oversell and no-overdraw invariants hold globally.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use ticketing_engine::core::{EngineConfig, TransactionOrchestrator};
//! use ticketing_engine::store::MemoryLedger;
//! use ticketing_engine::types::{DepositIntent, EventId, EventSlot, PurchaseIntent, SlotId};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ticketing_engine::types::EngineError> {
//! let engine = TransactionOrchestrator::new(
//!     Arc::new(MemoryLedger::new()),
//!     EngineConfig::default(),
//! );
//!
//! engine
//!     .inventory()
//!     .publish_slot(EventSlot::new(
//!         SlotId::from("slot-1"),
//!         EventId::from("concert"),
//!         100,
//!         250,
//!         Utc::now(),
//!         Utc::now() + chrono::Duration::hours(3),
//!     ))
//!     .await?;
//!
//! engine
//!     .deposit(DepositIntent::new("tok-1", "1111-2222-3333-4444", "1000")?)
//!     .await?;
//! let receipt = engine
//!     .purchase_ticket(PurchaseIntent::new("tok-2", "1111-2222-3333-4444", "slot-1", 2)?)
//!     .await?;
//! assert!(receipt.ticket_url.is_some());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod store;
pub mod types;

pub use crate::core::{EngineConfig, TransactionOrchestrator};
pub use crate::store::{LedgerStore, MemoryLedger};
pub use crate::types::EngineError;
