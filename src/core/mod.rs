//! Core engine components
//!
//! - `retry`: shared backoff policy for optimistic write loops
//! - `idempotency`: token registry deduplicating operations
//! - `inventory`: slot capacity reservations and releases
//! - `wallet`: balance credits and debits
//! - `orchestrator`: multi-step flows, two-phase purchase, compensation

pub mod idempotency;
pub mod inventory;
pub mod orchestrator;
pub mod retry;
pub mod wallet;

pub use idempotency::{BeginOutcome, IdempotencyRegistry};
pub use inventory::{Reservation, SlotInventoryManager};
pub use orchestrator::{EngineConfig, TransactionOrchestrator};
pub use retry::RetryPolicy;
pub use wallet::WalletAccountManager;
