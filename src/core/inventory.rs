//! Slot inventory management
//!
//! Owns per-slot remaining capacity. Reservations are single atomic
//! conditional updates against the ledger store: read the slot with its
//! version, bump `reserved`, write back conditionally, retry on conflict
//! with bounded backoff. No slot is ever oversold; that property holds
//! across every engine instance sharing the store.

use crate::core::retry::RetryPolicy;
use crate::store::{LedgerKey, LedgerStore, LedgerValue, LedgerWrite};
use crate::types::{EngineError, EventSlot, ReleaseMarker, ReservationId, SlotId};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

/// Handle for capacity held on a slot, needed to release it later
///
/// The id doubles as the idempotency key for [`SlotInventoryManager::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Unique handle id, minted when the reservation commits
    pub id: ReservationId,

    /// Slot the capacity is held on
    pub slot_id: SlotId,

    /// Number of units held
    pub quantity: u32,
}

/// Manages event slot capacity through optimistic conditional writes
#[derive(Clone)]
pub struct SlotInventoryManager {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

impl SlotInventoryManager {
    /// Create an inventory manager over the shared ledger store
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryPolicy) -> Self {
        SlotInventoryManager { store, retry }
    }

    /// Publish a new slot, creating its ledger record
    ///
    /// Slots come into existence when an event is published and start with
    /// zero reservations.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidCapacity`] for a zero capacity and
    /// [`EngineError::Conflict`] if the slot already exists.
    pub async fn publish_slot(&self, slot: EventSlot) -> Result<(), EngineError> {
        if slot.capacity == 0 {
            return Err(EngineError::invalid_capacity(&slot.id, slot.capacity));
        }
        let key = LedgerKey::Slot(slot.id.clone());
        self.store
            .write_if_version(key, LedgerValue::Slot(slot), None)
            .await?;
        Ok(())
    }

    /// Soft-retire a slot so it stops accepting reservations
    ///
    /// The record is kept while tickets reference it. Retiring an already
    /// retired slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SlotNotFound`] for unknown slots and
    /// [`EngineError::Conflict`] once the retry budget is exhausted.
    pub async fn retire_slot(&self, slot_id: &SlotId) -> Result<(), EngineError> {
        let key = LedgerKey::Slot(slot_id.clone());
        for attempt in 0..self.retry.max_attempts {
            let versioned = self
                .store
                .read_slot(slot_id)
                .await?
                .ok_or_else(|| EngineError::slot_not_found(slot_id))?;
            if versioned.value.retired {
                return Ok(());
            }

            let mut slot = versioned.value;
            slot.retired = true;
            match self
                .store
                .write_if_version(key.clone(), LedgerValue::Slot(slot), Some(versioned.version))
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    debug!(slot = %slot_id, attempt, "retire lost version race, retrying");
                    sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::conflict(key.to_string()))
    }

    /// Read the current state of a slot
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SlotNotFound`] if no record exists.
    pub async fn slot(&self, slot_id: &SlotId) -> Result<EventSlot, EngineError> {
        self.store
            .read_slot(slot_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| EngineError::slot_not_found(slot_id))
    }

    /// Atomically reserve capacity, returning a release handle
    ///
    /// Succeeds only if `reserved + quantity <= capacity` at commit time.
    /// Version conflicts are retried with bounded backoff; a capacity
    /// rejection is terminal and leaves the slot untouched.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SlotNotFound`] for unknown or retired slots
    /// - [`EngineError::InsufficientCapacity`] if the request cannot fit
    /// - [`EngineError::Conflict`] once the retry budget is exhausted
    pub async fn reserve(
        &self,
        slot_id: &SlotId,
        quantity: u32,
    ) -> Result<Reservation, EngineError> {
        let key = LedgerKey::Slot(slot_id.clone());
        for attempt in 0..self.retry.max_attempts {
            let versioned = self
                .store
                .read_slot(slot_id)
                .await?
                .ok_or_else(|| EngineError::slot_not_found(slot_id))?;
            if versioned.value.retired {
                return Err(EngineError::slot_not_found(slot_id));
            }

            let mut slot = versioned.value;
            slot.reserve(quantity)?;

            match self
                .store
                .write_if_version(key.clone(), LedgerValue::Slot(slot), Some(versioned.version))
                .await
            {
                Ok(_) => {
                    return Ok(Reservation {
                        id: ReservationId::new(),
                        slot_id: slot_id.clone(),
                        quantity,
                    })
                }
                Err(e) if e.is_conflict() => {
                    debug!(slot = %slot_id, attempt, "reserve lost version race, retrying");
                    sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::conflict(key.to_string()))
    }

    /// Release reserved capacity, idempotently per handle
    ///
    /// The release marker and the slot decrement commit in one store
    /// transaction; replaying the same handle finds the marker and becomes
    /// a no-op instead of a double release. The decrement floors at zero.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SlotNotFound`] if the slot record vanished
    /// and [`EngineError::Conflict`] once the retry budget is exhausted.
    pub async fn release(&self, reservation: &Reservation) -> Result<(), EngineError> {
        for attempt in 0..self.retry.max_attempts {
            if self.store.read_release(reservation.id).await?.is_some() {
                return Ok(());
            }

            let versioned = self
                .store
                .read_slot(&reservation.slot_id)
                .await?
                .ok_or_else(|| EngineError::slot_not_found(&reservation.slot_id))?;
            let mut slot = versioned.value;
            slot.release(reservation.quantity);

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
                    LedgerValue::Slot(slot),
                    versioned.version,
                ),
            ];

            match self.store.transact(writes).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    // Either the slot moved or another replay of this handle
                    // won; the marker check at the top of the loop decides.
                    debug!(
                        reservation = %reservation.id,
                        attempt,
                        "release lost version race, retrying"
                    );
                    sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::conflict(
            LedgerKey::Slot(reservation.slot_id.clone()).to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use crate::types::EventId;

    fn manager() -> SlotInventoryManager {
        SlotInventoryManager::new(Arc::new(MemoryLedger::new()), RetryPolicy::default())
    }

    fn slot(id: &str, capacity: u32) -> EventSlot {
        EventSlot::new(
            SlotId::from(id),
            EventId::from("event-1"),
            capacity,
            100,
            Utc::now(),
            Utc::now() + chrono::Duration::hours(2),
        )
    }

    #[tokio::test]
    async fn test_publish_then_reserve() {
        let inventory = manager();
        inventory.publish_slot(slot("slot-1", 10)).await.unwrap();

        let reservation = inventory
            .reserve(&SlotId::from("slot-1"), 4)
            .await
            .unwrap();
        assert_eq!(reservation.quantity, 4);

        let state = inventory.slot(&SlotId::from("slot-1")).await.unwrap();
        assert_eq!(state.reserved, 4);
    }

    #[tokio::test]
    async fn test_publish_zero_capacity_rejected() {
        let inventory = manager();
        let result = inventory.publish_slot(slot("slot-1", 0)).await;
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InvalidCapacity { .. }
        ));
    }

    #[tokio::test]
    async fn test_reserve_unknown_slot() {
        let inventory = manager();
        let result = inventory.reserve(&SlotId::from("missing"), 1).await;
        assert!(matches!(
            result.unwrap_err(),
            EngineError::SlotNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_reserve_past_capacity_is_terminal() {
        let inventory = manager();
        inventory.publish_slot(slot("slot-1", 10)).await.unwrap();
        inventory
            .reserve(&SlotId::from("slot-1"), 6)
            .await
            .unwrap();

        let result = inventory.reserve(&SlotId::from("slot-1"), 6).await;
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InsufficientCapacity {
                remaining: 4,
                requested: 6,
                ..
            }
        ));

        // Rejection leaves the slot untouched
        let state = inventory.slot(&SlotId::from("slot-1")).await.unwrap();
        assert_eq!(state.reserved, 6);
    }

    #[tokio::test]
    async fn test_release_returns_capacity() {
        let inventory = manager();
        inventory.publish_slot(slot("slot-1", 10)).await.unwrap();
        let reservation = inventory
            .reserve(&SlotId::from("slot-1"), 4)
            .await
            .unwrap();

        inventory.release(&reservation).await.unwrap();

        let state = inventory.slot(&SlotId::from("slot-1")).await.unwrap();
        assert_eq!(state.reserved, 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_per_handle() {
        let inventory = manager();
        inventory.publish_slot(slot("slot-1", 10)).await.unwrap();
        let first = inventory
            .reserve(&SlotId::from("slot-1"), 4)
            .await
            .unwrap();
        let second = inventory
            .reserve(&SlotId::from("slot-1"), 3)
            .await
            .unwrap();

        inventory.release(&first).await.unwrap();
        inventory.release(&first).await.unwrap();
        inventory.release(&first).await.unwrap();

        // Only the first release of the handle took effect
        let state = inventory.slot(&SlotId::from("slot-1")).await.unwrap();
        assert_eq!(state.reserved, second.quantity);
    }

    #[tokio::test]
    async fn test_retired_slot_rejects_reservations() {
        let inventory = manager();
        inventory.publish_slot(slot("slot-1", 10)).await.unwrap();
        inventory.retire_slot(&SlotId::from("slot-1")).await.unwrap();

        let result = inventory.reserve(&SlotId::from("slot-1"), 1).await;
        assert!(matches!(
            result.unwrap_err(),
            EngineError::SlotNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_oversell() {
        let inventory = manager();
        inventory.publish_slot(slot("slot-1", 10)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let inventory = inventory.clone();
            handles.push(tokio::spawn(async move {
                inventory.reserve(&SlotId::from("slot-1"), 2).await.is_ok()
            }));
        }

        let mut granted: u32 = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        let state = inventory.slot(&SlotId::from("slot-1")).await.unwrap();
        assert_eq!(state.reserved, granted * 2);
        assert!(state.reserved <= state.capacity);
    }
}
