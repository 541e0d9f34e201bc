//! Event slot state
//!
//! A slot is a time-bounded allocation of an event with finite ticket
//! capacity. `reserved` only ever moves through the reserve and release
//! operations; the invariant `reserved <= capacity` is checked on every
//! mutation and enforced globally by the store's conditional writes.

use crate::types::error::EngineError;
use crate::types::ids::{Amount, EventId, SlotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finite-capacity slot of a published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSlot {
    /// Unique slot identifier
    pub id: SlotId,

    /// Event this slot belongs to
    pub event_id: EventId,

    /// Maximum admissions; positive and immutable after publication
    pub capacity: u32,

    /// Admissions currently reserved; never exceeds `capacity`
    pub reserved: u32,

    /// Per-ticket price in minor currency units
    pub price: Amount,

    /// Slot start time
    pub start_time: DateTime<Utc>,

    /// Slot end time
    pub end_time: DateTime<Utc>,

    /// Soft-retire flag; retired slots reject new reservations but keep
    /// their record while tickets reference them
    pub retired: bool,
}

impl EventSlot {
    /// Create a slot for a newly published event
    pub fn new(
        id: SlotId,
        event_id: EventId,
        capacity: u32,
        price: Amount,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        EventSlot {
            id,
            event_id,
            capacity,
            reserved: 0,
            price,
            start_time,
            end_time,
            retired: false,
        }
    }

    /// Admissions still available for reservation
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.reserved)
    }

    /// Increment `reserved`, rejecting anything past capacity
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientCapacity`] if `quantity` exceeds
    /// the remaining capacity; the slot is left unchanged.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), EngineError> {
        if quantity > self.remaining() {
            return Err(EngineError::insufficient_capacity(
                &self.id,
                self.remaining(),
                quantity,
            ));
        }
        self.reserved += quantity;
        Ok(())
    }

    /// Decrement `reserved`, floored at zero
    pub fn release(&mut self, quantity: u32) {
        self.reserved = self.reserved.saturating_sub(quantity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(capacity: u32) -> EventSlot {
        EventSlot::new(
            SlotId::from("slot-1"),
            EventId::from("event-1"),
            capacity,
            100,
            Utc::now(),
            Utc::now() + chrono::Duration::hours(2),
        )
    }

    #[test]
    fn test_new_slot_has_no_reservations() {
        let s = slot(10);
        assert_eq!(s.reserved, 0);
        assert_eq!(s.remaining(), 10);
        assert!(!s.retired);
    }

    #[test]
    fn test_reserve_up_to_capacity() {
        let mut s = slot(10);
        s.reserve(6).unwrap();
        s.reserve(4).unwrap();
        assert_eq!(s.reserved, 10);
        assert_eq!(s.remaining(), 0);
    }

    #[test]
    fn test_reserve_past_capacity_is_rejected() {
        let mut s = slot(10);
        s.reserve(6).unwrap();

        let result = s.reserve(6);
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InsufficientCapacity {
                remaining: 4,
                requested: 6,
                ..
            }
        ));
        // No side effect on rejection
        assert_eq!(s.reserved, 6);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut s = slot(10);
        s.reserve(3).unwrap();
        s.release(5);
        assert_eq!(s.reserved, 0);
    }
}
