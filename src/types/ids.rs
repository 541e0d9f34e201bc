//! Identifier types shared across the engine
//!
//! Slot, event, and card identifiers arrive from upstream as opaque strings;
//! transaction, ticket, and reservation identifiers are minted by the engine
//! as v4 UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Monetary amount in minor currency units
///
/// Balances and charges are plain unsigned integers; intent amounts arrive
/// as bounded numeric strings and are parsed at the intent boundary.
pub type Amount = u64;

/// Opaque event slot identifier, assigned when the event is published
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub String);

/// Opaque event identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Wallet account key derived from a card number
///
/// The card number is validated upstream (`####-####-####-####`); the engine
/// only normalizes it into a key and never parses it further.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(String);

impl CardId {
    /// Derive the account key from an already-validated card number
    ///
    /// Normalization strips the group separators so that the same card always
    /// maps to the same account key.
    pub fn from_card_number(card_number: &str) -> Self {
        CardId(card_number.chars().filter(|c| *c != '-').collect())
    }

    /// The normalized key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ticket owner identity, carried by the verified request token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

/// Client-supplied idempotency token
///
/// The token doubles as the verified identity handle; the engine treats it
/// as opaque and uses it only for deduplication and ticket ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyToken(pub String);

impl IdempotencyToken {
    /// Identity of the caller that presented this token
    pub fn owner(&self) -> OwnerId {
        OwnerId(self.0.clone())
    }
}

/// Unique ledger transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    /// Mint a fresh transaction identifier
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique ticket identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub Uuid);

impl TicketId {
    /// Mint a fresh ticket identifier
    pub fn new() -> Self {
        TicketId(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier for a capacity reservation handle
///
/// Release is idempotent per handle, so every successful reserve call mints
/// a fresh identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    /// Mint a fresh reservation identifier
    pub fn new() -> Self {
        ReservationId(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! display_as_inner {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_as_inner!(
    SlotId,
    EventId,
    OwnerId,
    IdempotencyToken,
    TransactionId,
    TicketId,
    ReservationId,
);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SlotId {
    fn from(value: &str) -> Self {
        SlotId(value.to_string())
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        EventId(value.to_string())
    }
}

impl From<&str> for IdempotencyToken {
    fn from(value: &str) -> Self {
        IdempotencyToken(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_id_strips_separators() {
        let card = CardId::from_card_number("1234-5678-9012-3456");
        assert_eq!(card.as_str(), "1234567890123456");
    }

    #[test]
    fn test_same_card_number_maps_to_same_key() {
        let a = CardId::from_card_number("1111-2222-3333-4444");
        let b = CardId::from_card_number("1111-2222-3333-4444");
        assert_eq!(a, b);
    }

    #[test]
    fn test_minted_identifiers_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
        assert_ne!(TicketId::new(), TicketId::new());
        assert_ne!(ReservationId::new(), ReservationId::new());
    }

    #[test]
    fn test_token_owner_carries_token_identity() {
        let token = IdempotencyToken::from("session-abc");
        assert_eq!(token.owner(), OwnerId("session-abc".to_string()));
    }
}
