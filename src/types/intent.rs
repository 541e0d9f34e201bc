//! Validated operation intents
//!
//! Intents are the engine's inbound contract: the HTTP layer validates the
//! raw request schemas and hands over amount strings, card numbers, and
//! quantities that already satisfy the upstream rules. The constructors
//! re-check the bounded contracts anyway, so a misconfigured caller cannot
//! push an out-of-range value into the managers.

use crate::types::error::EngineError;
use crate::types::ids::{Amount, CardId, IdempotencyToken, SlotId, TransactionId};

/// Maximum tickets per purchase, inherited from the intent schema
pub const MAX_PURCHASE_QUANTITY: u32 = 15;

/// Parse a bounded amount string (2 to 4 digits) into minor units
fn parse_amount(raw: &str) -> Result<Amount, EngineError> {
    let valid = (2..=4).contains(&raw.len()) && raw.bytes().all(|b| b.is_ascii_digit());
    if !valid {
        return Err(EngineError::invalid_amount(raw));
    }
    raw.parse::<Amount>()
        .map_err(|_| EngineError::invalid_amount(raw))
}

/// Intent to credit a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositIntent {
    /// Idempotency and identity token
    pub token: IdempotencyToken,

    /// Account key derived from the validated card number
    pub card_id: CardId,

    /// Amount to credit, in minor units
    pub amount: Amount,
}

impl DepositIntent {
    /// Build a deposit intent from pre-validated request fields
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidAmount`] if the amount string is not
    /// 2 to 4 digits.
    pub fn new(token: &str, card_number: &str, amount: &str) -> Result<Self, EngineError> {
        Ok(DepositIntent {
            token: IdempotencyToken::from(token),
            card_id: CardId::from_card_number(card_number),
            amount: parse_amount(amount)?,
        })
    }
}

/// Intent to debit a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawIntent {
    /// Idempotency and identity token
    pub token: IdempotencyToken,

    /// Account key derived from the validated card number
    pub card_id: CardId,

    /// Amount to debit, in minor units
    pub amount: Amount,
}

impl WithdrawIntent {
    /// Build a withdrawal intent from pre-validated request fields
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidAmount`] if the amount string is not
    /// 2 to 4 digits.
    pub fn new(token: &str, card_number: &str, amount: &str) -> Result<Self, EngineError> {
        Ok(WithdrawIntent {
            token: IdempotencyToken::from(token),
            card_id: CardId::from_card_number(card_number),
            amount: parse_amount(amount)?,
        })
    }
}

/// Intent to purchase tickets for an event slot
///
/// The charge is not part of the intent; the orchestrator computes it from
/// the slot's per-ticket price and the quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseIntent {
    /// Idempotency and identity token
    pub token: IdempotencyToken,

    /// Account key derived from the validated card number
    pub card_id: CardId,

    /// Slot to purchase admissions for
    pub event_slot_id: SlotId,

    /// Number of admissions, 1..=15
    pub quantity: u32,
}

impl PurchaseIntent {
    /// Build a purchase intent from pre-validated request fields
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuantity`] if the quantity is zero or
    /// above [`MAX_PURCHASE_QUANTITY`].
    pub fn new(
        token: &str,
        card_number: &str,
        event_slot_id: &str,
        quantity: u32,
    ) -> Result<Self, EngineError> {
        if quantity == 0 || quantity > MAX_PURCHASE_QUANTITY {
            return Err(EngineError::invalid_quantity(quantity));
        }
        Ok(PurchaseIntent {
            token: IdempotencyToken::from(token),
            card_id: CardId::from_card_number(card_number),
            event_slot_id: SlotId::from(event_slot_id),
            quantity,
        })
    }
}

/// Intent to refund a committed ticket purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundIntent {
    /// Idempotency and identity token for the refund itself
    pub token: IdempotencyToken,

    /// The purchase transaction to reverse
    pub transaction_id: TransactionId,
}

impl RefundIntent {
    /// Build a refund intent
    pub fn new(token: &str, transaction_id: TransactionId) -> Self {
        RefundIntent {
            token: IdempotencyToken::from(token),
            transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::two_digits("10", 10)]
    #[case::three_digits("500", 500)]
    #[case::four_digits("9999", 9999)]
    fn test_valid_amounts(#[case] raw: &str, #[case] expected: Amount) {
        let intent = DepositIntent::new("tok", "1234-5678-9012-3456", raw).unwrap();
        assert_eq!(intent.amount, expected);
    }

    #[rstest]
    #[case::one_digit("7")]
    #[case::five_digits("10000")]
    #[case::empty("")]
    #[case::non_numeric("12a")]
    #[case::negative("-50")]
    fn test_invalid_amounts(#[case] raw: &str) {
        let result = WithdrawIntent::new("tok", "1234-5678-9012-3456", raw);
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InvalidAmount { .. }
        ));
    }

    #[rstest]
    #[case::minimum(1)]
    #[case::maximum(15)]
    fn test_valid_quantities(#[case] quantity: u32) {
        let intent = PurchaseIntent::new("tok", "1234-5678-9012-3456", "slot-1", quantity);
        assert!(intent.is_ok());
    }

    #[rstest]
    #[case::zero(0)]
    #[case::above_maximum(16)]
    fn test_invalid_quantities(#[case] quantity: u32) {
        let result = PurchaseIntent::new("tok", "1234-5678-9012-3456", "slot-1", quantity);
        assert!(matches!(
            result.unwrap_err(),
            EngineError::InvalidQuantity { .. }
        ));
    }

    #[test]
    fn test_card_key_is_normalized() {
        let intent = DepositIntent::new("tok", "1111-2222-3333-4444", "100").unwrap();
        assert_eq!(intent.card_id.as_str(), "1111222233334444");
    }
}
