//! Wallet account state
//!
//! One account per card key, created lazily by the first deposit. The
//! balance is an unsigned integer in minor currency units, so a committed
//! negative balance is unrepresentable; the debit check keeps rejected
//! operations from touching the record at all. Optimistic versioning lives
//! in the store envelope, not in the record itself.

use crate::types::error::EngineError;
use crate::types::ids::{Amount, CardId};
use serde::{Deserialize, Serialize};

/// Card-backed wallet account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    /// Normalized card key, unique per account
    pub card_id: CardId,

    /// Current balance in minor currency units
    pub balance: Amount,
}

impl WalletAccount {
    /// Create an empty account for a card
    pub fn new(card_id: CardId) -> Self {
        WalletAccount {
            card_id,
            balance: 0,
        }
    }

    /// Add funds, returning the new balance
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ArithmeticOverflow`] if the balance would
    /// overflow; the account is left unchanged.
    pub fn credit(&mut self, amount: Amount) -> Result<Amount, EngineError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| EngineError::arithmetic_overflow("credit", &self.card_id))?;
        Ok(self.balance)
    }

    /// Remove funds, returning the new balance
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientFunds`] if the balance does not
    /// cover the amount; the account is left unchanged.
    pub fn debit(&mut self, amount: Amount) -> Result<Amount, EngineError> {
        if self.balance < amount {
            return Err(EngineError::insufficient_funds(
                &self.card_id,
                self.balance,
                amount,
            ));
        }
        self.balance -= amount;
        Ok(self.balance)
    }
}
