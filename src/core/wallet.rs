//! Wallet account management
//!
//! Balances move only through atomic conditional writes against the ledger
//! store. A debit and a credit racing on the same card both read the current
//! version, compute the new balance, and attempt a compare-and-swap; the
//! loser re-reads and retries under the shared backoff policy, so no update
//! is ever lost.

use crate::core::retry::RetryPolicy;
use crate::store::{LedgerKey, LedgerStore, LedgerValue};
use crate::types::{Amount, CardId, EngineError, WalletAccount};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

/// Manages wallet balances through optimistic conditional writes
#[derive(Clone)]
pub struct WalletAccountManager {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

impl WalletAccountManager {
    /// Create a wallet manager over the shared ledger store
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryPolicy) -> Self {
        WalletAccountManager { store, retry }
    }

    /// Atomically add funds to a card's wallet
    ///
    /// Accounts are created lazily: crediting an unknown card creates it
    /// with the deposited amount as its opening balance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ArithmeticOverflow`] if the balance would
    /// exceed the representable range and [`EngineError::Conflict`] once the
    /// retry budget is exhausted.
    pub async fn credit(&self, card: &CardId, amount: Amount) -> Result<Amount, EngineError> {
        let key = LedgerKey::Account(card.clone());
        for attempt in 0..self.retry.max_attempts {
            let (mut account, expected) = match self.store.read_account(card).await? {
                Some(versioned) => (versioned.value, Some(versioned.version)),
                None => (WalletAccount::new(card.clone()), None),
            };
            account.credit(amount)?;
            let balance = account.balance;

            match self
                .store
                .write_if_version(key.clone(), LedgerValue::Account(account), expected)
                .await
            {
                Ok(_) => return Ok(balance),
                Err(e) if e.is_conflict() => {
                    debug!(%card, attempt, "credit lost version race, retrying");
                    sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::conflict(key.to_string()))
    }

    /// Atomically remove funds from a card's wallet
    ///
    /// The balance check and the decrement commit as one conditional write,
    /// so two racing debits can never jointly overdraw the account.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AccountNotFound`] for cards with no wallet
    /// - [`EngineError::InsufficientFunds`] if the balance cannot cover it
    /// - [`EngineError::Conflict`] once the retry budget is exhausted
    pub async fn debit(&self, card: &CardId, amount: Amount) -> Result<Amount, EngineError> {
        let key = LedgerKey::Account(card.clone());
        for attempt in 0..self.retry.max_attempts {
            let versioned = self
                .store
                .read_account(card)
                .await?
                .ok_or_else(|| EngineError::account_not_found(card))?;

            let mut account = versioned.value;
            account.debit(amount)?;
            let balance = account.balance;

            match self
                .store
                .write_if_version(
                    key.clone(),
                    LedgerValue::Account(account),
                    Some(versioned.version),
                )
                .await
            {
                Ok(_) => return Ok(balance),
                Err(e) if e.is_conflict() => {
                    debug!(%card, attempt, "debit lost version race, retrying");
                    sleep(self.retry.delay_for_attempt(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::conflict(key.to_string()))
    }

    /// Current balance of a card's wallet
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountNotFound`] for cards with no wallet.
    pub async fn balance(&self, card: &CardId) -> Result<Amount, EngineError> {
        self.store
            .read_account(card)
            .await?
            .map(|versioned| versioned.value.balance)
            .ok_or_else(|| EngineError::account_not_found(card))
    }
}
