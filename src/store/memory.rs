//! In-memory ledger adapter
//!
//! `MemoryLedger` keeps versioned records in a `DashMap` so reads are
//! lock-free. All writes funnel through a single commit mutex: that is what
//! makes `transact` all-or-nothing, since verifying every precondition and
//! applying every write happens with no other writer interleaved. Per-key
//! versions still do the heavy lifting for optimistic concurrency; the
//! mutex only serializes the commit step itself.

use crate::store::{LedgerKey, LedgerStore, LedgerValue, LedgerWrite, Version, Versioned};
use crate::types::{EngineError, Transaction};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

/// In-memory transactional key-value store with compare-and-swap writes
#[derive(Debug, Default)]
pub struct MemoryLedger {
    /// Versioned records, readable without locking
    records: DashMap<LedgerKey, Versioned<LedgerValue>>,

    /// Serializes all writes so multi-key transactions commit atomically
    commit_lock: Mutex<()>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify one write's precondition against the current records
    fn check(&self, write: &LedgerWrite) -> Result<(), EngineError> {
        let current = self.records.get(&write.key).map(|entry| entry.version);
        match (write.expected, current) {
            // Create: key must not exist
            (None, None) => Ok(()),
            // Update or delete: version must match exactly
            (Some(expected), Some(version)) if expected == version => Ok(()),
            _ => Err(EngineError::conflict(write.key.to_string())),
        }
    }

    /// Apply one verified write
    fn apply(&self, write: LedgerWrite) {
        match write.value {
            Some(value) => {
                let next = write.expected.unwrap_or(0) + 1;
                self.records.insert(write.key, Versioned::new(value, next));
            }
            None => {
                self.records.remove(&write.key);
            }
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn read(&self, key: &LedgerKey) -> Result<Option<Versioned<LedgerValue>>, EngineError> {
        Ok(self.records.get(key).map(|entry| entry.clone()))
    }

    async fn write_if_version(
        &self,
        key: LedgerKey,
        value: LedgerValue,
        expected: Option<Version>,
    ) -> Result<Version, EngineError> {
        let _guard = self.commit_lock.lock().await;
        let write = LedgerWrite {
            key,
            value: Some(value),
            expected,
        };
        self.check(&write)?;
        let next = expected.unwrap_or(0) + 1;
        self.apply(write);
        Ok(next)
    }

    async fn transact(&self, writes: Vec<LedgerWrite>) -> Result<(), EngineError> {
        let _guard = self.commit_lock.lock().await;
        // Verify everything first so a late conflict cannot leave the batch
        // half applied. A repeated key would make the version checks lie
        // about the later writes, so such batches are rejected outright.
        for (index, write) in writes.iter().enumerate() {
            if writes[..index].iter().any(|earlier| earlier.key == write.key) {
                return Err(EngineError::store(format!(
                    "key {} appears more than once in a transaction batch",
                    write.key
                )));
            }
            self.check(write)?;
        }
        for write in writes {
            self.apply(write);
        }
        Ok(())
    }

    async fn scan_transactions(&self) -> Result<Vec<Transaction>, EngineError> {
        Ok(self
            .records
            .iter()
            .filter_map(|entry| match &entry.value().value {
                LedgerValue::Transaction(txn) => Some(txn.clone()),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CardId, WalletAccount};

    fn account_key(card: &str) -> LedgerKey {
        LedgerKey::Account(CardId::from_card_number(card))
    }

    fn account_value(card: &str, balance: u64) -> LedgerValue {
        let mut account = WalletAccount::new(CardId::from_card_number(card));
        account.balance = balance;
        LedgerValue::Account(account)
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let ledger = MemoryLedger::new();
        let key = account_key("1111-2222-3333-4444");

        let version = ledger
            .write_if_version(key.clone(), account_value("1111-2222-3333-4444", 100), None)
            .await
            .unwrap();
        assert_eq!(version, 1);

        let read = ledger.read(&key).await.unwrap().unwrap();
        assert_eq!(read.version, 1);
        assert_eq!(read.value, account_value("1111-2222-3333-4444", 100));
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let ledger = MemoryLedger::new();
        let key = account_key("1111-2222-3333-4444");
        let value = account_value("1111-2222-3333-4444", 100);

        ledger
            .write_if_version(key.clone(), value.clone(), None)
            .await
            .unwrap();

        let result = ledger.write_if_version(key, value, None).await;
        assert!(matches!(result.unwrap_err(), EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_cas_with_stale_version_conflicts() {
        let ledger = MemoryLedger::new();
        let key = account_key("1111-2222-3333-4444");

        ledger
            .write_if_version(key.clone(), account_value("1111-2222-3333-4444", 100), None)
            .await
            .unwrap();
        ledger
            .write_if_version(
                key.clone(),
                account_value("1111-2222-3333-4444", 200),
                Some(1),
            )
            .await
            .unwrap();

        // Writer still holding version 1 must lose
        let result = ledger
            .write_if_version(key, account_value("1111-2222-3333-4444", 300), Some(1))
            .await;
        assert!(matches!(result.unwrap_err(), EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_versions_increment_monotonically() {
        let ledger = MemoryLedger::new();
        let key = account_key("1111-2222-3333-4444");

        let v1 = ledger
            .write_if_version(key.clone(), account_value("1111-2222-3333-4444", 1), None)
            .await
            .unwrap();
        let v2 = ledger
            .write_if_version(
                key.clone(),
                account_value("1111-2222-3333-4444", 2),
                Some(v1),
            )
            .await
            .unwrap();
        let v3 = ledger
            .write_if_version(key, account_value("1111-2222-3333-4444", 3), Some(v2))
            .await
            .unwrap();

        assert_eq!((v1, v2, v3), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_transact_applies_all_writes() {
        let ledger = MemoryLedger::new();
        let key_a = account_key("1111-1111-1111-1111");
        let key_b = account_key("2222-2222-2222-2222");

        ledger
            .transact(vec![
                LedgerWrite::create(key_a.clone(), account_value("1111-1111-1111-1111", 10)),
                LedgerWrite::create(key_b.clone(), account_value("2222-2222-2222-2222", 20)),
            ])
            .await
            .unwrap();

        assert!(ledger.read(&key_a).await.unwrap().is_some());
        assert!(ledger.read(&key_b).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transact_is_all_or_nothing() {
        let ledger = MemoryLedger::new();
        let key_a = account_key("1111-1111-1111-1111");
        let key_b = account_key("2222-2222-2222-2222");

        ledger
            .write_if_version(key_b.clone(), account_value("2222-2222-2222-2222", 20), None)
            .await
            .unwrap();

        // Second write conflicts (key exists), so the first must not land
        let result = ledger
            .transact(vec![
                LedgerWrite::create(key_a.clone(), account_value("1111-1111-1111-1111", 10)),
                LedgerWrite::create(key_b, account_value("2222-2222-2222-2222", 99)),
            ])
            .await;

        assert!(matches!(result.unwrap_err(), EngineError::Conflict { .. }));
        assert!(ledger.read(&key_a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transact_rejects_repeated_keys() {
        let ledger = MemoryLedger::new();
        let key = account_key("1111-2222-3333-4444");

        let result = ledger
            .transact(vec![
                LedgerWrite::create(key.clone(), account_value("1111-2222-3333-4444", 10)),
                LedgerWrite::create(key.clone(), account_value("1111-2222-3333-4444", 20)),
            ])
            .await;

        assert!(matches!(result.unwrap_err(), EngineError::Store { .. }));
        assert!(ledger.read(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transact_delete_removes_record() {
        let ledger = MemoryLedger::new();
        let key = account_key("1111-2222-3333-4444");

        let version = ledger
            .write_if_version(key.clone(), account_value("1111-2222-3333-4444", 10), None)
            .await
            .unwrap();
        ledger
            .transact(vec![LedgerWrite::delete(key.clone(), version)])
            .await
            .unwrap();

        assert!(ledger.read(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_cas_admits_exactly_one_winner() {
        use std::sync::Arc;

        let ledger = Arc::new(MemoryLedger::new());
        let key = account_key("1111-2222-3333-4444");
        ledger
            .write_if_version(key.clone(), account_value("1111-2222-3333-4444", 0), None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let ledger = Arc::clone(&ledger);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .write_if_version(key, account_value("1111-2222-3333-4444", i), Some(1))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_scan_transactions_filters_other_records() {
        use crate::types::{IdempotencyToken, Transaction, TransactionKind};

        let ledger = MemoryLedger::new();
        ledger
            .write_if_version(
                account_key("1111-2222-3333-4444"),
                account_value("1111-2222-3333-4444", 10),
                None,
            )
            .await
            .unwrap();

        let txn = Transaction::pending(
            TransactionKind::Deposit,
            CardId::from_card_number("1111-2222-3333-4444"),
            100,
            IdempotencyToken::from("tok-1"),
        );
        ledger
            .write_if_version(
                LedgerKey::Transaction(txn.id),
                LedgerValue::Transaction(txn.clone()),
                None,
            )
            .await
            .unwrap();

        let scanned = ledger.scan_transactions().await.unwrap();
        assert_eq!(scanned, vec![txn]);
    }
}
