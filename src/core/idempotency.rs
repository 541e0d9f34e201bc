//! Idempotency registry
//!
//! The registry is the single point preventing double-charging or
//! double-ticketing on client retries. The first execution of a token wins
//! a create-only write of an in-flight marker; every later arrival of the
//! same token either replays the stored terminal result or learns that the
//! original execution is still running.

use crate::store::{LedgerKey, LedgerStore, LedgerValue, LedgerWrite};
use crate::types::{
    EngineError, IdempotencyEntry, IdempotencyState, IdempotencyToken, OperationResult,
};
use std::sync::Arc;
use tracing::warn;

/// Outcome of claiming a token for execution
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// Token unseen; the caller now owns its execution
    New,

    /// First execution still running; the caller must not re-execute
    InFlight,

    /// Token already resolved; replay this result instead of executing
    Completed(OperationResult),
}

/// Deduplicates operations by idempotency token
///
/// Backed by the ledger store's create-only writes, so first-writer-wins
/// holds across engine instances sharing one store.
#[derive(Clone)]
pub struct IdempotencyRegistry {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyRegistry {
    /// Create a registry over the shared ledger store
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        IdempotencyRegistry { store }
    }

    /// Atomically claim a token, or learn how it already resolved
    ///
    /// Inserts an in-flight marker with a create-only write. If the insert
    /// conflicts, the stored entry decides: a terminal entry is replayed,
    /// an in-flight entry signals a concurrent duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on storage faults or if a conflicting
    /// entry vanishes between the insert and the follow-up read.
    pub async fn begin(&self, token: &IdempotencyToken) -> Result<BeginOutcome, EngineError> {
        let entry = IdempotencyEntry::in_flight(token.clone());
        let insert = self
            .store
            .write_if_version(
                LedgerKey::Idempotency(token.clone()),
                LedgerValue::Idempotency(entry),
                None,
            )
            .await;

        match insert {
            Ok(_) => Ok(BeginOutcome::New),
            Err(EngineError::Conflict { .. }) => {
                let existing = self.store.read_idempotency(token).await?.ok_or_else(|| {
                    EngineError::store(format!("idempotency entry for {token} disappeared"))
                })?;
                match existing.value.state {
                    IdempotencyState::InFlight => Ok(BeginOutcome::InFlight),
                    IdempotencyState::Done(result) => Ok(BeginOutcome::Completed(result)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Record the terminal result for a claimed token
    ///
    /// Only the execution that won `begin` calls this, so the conditional
    /// write is expected to succeed on the first try. A conflict here means
    /// the entry was mutated by someone else and is logged as an invariant
    /// violation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the entry is missing and
    /// propagates storage faults.
    pub async fn complete(
        &self,
        token: &IdempotencyToken,
        result: OperationResult,
    ) -> Result<(), EngineError> {
        let existing = self.store.read_idempotency(token).await?.ok_or_else(|| {
            EngineError::store(format!("completing unknown idempotency token {token}"))
        })?;

        let mut entry = existing.value;
        entry.state = IdempotencyState::Done(result);

        let write = self
            .store
            .write_if_version(
                LedgerKey::Idempotency(token.clone()),
                LedgerValue::Idempotency(entry),
                Some(existing.version),
            )
            .await;

        if let Err(ref e) = write {
            warn!(%token, error = %e, "failed to record idempotency result");
        }
        write.map(|_| ())
    }

    /// Release an unresolved claim so the token can execute again
    ///
    /// Called when an execution surfaced a transient error without applying
    /// any side effects; recording such an error as terminal would replay it
    /// forever. A claim that already resolved is left untouched, and an
    /// absent claim is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates storage faults; the claim then stays in flight.
    pub async fn abandon(&self, token: &IdempotencyToken) -> Result<(), EngineError> {
        let existing = match self.store.read_idempotency(token).await? {
            Some(existing) => existing,
            None => return Ok(()),
        };
        if matches!(existing.value.state, IdempotencyState::Done(_)) {
            return Ok(());
        }
        self.store
            .transact(vec![LedgerWrite::delete(
                LedgerKey::Idempotency(token.clone()),
                existing.version,
            )])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use crate::types::{OperationOutcome, PurchaseReceipt};

    fn registry() -> IdempotencyRegistry {
        IdempotencyRegistry::new(Arc::new(MemoryLedger::new()))
    }

    fn purchase_result() -> OperationResult {
        Ok(OperationOutcome::Purchase(PurchaseReceipt {
            message: "Ticket purchased successfully".to_string(),
            ticket_url: Some("https://tickets.example.com/tickets/abc".to_string()),
        }))
    }

    #[tokio::test]
    async fn test_first_begin_claims_token() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-1");

        assert_eq!(registry.begin(&token).await.unwrap(), BeginOutcome::New);
    }

    #[tokio::test]
    async fn test_second_begin_sees_in_flight() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-1");

        registry.begin(&token).await.unwrap();
        assert_eq!(
            registry.begin(&token).await.unwrap(),
            BeginOutcome::InFlight
        );
    }

    #[tokio::test]
    async fn test_begin_after_complete_replays_result() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-1");

        registry.begin(&token).await.unwrap();
        registry.complete(&token, purchase_result()).await.unwrap();

        match registry.begin(&token).await.unwrap() {
            BeginOutcome::Completed(result) => assert_eq!(result, purchase_result()),
            other => panic!("expected replayed result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_results_are_replayed_too() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-1");
        let failure: OperationResult = Err(EngineError::deadline_exceeded("purchase"));

        registry.begin(&token).await.unwrap();
        registry.complete(&token, failure.clone()).await.unwrap();

        match registry.begin(&token).await.unwrap() {
            BeginOutcome::Completed(result) => assert_eq!(result, failure),
            other => panic!("expected replayed failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_unknown_token_is_an_error() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-unknown");

        let result = registry.complete(&token, purchase_result()).await;
        assert!(matches!(result.unwrap_err(), EngineError::Store { .. }));
    }

    #[tokio::test]
    async fn test_abandon_reopens_token_for_execution() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-1");

        registry.begin(&token).await.unwrap();
        registry.abandon(&token).await.unwrap();

        assert_eq!(registry.begin(&token).await.unwrap(), BeginOutcome::New);
    }

    #[tokio::test]
    async fn test_abandon_keeps_resolved_results() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-1");

        registry.begin(&token).await.unwrap();
        registry.complete(&token, purchase_result()).await.unwrap();
        registry.abandon(&token).await.unwrap();

        match registry.begin(&token).await.unwrap() {
            BeginOutcome::Completed(result) => assert_eq!(result, purchase_result()),
            other => panic!("expected replayed result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abandon_of_unknown_token_is_a_no_op() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-unknown");

        registry.abandon(&token).await.unwrap();
        assert_eq!(registry.begin(&token).await.unwrap(), BeginOutcome::New);
    }

    #[tokio::test]
    async fn test_concurrent_begin_admits_one_owner() {
        let registry = registry();
        let token = IdempotencyToken::from("tok-race");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                registry.begin(&token).await.unwrap()
            }));
        }

        let mut owners = 0;
        for handle in handles {
            if handle.await.unwrap() == BeginOutcome::New {
                owners += 1;
            }
        }
        assert_eq!(owners, 1);
    }
}
