//! Stock ledger engine (application-level orchestration).
//!
//! Every mutating call runs the same unit of work:
//!
//! ```text
//! StockOperation
//!   ↓
//! 1. Load the ledger and its version from the store (absent is allowed)
//!   ↓
//! 2. Decide: StockLedger::decide produces the next state + one audit record (pure)
//!   ↓
//! 3. Commit state and record together, conditional on the version read in step 1
//!   ↓
//! 4. On a version conflict, start over from step 1 (bounded by EngineConfig)
//! ```
//!
//! Rule violations are detected in step 2, before anything is written. Store failures
//! other than a version conflict are returned immediately and never retried.
//!
//! This module contains no IO itself; it composes the store traits.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

use stockledger_core::{ExpectedVersion, ProductCode};
use stockledger_inventory::{OperationKind, StockLedger, StockOperation, StockOperationRequest};

use crate::config::EngineConfig;
use crate::error::StockError;
use crate::store::{CommittedChange, LedgerChange, StockStore, StoreError, Versioned};

/// Entry point for every stock mutation.
///
/// ## Execution Guarantees
///
/// - **Atomicity**: the ledger write and its transaction record are one store commit
/// - **Isolation**: a commit only lands if the ledger is still at the version that was read
/// - **Bounded retries**: at most `max_commit_attempts` commits per call
///
/// The engine holds no lock and no cached state, so it can be shared freely across tasks
/// (wrap it in an `Arc`) and any number of engines may point at the same store.
#[derive(Debug, Clone)]
pub struct StockLedgerEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S> StockLedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> StockLedgerEngine<S>
where
    S: StockStore,
{
    /// Record goods arriving. Opens the ledger if this product has never been seen.
    pub async fn add_incoming(
        &self,
        product_code: &str,
        quantity: Decimal,
        reference_number: Option<String>,
        performed_by: Option<String>,
    ) -> Result<Versioned<StockLedger>, StockError> {
        self.call(OperationKind::Incoming, product_code, quantity, reference_number, performed_by)
            .await
    }

    /// Hold `quantity` of the available stock.
    pub async fn reserve(
        &self,
        product_code: &str,
        quantity: Decimal,
        reference_number: Option<String>,
        performed_by: Option<String>,
    ) -> Result<Versioned<StockLedger>, StockError> {
        self.call(OperationKind::Reserve, product_code, quantity, reference_number, performed_by)
            .await
    }

    /// Give back part of a reservation.
    pub async fn release(
        &self,
        product_code: &str,
        quantity: Decimal,
        reference_number: Option<String>,
        performed_by: Option<String>,
    ) -> Result<Versioned<StockLedger>, StockError> {
        self.call(OperationKind::Release, product_code, quantity, reference_number, performed_by)
            .await
    }

    /// Ship reserved stock out; reduces both reserved and current stock.
    pub async fn dispatch(
        &self,
        product_code: &str,
        quantity: Decimal,
        reference_number: Option<String>,
        performed_by: Option<String>,
    ) -> Result<Versioned<StockLedger>, StockError> {
        self.call(OperationKind::Dispatch, product_code, quantity, reference_number, performed_by)
            .await
    }

    /// Current ledger for a product, if any. Never writes.
    pub async fn get_by_product_code(
        &self,
        product_code: &str,
    ) -> Result<Option<Versioned<StockLedger>>, StockError> {
        let code = ProductCode::parse(product_code)?;
        Ok(self.store.get(&code).await?)
    }

    /// Validate a raw request (quantity, notes, ...) and run it.
    pub async fn apply(
        &self,
        kind: OperationKind,
        product_code: &str,
        request: StockOperationRequest,
    ) -> Result<CommittedChange, StockError> {
        let operation = request.into_operation(kind, product_code)?;
        self.execute(operation).await
    }

    /// Run one validated operation through the load/decide/commit cycle.
    #[instrument(
        skip(self, operation),
        fields(
            product_code = %operation.product_code,
            operation = %operation.kind,
            quantity = %operation.quantity
        )
    )]
    pub async fn execute(&self, operation: StockOperation) -> Result<CommittedChange, StockError> {
        let attempts = self.config.max_commit_attempts.max(1);

        for attempt in 1..=attempts {
            debug!(attempt, "loading stock ledger");
            let current = self.store.get(&operation.product_code).await?;

            let (state, expected) = match &current {
                Some(stored) => (Some(&stored.value), stored.expected()),
                None => (None, ExpectedVersion::Absent),
            };

            let movement = StockLedger::decide(state, &operation, Utc::now())?;
            let change = LedgerChange {
                ledger: movement.ledger,
                expected,
                transaction: movement.transaction,
            };

            match self.store.commit(change).await {
                Ok(committed) => {
                    info!(
                        attempt,
                        version = %committed.ledger.version,
                        transaction_id = %committed.transaction.id,
                        "stock operation committed"
                    );
                    return Ok(committed);
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(attempt, %reason, "stock ledger changed concurrently; retrying");
                }
                Err(err) => {
                    error!(attempt, error = %err, "stock store rejected commit");
                    return Err(StockError::StoreUnavailable(err));
                }
            }
        }

        error!(attempts, "stock operation exhausted its commit attempts");
        Err(StockError::ConcurrencyExhausted {
            product_code: operation.product_code,
            attempts,
        })
    }

    async fn call(
        &self,
        kind: OperationKind,
        product_code: &str,
        quantity: Decimal,
        reference_number: Option<String>,
        performed_by: Option<String>,
    ) -> Result<Versioned<StockLedger>, StockError> {
        let request = StockOperationRequest {
            quantity: Some(quantity),
            reference_number,
            performed_by,
            notes: None,
        };
        Ok(self.apply(kind, product_code, request).await?.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockErrorKind;
    use crate::store::{InMemoryStockStore, LedgerStore, TransactionLog};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use stockledger_inventory::{NewTransaction, StockTransaction, TransactionType};

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    /// In-memory store whose commits can be scripted to conflict or fail.
    #[derive(Default)]
    struct ScriptedStore {
        inner: InMemoryStockStore,
        conflicts_left: AtomicU32,
        fail_commits: bool,
        gets: AtomicU32,
        commits: AtomicU32,
    }

    impl ScriptedStore {
        fn conflicting(times: u32) -> Self {
            Self {
                conflicts_left: AtomicU32::new(times),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail_commits: true,
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl LedgerStore for ScriptedStore {
        async fn get(
            &self,
            product_code: &ProductCode,
        ) -> Result<Option<Versioned<StockLedger>>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(product_code).await
        }

        async fn create(&self, ledger: StockLedger) -> Result<Versioned<StockLedger>, StoreError> {
            self.inner.create(ledger).await
        }

        async fn commit(&self, change: LedgerChange) -> Result<CommittedChange, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if self.fail_commits {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            let conflict = self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if conflict {
                return Err(StoreError::Conflict("scripted".into()));
            }
            self.inner.commit(change).await
        }

        async fn list_all(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
            self.inner.list_all().await
        }

        async fn search(&self, query: &str) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
            self.inner.search(query).await
        }

        async fn list_low_stock(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
            self.inner.list_low_stock().await
        }
    }

    #[async_trait::async_trait]
    impl TransactionLog for ScriptedStore {
        async fn append(&self, transaction: NewTransaction) -> Result<StockTransaction, StoreError> {
            self.inner.append(transaction).await
        }

        async fn list_by_product_code(
            &self,
            product_code: &ProductCode,
        ) -> Result<Vec<StockTransaction>, StoreError> {
            self.inner.list_by_product_code(product_code).await
        }
    }

    fn engine(store: ScriptedStore, attempts: u32) -> StockLedgerEngine<Arc<ScriptedStore>> {
        StockLedgerEngine::with_config(
            Arc::new(store),
            EngineConfig::default().with_max_commit_attempts(attempts),
        )
    }

    #[tokio::test]
    async fn endless_conflicts_exhaust_the_retry_budget() {
        let engine = engine(ScriptedStore::conflicting(u32::MAX), 3);

        let err = engine.add_incoming("SKU1", dec(5), None, None).await.unwrap_err();
        assert!(matches!(err, StockError::ConcurrencyExhausted { attempts: 3, .. }));
        assert_eq!(err.kind(), StockErrorKind::ConcurrencyExhausted);
        assert_eq!(engine.store().commits.load(Ordering::SeqCst), 3);
        assert_eq!(engine.store().inner.transaction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn transient_conflicts_are_retried_until_commit() {
        let engine = engine(ScriptedStore::conflicting(2), 5);

        let ledger = engine.add_incoming("SKU1", dec(5), None, None).await.unwrap();
        assert_eq!(ledger.value.current_stock(), dec(5));
        assert_eq!(engine.store().commits.load(Ordering::SeqCst), 3);
        assert_eq!(engine.store().gets.load(Ordering::SeqCst), 3);
        assert_eq!(engine.store().inner.transaction_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn store_failures_are_not_retried() {
        let engine = engine(ScriptedStore::failing(), 5);

        let err = engine.add_incoming("SKU1", dec(5), None, None).await.unwrap_err();
        assert_eq!(err.kind(), StockErrorKind::StoreUnavailable);
        assert_eq!(engine.store().commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let engine = engine(ScriptedStore::default(), 5);

        let err = engine.reserve("SKU1", dec(0), None, None).await.unwrap_err();
        assert_eq!(err.kind(), StockErrorKind::InvalidQuantity);

        let err = engine.reserve("SKU1", dec(-4), None, None).await.unwrap_err();
        assert_eq!(err.kind(), StockErrorKind::InvalidQuantity);

        let err = engine.add_incoming("  ", dec(1), None, None).await.unwrap_err();
        assert_eq!(err.kind(), StockErrorKind::InvalidProductCode);

        assert_eq!(engine.store().gets.load(Ordering::SeqCst), 0);
        assert_eq!(engine.store().commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rule_violations_write_nothing() {
        let engine = engine(ScriptedStore::default(), 5);
        engine.add_incoming("SKU1", dec(10), None, None).await.unwrap();

        let err = engine.reserve("SKU1", dec(11), None, None).await.unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientAvailable { ref requested, ref available, .. }
                if *requested == dec(11) && *available == dec(10)
        ));
        assert_eq!(engine.store().commits.load(Ordering::SeqCst), 1);
        assert_eq!(engine.store().inner.transaction_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn records_carry_request_metadata_and_notes() {
        let engine = engine(ScriptedStore::default(), 5);
        engine
            .add_incoming("SKU1", dec(10), Some("PO-7".into()), Some("alice".into()))
            .await
            .unwrap();
        let committed = engine
            .apply(
                OperationKind::Reserve,
                "SKU1",
                StockOperationRequest {
                    quantity: Some(dec(4)),
                    notes: Some("order 55".into()),
                    ..StockOperationRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(committed.transaction.transaction_type, TransactionType::Reserve);
        assert_eq!(committed.transaction.notes.as_deref(), Some("order 55"));
        assert_eq!(committed.transaction.balance_after, dec(4));

        let history = engine
            .store()
            .list_by_product_code(&ProductCode::parse("SKU1").unwrap())
            .await
            .unwrap();
        assert_eq!(history[0].reference_number.as_deref(), Some("PO-7"));
        assert_eq!(history[0].performed_by.as_deref(), Some("alice"));
        assert_eq!(history[0].notes.as_deref(), Some("Stock incoming"));
    }

    #[tokio::test]
    async fn versions_advance_by_one_per_commit() {
        let engine = engine(ScriptedStore::default(), 5);
        let first = engine.add_incoming("SKU1", dec(10), None, None).await.unwrap();
        let second = engine.reserve("SKU1", dec(3), None, None).await.unwrap();
        assert_eq!(second.version, first.version.next());

        let read = engine.get_by_product_code("SKU1").await.unwrap().unwrap();
        assert_eq!(read, second);
    }
}
