use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ExpectedVersion, ProductCode, Version};
use stockledger_inventory::{NewTransaction, StockLedger, StockTransaction};

use crate::query::{Pagination, TransactionPage};

/// A stored value paired with the concurrency token it was read at.
///
/// Every read from a [`LedgerStore`] hands out the version alongside the ledger, and
/// every commit must hand it back as an [`ExpectedVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    #[serde(flatten)]
    pub value: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }

    /// Expectation to supply when committing a change derived from this read.
    pub fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// One atomic unit of work: the next ledger state plus its audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerChange {
    pub ledger: StockLedger,
    /// `Absent` creates the row; `Exact(v)` updates it only if it is still at `v`.
    pub expected: ExpectedVersion,
    pub transaction: NewTransaction,
}

/// Result of a successful [`LedgerStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedChange {
    pub ledger: Versioned<StockLedger>,
    pub transaction: StockTransaction,
}

/// Store operation error.
///
/// These are **infrastructure errors**; stock rule violations never reach a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version no longer matches the expectation (someone committed first).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// `create` for a product code that already has a ledger.
    #[error("stock ledger already exists: {0}")]
    AlreadyExists(ProductCode),

    /// The backing store could not be reached or rejected the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be turned back into a valid record.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Keyed storage of one ledger per product code with compare-and-commit writes.
///
/// ## Implementation Requirements
///
/// - `commit` is atomic: the ledger row and the audit record are both persisted or
///   neither is
/// - two commits against the same product code can never both succeed if either
///   carried a stale expectation
/// - every successful write advances the version by exactly one
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, product_code: &ProductCode)
        -> Result<Option<Versioned<StockLedger>>, StoreError>;

    /// Insert a new ledger without an audit record (seeding metadata such as the
    /// reorder level). Fails with `AlreadyExists` if the code is taken.
    async fn create(&self, ledger: StockLedger) -> Result<Versioned<StockLedger>, StoreError>;

    /// Persist a change and its audit record, or nothing (`Conflict` on a stale version).
    async fn commit(&self, change: LedgerChange) -> Result<CommittedChange, StoreError>;

    /// All ledgers ordered by product code.
    async fn list_all(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError>;

    /// Ledgers whose code equals or starts with `query`, ordered by product code.
    async fn search(&self, query: &str) -> Result<Vec<Versioned<StockLedger>>, StoreError>;

    /// Ledgers with a reorder level set and `current_stock <= reorder_level`.
    async fn list_low_stock(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError>;
}

/// Append-only audit log. There is no update or delete.
#[async_trait::async_trait]
pub trait TransactionLog: Send + Sync {
    async fn append(&self, transaction: NewTransaction) -> Result<StockTransaction, StoreError>;

    /// Records for one product, oldest first; ties broken by insertion order.
    async fn list_by_product_code(
        &self,
        product_code: &ProductCode,
    ) -> Result<Vec<StockTransaction>, StoreError>;

    async fn page_by_product_code(
        &self,
        product_code: &ProductCode,
        pagination: Pagination,
    ) -> Result<TransactionPage, StoreError> {
        let all = self.list_by_product_code(product_code).await?;
        Ok(TransactionPage::slice(all, pagination))
    }
}

/// Everything the ledger engine needs from storage.
pub trait StockStore: LedgerStore + TransactionLog {}

impl<T> StockStore for T where T: LedgerStore + TransactionLog {}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn get(
        &self,
        product_code: &ProductCode,
    ) -> Result<Option<Versioned<StockLedger>>, StoreError> {
        (**self).get(product_code).await
    }

    async fn create(&self, ledger: StockLedger) -> Result<Versioned<StockLedger>, StoreError> {
        (**self).create(ledger).await
    }

    async fn commit(&self, change: LedgerChange) -> Result<CommittedChange, StoreError> {
        (**self).commit(change).await
    }

    async fn list_all(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        (**self).list_all().await
    }

    async fn search(&self, query: &str) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        (**self).search(query).await
    }

    async fn list_low_stock(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        (**self).list_low_stock().await
    }
}

#[async_trait::async_trait]
impl<S> TransactionLog for Arc<S>
where
    S: TransactionLog + ?Sized,
{
    async fn append(&self, transaction: NewTransaction) -> Result<StockTransaction, StoreError> {
        (**self).append(transaction).await
    }

    async fn list_by_product_code(
        &self,
        product_code: &ProductCode,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).list_by_product_code(product_code).await
    }

    async fn page_by_product_code(
        &self,
        product_code: &ProductCode,
        pagination: Pagination,
    ) -> Result<TransactionPage, StoreError> {
        (**self).page_by_product_code(product_code, pagination).await
    }
}
