//! Read-only query surface over the stock store.
//!
//! Nothing here writes. Product codes arrive as raw strings and are validated the same
//! way the write path validates them, so a blank or oversized code is an
//! `InvalidProductCode` error rather than an empty result.

use serde::{Deserialize, Serialize};

use stockledger_core::ProductCode;
use stockledger_inventory::{StockLedger, StockTransaction};

use crate::error::StockError;
use crate::store::{StockStore, Versioned};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Pagination parameters for transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// One page of a product's audit trail, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub records: Vec<StockTransaction>,
    /// Total number of records for the product (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl TransactionPage {
    /// Cut one page out of a complete, already ordered history.
    ///
    /// The limit is capped at [`MAX_PAGE_LIMIT`] even when `pagination` was built by hand.
    pub fn slice(all: Vec<StockTransaction>, pagination: Pagination) -> Self {
        let pagination = Pagination {
            limit: pagination.limit.min(MAX_PAGE_LIMIT),
            ..pagination
        };
        let total = all.len() as u64;
        let records: Vec<StockTransaction> = all
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = u64::from(pagination.offset) + (records.len() as u64) < total;
        Self {
            records,
            total,
            pagination,
            has_more,
        }
    }
}

/// Read calls for request layers and reports.
#[derive(Debug, Clone)]
pub struct StockQueries<S> {
    store: S,
}

impl<S> StockQueries<S>
where
    S: StockStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get_by_product_code(
        &self,
        product_code: &str,
    ) -> Result<Option<Versioned<StockLedger>>, StockError> {
        let code = ProductCode::parse(product_code)?;
        Ok(self.store.get(&code).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Versioned<StockLedger>>, StockError> {
        Ok(self.store.list_all().await?)
    }

    /// Ledgers whose code equals or starts with `query` (surrounding whitespace ignored).
    pub async fn search(&self, query: &str) -> Result<Vec<Versioned<StockLedger>>, StockError> {
        Ok(self.store.search(query.trim()).await?)
    }

    pub async fn low_stock(&self) -> Result<Vec<Versioned<StockLedger>>, StockError> {
        Ok(self.store.list_low_stock().await?)
    }

    /// Full audit trail for one product, oldest first.
    pub async fn transactions(&self, product_code: &str) -> Result<Vec<StockTransaction>, StockError> {
        let code = ProductCode::parse(product_code)?;
        Ok(self.store.list_by_product_code(&code).await?)
    }

    pub async fn transaction_page(
        &self,
        product_code: &str,
        pagination: Pagination,
    ) -> Result<TransactionPage, StockError> {
        let code = ProductCode::parse(product_code)?;
        Ok(self.store.page_by_product_code(&code, pagination).await?)
    }
}
