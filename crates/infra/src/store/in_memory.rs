use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stockledger_core::{ProductCode, TransactionId, Version};
use stockledger_inventory::{NewTransaction, StockLedger, StockTransaction};

use super::r#trait::{
    CommittedChange, LedgerChange, LedgerStore, StoreError, TransactionLog, Versioned,
};

#[derive(Debug, Default)]
struct State {
    ledgers: BTreeMap<ProductCode, Versioned<StockLedger>>,
    log: Vec<StockTransaction>,
}

impl State {
    fn push_transaction(&mut self, transaction: NewTransaction) -> StockTransaction {
        let sequence = self.log.len() as u64 + 1;
        let stored = transaction.into_stored(TransactionId::new(), sequence);
        self.log.push(stored.clone());
        stored
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. Ledgers and the audit log sit behind one lock, so a
/// commit (version check, ledger write, log append) is a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit records across all products.
    pub fn transaction_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.log.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn collect<F>(&self, keep: F) -> Result<Vec<Versioned<StockLedger>>, StoreError>
    where
        F: Fn(&Versioned<StockLedger>) -> bool,
    {
        let state = self.read()?;
        Ok(state.ledgers.values().filter(|v| keep(v)).cloned().collect())
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryStockStore {
    async fn get(
        &self,
        product_code: &ProductCode,
    ) -> Result<Option<Versioned<StockLedger>>, StoreError> {
        Ok(self.read()?.ledgers.get(product_code).cloned())
    }

    async fn create(&self, ledger: StockLedger) -> Result<Versioned<StockLedger>, StoreError> {
        let mut state = self.write()?;
        let code = ledger.product_code().clone();
        if state.ledgers.contains_key(&code) {
            return Err(StoreError::AlreadyExists(code));
        }
        let stored = Versioned::new(ledger, Version::INITIAL);
        state.ledgers.insert(code, stored.clone());
        Ok(stored)
    }

    async fn commit(&self, change: LedgerChange) -> Result<CommittedChange, StoreError> {
        let LedgerChange {
            ledger,
            expected,
            transaction,
        } = change;

        let mut state = self.write()?;
        let code = ledger.product_code().clone();
        let actual = state.ledgers.get(&code).map(|v| v.version);

        if !expected.matches(actual) {
            return Err(StoreError::Conflict(format!(
                "{code}: expected {expected:?}, found {actual:?}"
            )));
        }

        let stored = Versioned::new(ledger, expected.committed_version());
        state.ledgers.insert(code, stored.clone());
        let transaction = state.push_transaction(transaction);

        Ok(CommittedChange {
            ledger: stored,
            transaction,
        })
    }

    async fn list_all(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        self.collect(|_| true)
    }

    async fn search(&self, query: &str) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        self.collect(|v| v.value.product_code().matches(query))
    }

    async fn list_low_stock(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        self.collect(|v| v.value.is_low_stock())
    }
}

#[async_trait::async_trait]
impl TransactionLog for InMemoryStockStore {
    async fn append(&self, transaction: NewTransaction) -> Result<StockTransaction, StoreError> {
        Ok(self.write()?.push_transaction(transaction))
    }

    async fn list_by_product_code(
        &self,
        product_code: &ProductCode,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let state = self.read()?;
        let mut records: Vec<StockTransaction> = state
            .log
            .iter()
            .filter(|t| &t.product_code == product_code)
            .cloned()
            .collect();
        records.sort_by_key(|t| (t.transaction_date, t.sequence));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use stockledger_core::ExpectedVersion;
    use stockledger_inventory::TransactionType;

    fn sku(code: &str) -> ProductCode {
        ProductCode::parse(code).unwrap()
    }

    fn record(code: &str, kind: TransactionType, at: chrono::DateTime<Utc>) -> NewTransaction {
        NewTransaction {
            product_code: sku(code),
            transaction_type: kind,
            quantity: Decimal::ONE,
            balance_after: Decimal::ONE,
            reference_number: None,
            notes: None,
            performed_by: None,
            transaction_date: at,
        }
    }

    fn change(code: &str, expected: ExpectedVersion) -> LedgerChange {
        LedgerChange {
            ledger: StockLedger::open(sku(code), "Widget", Utc::now()),
            expected,
            transaction: record(code, TransactionType::Incoming, Utc::now()),
        }
    }

    #[tokio::test]
    async fn commit_creates_then_advances_version() {
        let store = InMemoryStockStore::new();

        let first = store.commit(change("SKU1", ExpectedVersion::Absent)).await.unwrap();
        assert_eq!(first.ledger.version, Version::INITIAL);
        assert_eq!(first.transaction.sequence, 1);

        let second = store
            .commit(change("SKU1", first.ledger.expected()))
            .await
            .unwrap();
        assert_eq!(second.ledger.version, Version::new(2));
        assert_eq!(store.transaction_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_commit_is_a_conflict_and_writes_nothing() {
        let store = InMemoryStockStore::new();
        store.commit(change("SKU1", ExpectedVersion::Absent)).await.unwrap();

        let err = store
            .commit(change("SKU1", ExpectedVersion::Absent))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store
            .commit(change("SKU1", ExpectedVersion::Exact(Version::new(9))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(store.transaction_count().unwrap(), 1);
        let stored = store.get(&sku("SKU1")).await.unwrap().unwrap();
        assert_eq!(stored.version, Version::INITIAL);
    }

    #[tokio::test]
    async fn create_rejects_existing_codes() {
        let store = InMemoryStockStore::new();
        let ledger = StockLedger::open(sku("SKU1"), "Widget", Utc::now());
        store.create(ledger.clone()).await.unwrap();

        let err = store.create(ledger).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(code) if code == sku("SKU1")));
    }

    #[tokio::test]
    async fn history_is_ordered_by_date_then_insertion() {
        let store = InMemoryStockStore::new();
        let now = Utc::now();

        store.append(record("SKU1", TransactionType::Reserve, now)).await.unwrap();
        store
            .append(record("SKU1", TransactionType::Incoming, now - Duration::seconds(5)))
            .await
            .unwrap();
        store.append(record("SKU2", TransactionType::Incoming, now)).await.unwrap();
        store.append(record("SKU1", TransactionType::Release, now)).await.unwrap();

        let history = store.list_by_product_code(&sku("SKU1")).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|t| t.transaction_type).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Incoming,
                TransactionType::Reserve,
                TransactionType::Release
            ]
        );
    }

    #[tokio::test]
    async fn search_and_low_stock_filters() {
        let store = InMemoryStockStore::new();
        let now = Utc::now();
        for code in ["SKU-10", "SKU-11", "BOLT-1"] {
            store
                .create(StockLedger::open(sku(code), code, now))
                .await
                .unwrap();
        }
        store
            .create(StockLedger::open(sku("NUT-1"), "Nut", now).with_reorder_level(Decimal::from(5)))
            .await
            .unwrap();

        let found: Vec<_> = store
            .search("SKU-1")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.value.product_code().to_string())
            .collect();
        assert_eq!(found, vec!["SKU-10", "SKU-11"]);

        assert_eq!(store.search("BOLT-1").await.unwrap().len(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 4);

        let low = store.list_low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].value.product_code(), &sku("NUT-1"));
    }
}
