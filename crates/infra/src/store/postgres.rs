//! Postgres-backed stock store.
//!
//! Ledgers live in `stock_ledger` (one row per product code, `version` column as the
//! concurrency token); audit records live in `stock_transaction` (append-only,
//! `sequence` is a `BIGSERIAL` giving insertion order).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent first insert of the same product code |
//! | Database (check violation) | `23514` | `Corrupt` | A row would break a ledger invariant |
//! | Decode / ColumnDecode | N/A | `Corrupt` | Stored value cannot be read back |
//! | Anything else | Any other | `Unavailable` | Network, pool closed, other database errors |
//!
//! ## Optimistic Concurrency
//!
//! `commit()` runs in one SQL transaction:
//! 1. `INSERT ... ON CONFLICT DO NOTHING` (expected `Absent`) or
//!    `UPDATE ... WHERE product_code = $1 AND version = $2` (expected `Exact`)
//! 2. zero affected rows means another writer got there first: roll back, `Conflict`
//! 3. insert the audit record and commit
//!
//! A concurrent `UPDATE` on the same row waits for the first writer's row lock and then
//! re-evaluates its `WHERE` clause against the new version, so at most one succeeds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::instrument;

use stockledger_core::{ExpectedVersion, ProductCode, TransactionId, Version};
use stockledger_inventory::{
    LedgerFields, NewTransaction, StockLedger, StockTransaction, TransactionType,
};

use super::r#trait::{
    CommittedChange, LedgerChange, LedgerStore, StoreError, TransactionLog, Versioned,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_ledger (
        product_code    TEXT PRIMARY KEY,
        product_name    TEXT NOT NULL,
        current_stock   NUMERIC NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
        reserved_stock  NUMERIC NOT NULL DEFAULT 0 CHECK (reserved_stock >= 0),
        available_stock NUMERIC NOT NULL DEFAULT 0,
        incoming_stock  NUMERIC NOT NULL DEFAULT 0 CHECK (incoming_stock >= 0),
        unit            TEXT,
        reorder_level   NUMERIC,
        last_updated    TIMESTAMPTZ NOT NULL,
        version         BIGINT NOT NULL CHECK (version >= 1),
        CHECK (reserved_stock <= current_stock),
        CHECK (available_stock = current_stock - reserved_stock)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_transaction (
        sequence         BIGSERIAL PRIMARY KEY,
        id               UUID NOT NULL UNIQUE,
        product_code     TEXT NOT NULL,
        type             TEXT NOT NULL,
        quantity         NUMERIC NOT NULL CHECK (quantity > 0),
        balance_after    NUMERIC NOT NULL,
        reference_number TEXT,
        notes            TEXT,
        performed_by     TEXT,
        transaction_date TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_transaction_product_idx
        ON stock_transaction (product_code, transaction_date, sequence)
    "#,
];

const LEDGER_COLUMNS: &str = "product_code, product_name, current_stock, reserved_stock, \
     incoming_stock, unit, reorder_level, last_updated, version";

const TRANSACTION_COLUMNS: &str = "sequence, id, product_code, type, quantity, balance_after, \
     reference_number, notes, performed_by, transaction_date";

/// Postgres-backed stock store.
///
/// Uses a SQLx connection pool, so it is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool and make sure both tables exist.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the ledger and transaction tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_ledgers(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(ledger_from_row).collect()
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresStockStore {
    #[instrument(skip(self), fields(product_code = %product_code), err)]
    async fn get(
        &self,
        product_code: &ProductCode,
    ) -> Result<Option<Versioned<StockLedger>>, StoreError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM stock_ledger WHERE product_code = $1");
        let row = sqlx::query(&sql)
            .bind(product_code.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_ledger", e))?;
        row.as_ref().map(ledger_from_row).transpose()
    }

    #[instrument(skip(self, ledger), fields(product_code = %ledger.product_code()), err)]
    async fn create(&self, ledger: StockLedger) -> Result<Versioned<StockLedger>, StoreError> {
        let affected = insert_ledger(&*self.pool, &ledger).await?;
        if affected == 0 {
            return Err(StoreError::AlreadyExists(ledger.product_code().clone()));
        }
        Ok(Versioned::new(ledger, Version::INITIAL))
    }

    #[instrument(
        skip(self, change),
        fields(
            product_code = %change.ledger.product_code(),
            expected = ?change.expected
        ),
        err
    )]
    async fn commit(&self, change: LedgerChange) -> Result<CommittedChange, StoreError> {
        let LedgerChange {
            ledger,
            expected,
            transaction,
        } = change;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let affected = match expected {
            ExpectedVersion::Absent => insert_ledger(&mut *tx, &ledger).await?,
            ExpectedVersion::Exact(version) => update_ledger(&mut tx, &ledger, version).await?,
        };

        if affected == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "{}: expected {expected:?} no longer holds",
                ledger.product_code()
            )));
        }

        let transaction = insert_transaction(&mut *tx, transaction).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommittedChange {
            ledger: Versioned::new(ledger, expected.committed_version()),
            transaction,
        })
    }

    #[instrument(skip(self), err)]
    async fn list_all(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM stock_ledger ORDER BY product_code");
        self.fetch_ledgers("list_all", sqlx::query(&sql)).await
    }

    #[instrument(skip(self), err)]
    async fn search(&self, query: &str) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger \
             WHERE product_code LIKE $1 ESCAPE '\\' ORDER BY product_code"
        );
        let pattern = format!("{}%", escape_like(query));
        self.fetch_ledgers("search", sqlx::query(&sql).bind(pattern))
            .await
    }

    #[instrument(skip(self), err)]
    async fn list_low_stock(&self) -> Result<Vec<Versioned<StockLedger>>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger \
             WHERE reorder_level IS NOT NULL AND current_stock <= reorder_level \
             ORDER BY product_code"
        );
        self.fetch_ledgers("list_low_stock", sqlx::query(&sql)).await
    }
}

#[async_trait::async_trait]
impl TransactionLog for PostgresStockStore {
    #[instrument(skip(self, transaction), fields(product_code = %transaction.product_code), err)]
    async fn append(&self, transaction: NewTransaction) -> Result<StockTransaction, StoreError> {
        insert_transaction(&*self.pool, transaction).await
    }

    #[instrument(skip(self), fields(product_code = %product_code), err)]
    async fn list_by_product_code(
        &self,
        product_code: &ProductCode,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transaction \
             WHERE product_code = $1 ORDER BY transaction_date ASC, sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(product_code.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_transactions", e))?;
        rows.iter().map(transaction_from_row).collect()
    }
}

async fn insert_ledger<'e, E>(executor: E, ledger: &StockLedger) -> Result<u64, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO stock_ledger (
            product_code, product_name, current_stock, reserved_stock, available_stock,
            incoming_stock, unit, reorder_level, last_updated, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (product_code) DO NOTHING
        "#,
    )
    .bind(ledger.product_code().as_str())
    .bind(ledger.product_name())
    .bind(ledger.current_stock())
    .bind(ledger.reserved_stock())
    .bind(ledger.available_stock())
    .bind(ledger.incoming_stock())
    .bind(ledger.unit())
    .bind(ledger.reorder_level())
    .bind(ledger.last_updated())
    .bind(Version::INITIAL.get() as i64)
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_ledger", e))?;
    Ok(result.rows_affected())
}

async fn update_ledger(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ledger: &StockLedger,
    expected: Version,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE stock_ledger SET
            current_stock = $3,
            reserved_stock = $4,
            available_stock = $5,
            incoming_stock = $6,
            last_updated = $7,
            version = version + 1
        WHERE product_code = $1 AND version = $2
        "#,
    )
    .bind(ledger.product_code().as_str())
    .bind(expected.get() as i64)
    .bind(ledger.current_stock())
    .bind(ledger.reserved_stock())
    .bind(ledger.available_stock())
    .bind(ledger.incoming_stock())
    .bind(ledger.last_updated())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_ledger", e))?;
    Ok(result.rows_affected())
}

async fn insert_transaction<'e, E>(
    executor: E,
    transaction: NewTransaction,
) -> Result<StockTransaction, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let id = TransactionId::new();
    let row = sqlx::query(
        r#"
        INSERT INTO stock_transaction (
            id, product_code, type, quantity, balance_after,
            reference_number, notes, performed_by, transaction_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING sequence
        "#,
    )
    .bind(id.as_uuid())
    .bind(transaction.product_code.as_str())
    .bind(transaction.transaction_type.as_str())
    .bind(transaction.quantity)
    .bind(transaction.balance_after)
    .bind(transaction.reference_number.as_deref())
    .bind(transaction.notes.as_deref())
    .bind(transaction.performed_by.as_deref())
    .bind(transaction.transaction_date)
    .fetch_one(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;

    let sequence: i64 = row
        .try_get("sequence")
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    Ok(transaction.into_stored(id, sequence as u64))
}

fn ledger_from_row(row: &PgRow) -> Result<Versioned<StockLedger>, StoreError> {
    let get_err = |e| map_sqlx_error("decode_ledger", e);

    let code: String = row.try_get("product_code").map_err(get_err)?;
    let product_code = ProductCode::parse(&code)
        .map_err(|e| StoreError::Corrupt(format!("stock_ledger.product_code {code:?}: {e}")))?;
    let version: i64 = row.try_get("version").map_err(get_err)?;

    let fields = LedgerFields {
        product_code,
        product_name: row.try_get("product_name").map_err(get_err)?,
        current_stock: row.try_get::<Decimal, _>("current_stock").map_err(get_err)?,
        reserved_stock: row.try_get::<Decimal, _>("reserved_stock").map_err(get_err)?,
        incoming_stock: row.try_get::<Decimal, _>("incoming_stock").map_err(get_err)?,
        unit: row.try_get("unit").map_err(get_err)?,
        reorder_level: row.try_get("reorder_level").map_err(get_err)?,
        last_updated: row.try_get::<DateTime<Utc>, _>("last_updated").map_err(get_err)?,
    };
    let ledger = StockLedger::restore(fields).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Versioned::new(ledger, Version::new(version as u64)))
}

fn transaction_from_row(row: &PgRow) -> Result<StockTransaction, StoreError> {
    let get_err = |e| map_sqlx_error("decode_transaction", e);

    let code: String = row.try_get("product_code").map_err(get_err)?;
    let product_code = ProductCode::parse(&code).map_err(|e| {
        StoreError::Corrupt(format!("stock_transaction.product_code {code:?}: {e}"))
    })?;
    let kind: String = row.try_get("type").map_err(get_err)?;
    let transaction_type = TransactionType::parse(&kind)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown transaction type {kind:?}")))?;
    let id: uuid::Uuid = row.try_get("id").map_err(get_err)?;
    let sequence: i64 = row.try_get("sequence").map_err(get_err)?;

    Ok(StockTransaction {
        id: TransactionId::from_uuid(id),
        sequence: sequence as u64,
        product_code,
        transaction_type,
        quantity: row.try_get("quantity").map_err(get_err)?,
        balance_after: row.try_get("balance_after").map_err(get_err)?,
        reference_number: row.try_get("reference_number").map_err(get_err)?,
        notes: row.try_get("notes").map_err(get_err)?,
        performed_by: row.try_get("performed_by").map_err(get_err)?,
        transaction_date: row.try_get("transaction_date").map_err(get_err)?,
    })
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: a concurrent writer inserted the same row first.
                Some("23505") => StoreError::Conflict(msg),
                Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("failed to decode row in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
