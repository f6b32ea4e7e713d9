//! Warehouse stores - transactional table persistence
//!
//! A store hands out one transaction per batch. Nothing written through a transaction
//! is visible until `commit`; dropping or rolling back discards every write.

use crate::warehouse::error::{EtlError, Result};
use crate::warehouse::types::{Table, Value};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

/// How long a single connection attempt may take
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Empty the named tables
    async fn truncate(&mut self, tables: &[&str]) -> Result<()>;

    /// Append every row of `table`, returning the number of rows written
    async fn insert(&mut self, table: &Table) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Connect to Postgres, waiting a bounded number of attempts for it to come up
pub async fn connect_with_retry(
    url: &str,
    name: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<PgPool> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(url)
            .await;

        match result {
            Ok(pool) => {
                info!("{} is available", name);
                return Ok(pool);
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Waiting for {} ({}/{})... sleeping {:?}: {}",
                    name, attempt, max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(EtlError::Unreachable {
                    dependency: name.to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// PostgreSQL warehouse
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn truncate(&mut self, tables: &[&str]) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = tables.iter().map(|t| quote_ident(t)).collect();
        let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY", names.join(", "));
        debug!("{}", sql);
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert(&mut self, table: &Table) -> Result<u64> {
        if table.rows.is_empty() || table.columns.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
        let prefix = format!(
            "INSERT INTO {} ({}) ",
            quote_ident(&table.name),
            columns.join(", ")
        );
        let chunk_size = (MAX_BIND_PARAMS / table.columns.len()).max(1);
        let mut written = 0;

        for chunk in table.rows.chunks(chunk_size) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut b, row| {
                for value in row {
                    match value.clone() {
                        Value::Int(v) => b.push_bind(v),
                        Value::BigInt(v) => b.push_bind(v),
                        Value::Float(v) => b.push_bind(v),
                        Value::Text(v) => b.push_bind(v),
                        Value::Date(v) => b.push_bind(v),
                    };
                }
            });
            let result = builder.build().execute(&mut *self.tx).await?;
            written += result.rows_affected();
        }

        debug!("Inserted {} rows into {}", written, table.name);
        Ok(written)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

type TableMap = BTreeMap<String, Table>;

/// In-memory warehouse used for dry runs and tests.
///
/// Transactions stage a private copy of every table and swap it in on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<TableMap>>,
    insert_log: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose inserts into `table` always fail
    pub fn failing_on(table: &str) -> Self {
        MemoryStore {
            fail_on: Some(table.to_string()),
            ..Self::default()
        }
    }

    /// Stop failing; shares the committed tables with `self`
    pub fn healed(&self) -> Self {
        MemoryStore {
            fail_on: None,
            ..self.clone()
        }
    }

    /// Committed tables
    pub fn snapshot(&self) -> Result<TableMap> {
        self.tables
            .lock()
            .map(|t| t.clone())
            .map_err(|e| EtlError::Memory(e.to_string()))
    }

    /// Table names in the order their inserts were committed, most recent batch last
    pub fn insert_log(&self) -> Result<Vec<String>> {
        self.insert_log
            .lock()
            .map(|l| l.clone())
            .map_err(|e| EtlError::Memory(e.to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            staged: self.snapshot()?,
            inserted: Vec::new(),
            store: self.clone(),
        }))
    }
}

struct MemoryTransaction {
    staged: TableMap,
    inserted: Vec<String>,
    store: MemoryStore,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn truncate(&mut self, tables: &[&str]) -> Result<()> {
        for name in tables {
            if let Some(table) = self.staged.get_mut(*name) {
                table.rows.clear();
            }
        }
        Ok(())
    }

    async fn insert(&mut self, table: &Table) -> Result<u64> {
        if self.store.fail_on.as_deref() == Some(table.name.as_str()) {
            return Err(EtlError::Memory(format!(
                "simulated failure writing {}",
                table.name
            )));
        }

        let staged = self
            .staged
            .entry(table.name.clone())
            .or_insert_with(|| Table {
                name: table.name.clone(),
                columns: table.columns.clone(),
                rows: Vec::new(),
            });
        staged.columns = table.columns.clone();
        staged.rows.extend(table.rows.iter().cloned());
        self.inserted.push(table.name.clone());

        Ok(table.rows.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            staged,
            inserted,
            store,
        } = *self;
        let mut tables = store
            .tables
            .lock()
            .map_err(|e| EtlError::Memory(e.to_string()))?;
        let mut log = store
            .insert_log
            .lock()
            .map_err(|e| EtlError::Memory(e.to_string()))?;
        *tables = staged;
        log.extend(inserted);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("Discarding {} staged tables", self.staged.len());
        Ok(())
    }
}
