//! `SqliteLedger` is a concrete implementation of the persisted ledger.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`ReconciliationLedger`] trait by delegating to
//! the functions in the [`super::db`] module.
use std::fmt::Debug;

use qpe_common::Cents;
use sqlx::SqlitePool;

use super::db::{db_url, ledger, new_pool};
use crate::{
    db_types::{LedgerEntry, Reference},
    traits::{LedgerError, ReconciliationLedger},
};

#[derive(Clone)]
pub struct SqliteLedger {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteLedger ({:?})", self.pool)
    }
}

impl SqliteLedger {
    /// Connect using the URL from the `QPE_DATABASE_URL` environment variable, or the default store location.
    pub async fn new(max_connections: u32) -> Result<Self, LedgerError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ReconciliationLedger for SqliteLedger {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_entry(&self, reference: &Reference) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_entry(reference, &mut conn).await
    }

    async fn accumulate(&self, reference: &Reference, amount: Cents) -> Result<LedgerEntry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::accumulate(reference, amount, &mut conn).await
    }

    async fn clear(&self, reference: &Reference) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::clear(reference, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}
