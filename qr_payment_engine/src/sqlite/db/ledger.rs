use chrono::{DateTime, Utc};
use log::trace;
use qpe_common::Cents;
use sqlx::SqliteConnection;

use crate::{
    db_types::{LedgerEntry, Reference},
    traits::{LedgerError, LEDGER_NAMESPACE},
};

fn storage_key(reference: &Reference) -> String {
    format!("{LEDGER_NAMESPACE}:{}", reference.as_str())
}

pub async fn fetch_entry(
    reference: &Reference,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, LedgerError> {
    let row: Option<(Cents, DateTime<Utc>)> =
        sqlx::query_as(r#"SELECT accumulated, updated_at FROM ledger_entries WHERE key = ?"#)
            .bind(storage_key(reference))
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(accumulated, updated_at)| LedgerEntry { reference: reference.clone(), accumulated, updated_at }))
}

/// Adds `amount` to the stored total for `reference` in a single atomic statement.
///
/// The upsert performs the read-modify-write inside the database engine, so two calls racing each other for the same
/// reference serialize there and neither increment can be lost.
pub async fn accumulate(
    reference: &Reference,
    amount: Cents,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    let (accumulated, updated_at): (Cents, DateTime<Utc>) = sqlx::query_as(
        r#"
            INSERT INTO ledger_entries (key, accumulated, updated_at) VALUES ($1, $2, CURRENT_TIMESTAMP)
            ON CONFLICT (key) DO UPDATE SET
                accumulated = ledger_entries.accumulated + excluded.accumulated,
                updated_at = CURRENT_TIMESTAMP
            RETURNING accumulated, updated_at;
        "#,
    )
    .bind(storage_key(reference))
    .bind(amount)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Ledger entry for [{reference}] now stands at {accumulated}");
    Ok(LedgerEntry { reference: reference.clone(), accumulated, updated_at })
}

pub async fn clear(reference: &Reference, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query(r#"DELETE FROM ledger_entries WHERE key = ?"#)
        .bind(storage_key(reference))
        .execute(conn)
        .await?;
    trace!("🗃️ Cleared {} ledger entry for [{reference}]", result.rows_affected());
    Ok(())
}
