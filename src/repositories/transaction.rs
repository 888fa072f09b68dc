//! Transaction management utilities for repositories.
//!
//! Multi-table writes that must land together (device reconciliation) use a
//! real database transaction. There is deliberately no in-memory savepoint
//! ledger anywhere in this crate.

use crate::error::Error;
use sqlx::postgres::PgTransaction;
use sqlx::PgPool;

/// Begin a new database transaction.
pub async fn begin_transaction(db: &PgPool) -> Result<PgTransaction<'_>, Error> {
    db.begin().await.map_err(Error::from)
}

/// Commit a transaction, making all its writes visible.
pub async fn commit_transaction(tx: PgTransaction<'_>) -> Result<(), Error> {
    tx.commit().await.map_err(Error::from)
}

/// Roll back a transaction, undoing all writes made since it began.
pub async fn rollback_transaction(tx: PgTransaction<'_>) -> Result<(), Error> {
    tx.rollback().await.map_err(Error::from)
}
