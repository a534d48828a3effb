//! SQLite persistence for the nonce pool.
//!
//! One row per live nonce; `reserved` marks a nonce handed out to an in-flight
//! submission. The `nonce_cursor` singleton holds the next value to mint when
//! no free row exists. The cursor is always kept above every pooled nonce so a
//! mint can never collide with a row.

use std::{
    path::Path,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use rusqlite::{
    params,
    Connection,
    OptionalExtension as _,
    TransactionBehavior,
};
use rusqlite_migration::{
    Migrations,
    M,
};

use super::NonceError;

const MIGRATION_0001_NONCE_POOL: &str = include_str!("migrations/0001_nonce_pool.sql");

/// How many placeholder nonces a single replenish pass ensures exist.
pub(crate) const REPLENISH_SPAN: u64 = 10_000;

pub struct NoncePool {
    conn: Mutex<Connection>,
}

impl NoncePool {
    /// Opens (creating if needed) the pool database at `path`.
    ///
    /// Reservations left over from a previous run are swept back to the free
    /// set: whatever was in flight when the process died either landed (and
    /// will be skipped by the startup fast-forward) or never will.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, NonceError> {
        let conn = Connection::open(path).map_err(NonceError::Storage)?;
        Self::from_connection(conn)
    }

    /// An in-memory pool, used by tests.
    pub fn open_in_memory() -> Result<Self, NonceError> {
        let conn = Connection::open_in_memory().map_err(NonceError::Storage)?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, NonceError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .and_then(|()| conn.pragma_update(None, "synchronous", "NORMAL"))
            .and_then(|()| conn.pragma_update(None, "busy_timeout", 5000))
            .map_err(NonceError::Storage)?;
        Migrations::from_slice(&[M::up(MIGRATION_0001_NONCE_POOL)])
            .to_latest(&mut conn)
            .map_err(NonceError::Migration)?;
        conn.execute("UPDATE nonce_pool SET reserved = 0 WHERE reserved != 0", [])
            .map_err(NonceError::Storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the lowest free nonce, minting a fresh one from the cursor if
    /// the free set is empty.
    pub(crate) fn reserve_lowest(&self) -> Result<u64, NonceError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(NonceError::Storage)?;
        let reserved: Option<i64> = tx
            .query_row(
                "UPDATE nonce_pool SET reserved = 1
                 WHERE nonce = (
                     SELECT nonce FROM nonce_pool WHERE reserved = 0 ORDER BY nonce LIMIT 1
                 )
                 RETURNING nonce",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(NonceError::Storage)?;
        let nonce = match reserved {
            Some(nonce) => nonce,
            None => {
                let next: i64 = tx
                    .query_row("SELECT next FROM nonce_cursor WHERE singleton_id = 0", [], |row| {
                        row.get(0)
                    })
                    .map_err(NonceError::Storage)?;
                tx.execute(
                    "INSERT INTO nonce_pool (nonce, reserved) VALUES (?1, 1)",
                    params![next],
                )
                .map_err(NonceError::Storage)?;
                tx.execute(
                    "UPDATE nonce_cursor SET next = ?1 WHERE singleton_id = 0",
                    params![next + 1],
                )
                .map_err(NonceError::Storage)?;
                next
            }
        };
        tx.commit().map_err(NonceError::Storage)?;
        Ok(i64_to_u64(nonce))
    }

    /// Returns a reserved nonce to the free set.
    pub(crate) fn release(&self, nonce: u64) -> Result<(), NonceError> {
        self.conn()
            .execute(
                "UPDATE nonce_pool SET reserved = 0 WHERE nonce = ?1",
                params![u64_to_i64(nonce)],
            )
            .map_err(NonceError::Storage)?;
        Ok(())
    }

    /// Permanently removes a nonce that was used on chain.
    pub(crate) fn consume(&self, nonce: u64) -> Result<(), NonceError> {
        self.conn()
            .execute(
                "DELETE FROM nonce_pool WHERE nonce = ?1",
                params![u64_to_i64(nonce)],
            )
            .map_err(NonceError::Storage)?;
        Ok(())
    }

    /// Discards every pooled nonce below `nonce` and moves the mint cursor up
    /// to it, keeping the cursor above any surviving rows.
    pub(crate) fn fast_forward(&self, nonce: u64) -> Result<(), NonceError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(NonceError::Storage)?;
        tx.execute(
            "DELETE FROM nonce_pool WHERE nonce < ?1",
            params![u64_to_i64(nonce)],
        )
        .map_err(NonceError::Storage)?;
        tx.execute(
            "UPDATE nonce_cursor
             SET next = MAX(?1, COALESCE((SELECT MAX(nonce) + 1 FROM nonce_pool), ?1))
             WHERE singleton_id = 0",
            params![u64_to_i64(nonce)],
        )
        .map_err(NonceError::Storage)?;
        tx.commit().map_err(NonceError::Storage)?;
        Ok(())
    }

    /// Ensures [`REPLENISH_SPAN`] sequential placeholder nonces starting at
    /// `from` exist in the pool, adding only the missing ones.
    pub(crate) fn replenish(&self, from: u64) -> Result<(), NonceError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(NonceError::Storage)?;
        {
            let mut insert = tx
                .prepare_cached("INSERT OR IGNORE INTO nonce_pool (nonce, reserved) VALUES (?1, 0)")
                .map_err(NonceError::Storage)?;
            for nonce in from..from.saturating_add(REPLENISH_SPAN) {
                insert
                    .execute(params![u64_to_i64(nonce)])
                    .map_err(NonceError::Storage)?;
            }
        }
        tx.execute(
            "UPDATE nonce_cursor SET next = MAX(next, ?1) WHERE singleton_id = 0",
            params![u64_to_i64(from.saturating_add(REPLENISH_SPAN))],
        )
        .map_err(NonceError::Storage)?;
        tx.commit().map_err(NonceError::Storage)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn free_nonces(&self) -> Result<Vec<u64>, NonceError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT nonce FROM nonce_pool WHERE reserved = 0 ORDER BY nonce")
            .map_err(NonceError::Storage)?;
        let nonces = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(NonceError::Storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(NonceError::Storage)?;
        Ok(nonces.into_iter().map(i64_to_u64).collect())
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, nonce: u64) -> Result<bool, NonceError> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT nonce FROM nonce_pool WHERE nonce = ?1",
                params![u64_to_i64(nonce)],
                |row| row.get(0),
            )
            .optional()
            .map_err(NonceError::Storage)?;
        Ok(found.is_some())
    }
}

// Nonces are stored in SQLite's signed 64-bit integers; values anywhere near
// the sign bit would mean ~9e18 transactions from one account.
#[allow(clippy::cast_possible_wrap)]
fn u64_to_i64(value: u64) -> i64 {
    value as i64
}

#[allow(clippy::cast_sign_loss)]
fn i64_to_u64(value: i64) -> u64 {
    value as u64
}
