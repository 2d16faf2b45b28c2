//! SQLite-backed earnings ledger.
//!
//! The ledger file is shared between the orchestrator and the running
//! services. Services write through [`SqliteEarningsStore::accrue`]; the
//! orchestrator reads through [`EarningsStore::get_earnings`].

use super::{EarningsError, EarningsRecord, EarningsStore};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS earnings (
        service TEXT PRIMARY KEY,
        request_count INTEGER NOT NULL DEFAULT 0,
        buffer_earnings INTEGER NOT NULL DEFAULT 0,
        wallet_earnings INTEGER NOT NULL DEFAULT 0,
        channel_earnings INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );
";

/// SQLite earnings store.
pub struct SqliteEarningsStore {
    conn: Mutex<Connection>,
}

impl SqliteEarningsStore {
    /// Open (or create) the ledger at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, EarningsError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, EarningsError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EarningsError> {
        self.conn
            .lock()
            .map_err(|e| EarningsError::LockPoisoned(format!("conn lock: {e}")))
    }

    /// Add a paid request to a service's ledger.
    ///
    /// All amounts are added to the running totals; nothing is ever
    /// subtracted.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or a total would overflow.
    pub fn accrue(&self, service: &str, delta: &EarningsRecord) -> Result<(), EarningsError> {
        let service = service.to_lowercase();
        let to_sql = |value: u64| {
            i64::try_from(value).map_err(|_| EarningsError::Overflow(service.clone()))
        };
        let request_count = to_sql(delta.request_count)?;
        let buffer = to_sql(delta.buffer_earnings)?;
        let wallet = to_sql(delta.wallet_earnings)?;
        let channel = to_sql(delta.channel_earnings)?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            r"
            INSERT INTO earnings
                (service, request_count, buffer_earnings, wallet_earnings, channel_earnings, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(service) DO UPDATE SET
                request_count = request_count + excluded.request_count,
                buffer_earnings = buffer_earnings + excluded.buffer_earnings,
                wallet_earnings = wallet_earnings + excluded.wallet_earnings,
                channel_earnings = channel_earnings + excluded.channel_earnings,
                updated_at = excluded.updated_at
            ",
            params![service, request_count, buffer, wallet, channel, now],
        )?;
        Ok(())
    }

    /// Clear a service's ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn reset(&self, service: &str) -> Result<(), EarningsError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM earnings WHERE service = ?1",
            params![service.to_lowercase()],
        )?;
        Ok(())
    }

    /// Names of every service with a ledger row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn services(&self) -> Result<Vec<String>, EarningsError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT service FROM earnings ORDER BY service ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl EarningsStore for SqliteEarningsStore {
    fn get_earnings(&self, service: &str) -> Result<EarningsRecord, EarningsError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r"
                SELECT request_count, buffer_earnings, wallet_earnings, channel_earnings
                FROM earnings
                WHERE service = ?1
                ",
                params![service.to_lowercase()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((requests, buffer, wallet, channel)) = row else {
            return Ok(EarningsRecord::default());
        };

        // Negative values can only come from a foreign writer; read them as zero.
        let from_sql = |value: i64| u64::try_from(value).unwrap_or(0);
        Ok(EarningsRecord {
            request_count: from_sql(requests),
            buffer_earnings: from_sql(buffer),
            wallet_earnings: from_sql(wallet),
            channel_earnings: from_sql(channel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid_request(buffer: u64) -> EarningsRecord {
        EarningsRecord {
            request_count: 1,
            buffer_earnings: buffer,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_service_reads_zero() -> Result<(), EarningsError> {
        let store = SqliteEarningsStore::in_memory()?;
        assert_eq!(store.get_earnings("ping")?, EarningsRecord::default());
        Ok(())
    }

    #[test]
    fn test_accrue_accumulates() -> Result<(), EarningsError> {
        let store = SqliteEarningsStore::in_memory()?;
        store.accrue("ping", &paid_request(1000))?;
        store.accrue("ping", &paid_request(500))?;
        store.accrue(
            "ping",
            &EarningsRecord {
                request_count: 1,
                channel_earnings: 7,
                ..Default::default()
            },
        )?;

        let record = store.get_earnings("ping")?;
        assert_eq!(record.request_count, 3);
        assert_eq!(record.buffer_earnings, 1500);
        assert_eq!(record.channel_earnings, 7);
        assert_eq!(record.wallet_earnings, 0);
        Ok(())
    }

    #[test]
    fn test_reads_are_monotonic() -> Result<(), EarningsError> {
        let store = SqliteEarningsStore::in_memory()?;
        let mut previous = store.get_earnings("ping")?;
        for amount in [0, 3, 0, 12, 1] {
            store.accrue("ping", &paid_request(amount))?;
            let current = store.get_earnings("ping")?;
            assert!(current.dominates(&previous));
            previous = current;
        }
        Ok(())
    }

    #[test]
    fn test_names_are_case_insensitive() -> Result<(), EarningsError> {
        let store = SqliteEarningsStore::in_memory()?;
        store.accrue("Ping", &paid_request(10))?;
        assert_eq!(store.get_earnings("PING")?.buffer_earnings, 10);
        assert_eq!(store.services()?, vec!["ping".to_string()]);
        Ok(())
    }

    #[test]
    fn test_reset_clears_ledger() -> Result<(), EarningsError> {
        let store = SqliteEarningsStore::in_memory()?;
        store.accrue("ping", &paid_request(10))?;
        store.reset("ping")?;
        assert_eq!(store.get_earnings("ping")?, EarningsRecord::default());
        Ok(())
    }

    #[test]
    fn test_oversized_delta_is_rejected() -> Result<(), EarningsError> {
        let store = SqliteEarningsStore::in_memory()?;
        let result = store.accrue("ping", &paid_request(u64::MAX));
        assert!(matches!(result, Err(EarningsError::Overflow(_))));
        assert_eq!(store.get_earnings("ping")?, EarningsRecord::default());
        Ok(())
    }

    #[test]
    fn test_ledger_persists_on_disk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("earnings.db");
        {
            let store = SqliteEarningsStore::new(&path)?;
            store.accrue("ping", &paid_request(42))?;
        }
        let store = SqliteEarningsStore::new(&path)?;
        assert_eq!(store.get_earnings("ping")?.buffer_earnings, 42);
        Ok(())
    }
}
