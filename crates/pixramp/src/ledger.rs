use std::sync::Mutex;

use alloy::primitives::TxHash;
use rusqlite::Connection;

use crate::executor::TransactionRecord;

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Bookkeeping of confirmed transactions, deduplicated by hash.
///
/// This sits beside the payout path, not inside it: a recording failure is
/// logged and never fails a payout, and re-processing a webhook can never
/// double-record because the transaction hash is the primary key. The table
/// survives restarts, so ingestion can resume from where it left off.
pub struct TransferLedger {
    conn: Mutex<Connection>,
}

impl TransferLedger {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory ledger for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chain_events (
                tx_hash        TEXT PRIMARY KEY,
                correlation_id TEXT NOT NULL,
                step           TEXT NOT NULL,
                target         TEXT NOT NULL,
                recorded_at    INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chain_events_order ON chain_events(correlation_id);
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("transfer ledger mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Record a confirmed transaction for an order step. Returns `true` when
    /// newly recorded, `false` when the hash was already present (duplicate
    /// delivery). Errors are logged, never propagated.
    pub fn record(&self, correlation_id: &str, step: &str, record: &TransactionRecord) -> bool {
        let conn = self.lock();
        match conn.execute(
            "INSERT OR IGNORE INTO chain_events
                 (tx_hash, correlation_id, step, target, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                format!("{}", record.tx_hash),
                correlation_id,
                step,
                format!("{}", record.to),
                unix_now()
            ],
        ) {
            Ok(inserted) => inserted == 1,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    correlation_id,
                    step,
                    tx = %record.tx_hash,
                    "failed to record chain event"
                );
                false
            }
        }
    }

    pub fn recorded(&self, tx_hash: &TxHash) -> bool {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chain_events WHERE tx_hash = ?1",
                [format!("{tx_hash}")],
                |row| row.get(0),
            )
            .unwrap_or(0);
        count > 0
    }

    /// Number of recorded events for one order, across all steps.
    pub fn events_for(&self, correlation_id: &str) -> usize {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chain_events WHERE correlation_id = ?1",
                [correlation_id],
                |row| row.get(0),
            )
            .unwrap_or(0);
        count as usize
    }
}
