use std::sync::Mutex;

use dashmap::DashMap;
use rusqlite::Connection;

use crate::error::StoreError;
use crate::order::{NewOrder, Order, OrderStatus, TransitionExtra};

/// Durable key-value record of orders, keyed by correlation id.
///
/// Implementations must be thread-safe (`Send + Sync`). The compare-and-swap
/// contract of [`transition`](OrderStore::transition) is what serializes
/// concurrent webhook deliveries for the same order — there is no lock
/// manager above this.
pub trait OrderStore: Send + Sync {
    /// Atomic check-and-insert keyed by `correlation_id`. When a record
    /// already exists it is returned untouched with `false` — this is what
    /// makes webhook replays idempotent.
    fn create_if_absent(&self, new: NewOrder) -> Result<(Order, bool), StoreError>;

    /// Conditional update that only succeeds while the stored status still
    /// equals `from`. Returns [`StoreError::Conflict`] when another writer
    /// already advanced the order, [`StoreError::NotFound`] when absent.
    fn transition(
        &self,
        correlation_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        extra: TransitionExtra,
    ) -> Result<Order, StoreError>;

    fn get(&self, correlation_id: &str) -> Result<Order, StoreError>;
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// In-memory store backed by DashMap. Fast but lost on restart; intended for
/// tests and ephemeral runs.
pub struct InMemoryOrderStore {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn create_if_absent(&self, new: NewOrder) -> Result<(Order, bool), StoreError> {
        // DashMap's entry API provides the check-and-insert atomically.
        use dashmap::mapref::entry::Entry;
        match self.orders.entry(new.correlation_id.clone()) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                let now = unix_now();
                let order = Order {
                    correlation_id: new.correlation_id,
                    wallet: new.wallet,
                    quantity: new.quantity,
                    status: OrderStatus::Created,
                    failure_reason: None,
                    last_tx: None,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(order.clone());
                Ok((order, true))
            }
        }
    }

    fn transition(
        &self,
        correlation_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        extra: TransitionExtra,
    ) -> Result<Order, StoreError> {
        // get_mut holds the shard lock, so check-and-set is atomic.
        let mut entry = self
            .orders
            .get_mut(correlation_id)
            .ok_or_else(|| StoreError::NotFound(correlation_id.to_string()))?;

        if entry.status != from {
            return Err(StoreError::Conflict {
                correlation_id: correlation_id.to_string(),
                expected: from,
                actual: entry.status,
            });
        }

        entry.status = to;
        if let Some(reason) = extra.failure_reason {
            entry.failure_reason = Some(reason);
        }
        if let Some(tx) = extra.last_tx {
            entry.last_tx = Some(tx);
        }
        entry.updated_at = unix_now();
        Ok(entry.clone())
    }

    fn get(&self, correlation_id: &str) -> Result<Order, StoreError> {
        self.orders
            .get(correlation_id)
            .map(|o| o.clone())
            .ok_or_else(|| StoreError::NotFound(correlation_id.to_string()))
    }
}

/// Persistent order store backed by SQLite. Survives restarts; the primary
/// key on `correlation_id` and conditional UPDATEs give atomicity at the
/// database level, safe across processes.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Open (or create) the order database at the given path.
    ///
    /// On Unix the file permissions are restricted to 0600 so other system
    /// users cannot read order and wallet data.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                correlation_id TEXT PRIMARY KEY,
                wallet         TEXT NOT NULL,
                quantity       TEXT NOT NULL,
                status         TEXT NOT NULL,
                failure_reason TEXT,
                last_tx        TEXT,
                created_at     INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            PRAGMA journal_mode=WAL;",
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set order database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("order store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn query_order(conn: &Connection, correlation_id: &str) -> Result<Option<Order>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT correlation_id, wallet, quantity, status, failure_reason, last_tx,
                created_at, updated_at
         FROM orders WHERE correlation_id = ?1",
    )?;
    let mut rows = stmt.query([correlation_id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let status_raw: String = row.get(3)?;
    let status = OrderStatus::parse(&status_raw).ok_or_else(|| {
        StoreError::Backend(format!(
            "unknown status {status_raw:?} stored for order {correlation_id}"
        ))
    })?;

    Ok(Some(Order {
        correlation_id: row.get(0)?,
        wallet: row.get(1)?,
        quantity: row.get(2)?,
        status,
        failure_reason: row.get(4)?,
        last_tx: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    }))
}

impl OrderStore for SqliteOrderStore {
    fn create_if_absent(&self, new: NewOrder) -> Result<(Order, bool), StoreError> {
        let conn = self.lock();
        let now = unix_now();

        // INSERT OR IGNORE leaves an existing row untouched; the PRIMARY KEY
        // constraint makes the check-and-insert atomic.
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO orders
                 (correlation_id, wallet, quantity, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                new.correlation_id,
                new.wallet,
                new.quantity,
                OrderStatus::Created.as_str(),
                now
            ],
        )?;

        let order = query_order(&conn, &new.correlation_id)?
            .ok_or_else(|| StoreError::NotFound(new.correlation_id.clone()))?;
        Ok((order, inserted == 1))
    }

    fn transition(
        &self,
        correlation_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        extra: TransitionExtra,
    ) -> Result<Order, StoreError> {
        let conn = self.lock();

        let updated = conn.execute(
            "UPDATE orders
             SET status = ?1,
                 failure_reason = COALESCE(?2, failure_reason),
                 last_tx = COALESCE(?3, last_tx),
                 updated_at = ?4
             WHERE correlation_id = ?5 AND status = ?6",
            rusqlite::params![
                to.as_str(),
                extra.failure_reason,
                extra.last_tx,
                unix_now(),
                correlation_id,
                from.as_str()
            ],
        )?;

        let order = query_order(&conn, correlation_id)?
            .ok_or_else(|| StoreError::NotFound(correlation_id.to_string()))?;

        if updated == 0 {
            return Err(StoreError::Conflict {
                correlation_id: correlation_id.to_string(),
                expected: from,
                actual: order.status,
            });
        }
        Ok(order)
    }

    fn get(&self, correlation_id: &str) -> Result<Order, StoreError> {
        let conn = self.lock();
        query_order(&conn, correlation_id)?
            .ok_or_else(|| StoreError::NotFound(correlation_id.to_string()))
    }
}
