//! SQLite-backed directory and message store.
//!
//! One connection behind a mutex. Every call is a short statement, so
//! contention stays low for the request volumes the daemon serves.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use patrol_core::model::{
    now_millis, GeoPoint, Message, NewAssignment, NewMessage, OrderStatus, Role, ServiceOrder,
    TaskAssignment, User,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::store::{
    check_new_assignment, check_order_client, Directory, DirectoryCounts, MessageRepository,
    StoreError,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL,
    role       TEXT    NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS service_orders (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id  INTEGER NOT NULL REFERENCES users(id),
    status     TEXT    NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS task_assignments (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id  INTEGER NOT NULL REFERENCES service_orders(id),
    agent_id  INTEGER NOT NULL REFERENCES users(id),
    starts_at INTEGER,
    ends_at   INTEGER,
    latitude  REAL    NOT NULL,
    longitude REAL    NOT NULL,
    removed   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_assignments_order_agent
    ON task_assignments(order_id, agent_id);
CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id   INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL,
    order_id    INTEGER NOT NULL,
    content     TEXT    NOT NULL,
    sent_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_order ON messages(order_id, id);
";

/// Directory + message repository over a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────────

/// SQLite integers are signed. An id above `i64::MAX` names no row.
fn lookup_id(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

fn to_sql_id(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id)
        .map_err(|_| StoreError::Backend(format!("{id} exceeds the sqlite integer range")))
}

fn to_sql_time(millis: u64) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn inserted_id(conn: &Connection) -> Result<u64, StoreError> {
    let rowid = conn.last_insert_rowid();
    u64::try_from(rowid).map_err(|_| StoreError::Backend(format!("negative rowid {rowid}")))
}

fn column_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn column_opt_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(value) => u64::try_from(value)
            .map(Some)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value)),
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: column_u64(row, 0)?,
        name: row.get(1)?,
        role: parse_column::<Role>(row, 2)?,
        created_at: column_u64(row, 3)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceOrder> {
    Ok(ServiceOrder {
        id: column_u64(row, 0)?,
        client_id: column_u64(row, 1)?,
        status: parse_column::<OrderStatus>(row, 2)?,
        created_at: column_u64(row, 3)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<TaskAssignment> {
    Ok(TaskAssignment {
        id: column_u64(row, 0)?,
        order_id: column_u64(row, 1)?,
        agent_id: column_u64(row, 2)?,
        starts_at: column_opt_u64(row, 3)?,
        ends_at: column_opt_u64(row, 4)?,
        point: GeoPoint {
            latitude: row.get(5)?,
            longitude: row.get(6)?,
        },
        removed: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: column_u64(row, 0)?,
        sender_id: column_u64(row, 1)?,
        receiver_id: column_u64(row, 2)?,
        order_id: column_u64(row, 3)?,
        content: row.get(4)?,
        sent_at: column_u64(row, 5)?,
    })
}

const ASSIGNMENT_COLUMNS: &str =
    "id, order_id, agent_id, starts_at, ends_at, latitude, longitude, removed";

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, order_id, content, sent_at";

// ── Directory ─────────────────────────────────────────────────────────────────

impl Directory for SqliteStore {
    fn register_user(&self, name: &str, role: Role) -> Result<User, StoreError> {
        let created_at = now_millis();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, role, created_at) VALUES (?1, ?2, ?3)",
            params![name, role.as_str(), to_sql_time(created_at)],
        )?;
        Ok(User {
            id: inserted_id(&conn)?,
            name: name.to_string(),
            role,
            created_at,
        })
    }

    fn user(&self, id: u64) -> Result<Option<User>, StoreError> {
        let Some(sql_id) = lookup_id(id) else {
            return Ok(None);
        };
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, role, created_at FROM users WHERE id = ?1",
                params![sql_id],
                user_from_row,
            )
            .optional()?)
    }

    fn create_order(&self, client_id: u64) -> Result<ServiceOrder, StoreError> {
        check_order_client(self, client_id)?;
        let created_at = now_millis();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO service_orders (client_id, status, created_at) VALUES (?1, ?2, ?3)",
            params![
                to_sql_id(client_id)?,
                OrderStatus::Pending.as_str(),
                to_sql_time(created_at)
            ],
        )?;
        Ok(ServiceOrder {
            id: inserted_id(&conn)?,
            client_id,
            status: OrderStatus::Pending,
            created_at,
        })
    }

    fn order(&self, id: u64) -> Result<Option<ServiceOrder>, StoreError> {
        let Some(sql_id) = lookup_id(id) else {
            return Ok(None);
        };
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, client_id, status, created_at FROM service_orders WHERE id = ?1",
                params![sql_id],
                order_from_row,
            )
            .optional()?)
    }

    fn set_order_status(&self, id: u64, status: OrderStatus) -> Result<ServiceOrder, StoreError> {
        let sql_id = lookup_id(id).ok_or(StoreError::NotFound("order"))?;
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE service_orders SET status = ?1 WHERE id = ?2",
                params![status.as_str(), sql_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("order"));
            }
        }
        self.order(id)?.ok_or(StoreError::NotFound("order"))
    }

    fn assign_agent(&self, new: NewAssignment) -> Result<TaskAssignment, StoreError> {
        check_new_assignment(self, &new)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_assignments
                (order_id, agent_id, starts_at, ends_at, latitude, longitude, removed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                to_sql_id(new.order_id)?,
                to_sql_id(new.agent_id)?,
                new.starts_at.map(to_sql_time),
                new.ends_at.map(to_sql_time),
                new.point.latitude,
                new.point.longitude,
            ],
        )?;
        Ok(TaskAssignment {
            id: inserted_id(&conn)?,
            order_id: new.order_id,
            agent_id: new.agent_id,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            point: new.point,
            removed: false,
        })
    }

    fn remove_assignment(&self, id: u64) -> Result<TaskAssignment, StoreError> {
        let sql_id = lookup_id(id).ok_or(StoreError::NotFound("assignment"))?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE task_assignments SET removed = 1 WHERE id = ?1",
            params![sql_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("assignment"));
        }
        Ok(conn.query_row(
            &format!("SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE id = ?1"),
            params![sql_id],
            assignment_from_row,
        )?)
    }

    fn assignments_for_order(&self, order_id: u64) -> Result<Vec<TaskAssignment>, StoreError> {
        let Some(sql_order) = lookup_id(order_id) else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE order_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![sql_order], assignment_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn has_active_assignment(
        &self,
        order_id: u64,
        agent_id: u64,
        now: u64,
    ) -> Result<bool, StoreError> {
        let (Some(sql_order), Some(sql_agent)) = (lookup_id(order_id), lookup_id(agent_id)) else {
            return Ok(false);
        };
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM task_assignments
                 WHERE order_id = ?1 AND agent_id = ?2 AND removed = 0
                   AND (ends_at IS NULL OR ends_at > ?3)
                 LIMIT 1",
                params![sql_order, sql_agent, to_sql_time(now)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn counts(&self) -> Result<DirectoryCounts, StoreError> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<usize, StoreError> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok(usize::try_from(n).unwrap_or_default())
        };
        Ok(DirectoryCounts {
            users: count("users")?,
            orders: count("service_orders")?,
            assignments: count("task_assignments")?,
        })
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

impl MessageRepository for SqliteStore {
    fn insert(&self, new: NewMessage) -> Result<Message, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (sender_id, receiver_id, order_id, content, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                to_sql_id(new.sender_id)?,
                to_sql_id(new.receiver_id)?,
                to_sql_id(new.order_id)?,
                new.content,
                to_sql_time(new.sent_at),
            ],
        )?;
        Ok(Message {
            id: inserted_id(&conn)?,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            order_id: new.order_id,
            content: new.content,
            sent_at: new.sent_at,
        })
    }

    fn for_order(&self, order_id: u64) -> Result<Vec<Message>, StoreError> {
        let Some(sql_order) = lookup_id(order_id) else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE order_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![sql_order], message_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn conversation(&self, order_id: u64, a: u64, b: u64) -> Result<Vec<Message>, StoreError> {
        let (Some(sql_order), Some(sql_a), Some(sql_b)) =
            (lookup_id(order_id), lookup_id(a), lookup_id(b))
        else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE order_id = ?1
               AND ((sender_id = ?2 AND receiver_id = ?3) OR (sender_id = ?3 AND receiver_id = ?2))
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![sql_order, sql_a, sql_b], message_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}
