//! Local SQLite mirror of the catalog and of bookings.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations and the
//! [`LocalStore`] port the booking core writes through. Every mutating call
//! runs as one statement or one transaction behind the connection mutex.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{error, info, trace, warn};

use crate::error::StoreError;
use crate::models::{Booking, BookingKind, BookingOrigin, Product, ProductId};

pub const DB_FILE_NAME: &str = "warenbuchung.db";

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

pub trait LocalStore: Send + Sync {
    fn products(&self) -> Result<Vec<Product>, StoreError>;
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    /// Upsert by id.
    fn save_product(&self, product: &Product) -> Result<(), StoreError>;
    /// Upsert a batch in one transaction.
    fn save_products(&self, products: &[Product]) -> Result<usize, StoreError>;

    /// Newest first; `None` lists both kinds.
    fn bookings(&self, kind: Option<BookingKind>) -> Result<Vec<Booking>, StoreError>;
    fn booking(&self, id: &str) -> Result<Option<Booking>, StoreError>;
    /// Upsert by id without touching stock. `local_only` decides the stored
    /// origin.
    fn save_booking(&self, booking: &Booking, local_only: bool) -> Result<(), StoreError>;
    /// Upsert a batch of remote-confirmed bookings in one transaction.
    fn save_bookings(&self, bookings: &[Booking]) -> Result<usize, StoreError>;
    /// Upsert a freshly written booking and, when the row is new, apply its
    /// stock movement to the mirrored product in the same transaction.
    /// Returns whether the row was inserted.
    fn commit_booking(&self, booking: &Booking) -> Result<bool, StoreError>;
    /// Swap `old_id` for `replacement` atomically.
    fn replace_booking(&self, old_id: &str, replacement: &Booking) -> Result<(), StoreError>;
    /// Delete and revert the stock movement. Returns whether a row existed.
    fn delete_booking(&self, id: &str) -> Result<bool, StoreError>;

    /// Drop everything and recreate an empty schema.
    fn reset(&self) -> Result<(), StoreError>;
    /// Delete all rows, keeping the schema.
    fn clear(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

/// Open the store at `{data_dir}/warenbuchung.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<SqliteStore, StoreError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| StoreError::Sqlite(format!("failed to create data dir: {e}")))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!(path = %db_path.display(), "opening local store");

    let conn = match open_and_configure(&db_path).and_then(|c| run_migrations(&c).map(|_| c)) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(error = %first_err, "local store open failed, deleting and retrying once");
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            let conn = open_and_configure(&db_path)?;
            run_migrations(&conn)?;
            conn
        }
    };

    info!(schema_version = CURRENT_SCHEMA_VERSION, "local store initialized");

    Ok(SqliteStore {
        conn: Mutex::new(conn),
        db_path: Some(db_path),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        trace!(version = current, "local store schema up to date");
        return Ok(());
    }

    info!(from = current, to = CURRENT_SCHEMA_VERSION, "migrating local store");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: mirrored catalog and bookings.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY,
            sku TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            unit TEXT,
            price REAL NOT NULL DEFAULT 0,
            stock_quantity INTEGER NOT NULL DEFAULT 0,
            location_stock REAL NOT NULL DEFAULT 0,
            default_supplier TEXT,
            item_type TEXT,
            created_at TEXT,
            updated_at TEXT,
            last_synced TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('inbound', 'outbound')),
            product_id INTEGER NOT NULL,
            product_name TEXT NOT NULL,
            quantity REAL NOT NULL,
            unit_price REAL NOT NULL,
            total_price REAL NOT NULL,
            type_tag TEXT,
            reference TEXT,
            location TEXT,
            supplier TEXT,
            batch_number TEXT,
            expiry_date TEXT,
            notes TEXT,
            reason TEXT,
            project_name TEXT,
            justification TEXT,
            created_at TEXT NOT NULL,
            origin TEXT NOT NULL CHECK (origin IN ('remote', 'local_pending'))
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!(error = %e, "migration v1 failed");
        StoreError::from(e)
    })?;

    info!("Applied migration v1 (products, bookings)");
    Ok(())
}

/// Migration v2: lookup indexes for history and per-kind lists.
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_bookings_product
            ON bookings(product_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_bookings_kind
            ON bookings(kind, created_at);
        CREATE INDEX IF NOT EXISTS idx_bookings_origin
            ON bookings(origin);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!(error = %e, "migration v2 failed");
        StoreError::from(e)
    })?;

    info!("Applied migration v2 (booking indexes)");
    Ok(())
}

const PRODUCT_COLUMNS: &str = "id, sku, name, description, unit, price, stock_quantity, \
     location_stock, default_supplier, item_type, created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, kind, product_id, product_name, quantity, unit_price, \
     total_price, type_tag, reference, location, supplier, batch_number, expiry_date, notes, \
     reason, project_name, justification, created_at, origin";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        sku: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        unit: row.get(4)?,
        price: row.get(5)?,
        stock_quantity: row.get(6)?,
        location_stock: row.get(7)?,
        default_supplier: row.get(8)?,
        item_type: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    let kind_raw: String = row.get(1)?;
    let kind = BookingKind::parse(&kind_raw)
        .ok_or_else(|| conversion_error(1, format!("unknown booking kind {kind_raw:?}")))?;
    let created_raw: String = row.get(17)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(17, format!("bad created_at {created_raw:?}: {e}")))?;
    let origin_raw: String = row.get(18)?;
    let origin = BookingOrigin::parse(&origin_raw)
        .ok_or_else(|| conversion_error(18, format!("unknown origin {origin_raw:?}")))?;

    Ok(Booking {
        id: row.get(0)?,
        kind,
        product_id: row.get(2)?,
        product_name: row.get(3)?,
        quantity: row.get(4)?,
        unit_price: row.get(5)?,
        total_price: row.get(6)?,
        type_tag: row.get(7)?,
        reference: row.get(8)?,
        location: row.get(9)?,
        supplier: row.get(10)?,
        batch_number: row.get(11)?,
        expiry_date: row.get(12)?,
        notes: row.get(13)?,
        reason: row.get(14)?,
        project_name: row.get(15)?,
        justification: row.get(16)?,
        created_at,
        origin,
    })
}

fn upsert_product(conn: &Connection, p: &Product) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO products (id, sku, name, description, unit, price, stock_quantity,
                               location_stock, default_supplier, item_type, created_at,
                               updated_at, last_synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            sku = excluded.sku,
            name = excluded.name,
            description = excluded.description,
            unit = excluded.unit,
            price = excluded.price,
            stock_quantity = excluded.stock_quantity,
            location_stock = excluded.location_stock,
            default_supplier = excluded.default_supplier,
            item_type = excluded.item_type,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            last_synced = excluded.last_synced",
        params![
            p.id,
            p.sku,
            p.name,
            p.description,
            p.unit,
            p.price,
            p.stock_quantity,
            p.location_stock,
            p.default_supplier,
            p.item_type,
            p.created_at,
            p.updated_at,
        ],
    )?;
    Ok(())
}

/// Insert or overwrite a booking row. Returns whether the row was new.
fn upsert_booking(conn: &Connection, b: &Booking, origin: BookingOrigin) -> rusqlite::Result<bool> {
    let existed: bool = conn
        .query_row("SELECT 1 FROM bookings WHERE id = ?1", params![b.id], |_| Ok(()))
        .optional()?
        .is_some();

    conn.execute(
        "INSERT INTO bookings (id, kind, product_id, product_name, quantity, unit_price,
                               total_price, type_tag, reference, location, supplier,
                               batch_number, expiry_date, notes, reason, project_name,
                               justification, created_at, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19)
         ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            product_id = excluded.product_id,
            product_name = excluded.product_name,
            quantity = excluded.quantity,
            unit_price = excluded.unit_price,
            total_price = excluded.total_price,
            type_tag = excluded.type_tag,
            reference = excluded.reference,
            location = excluded.location,
            supplier = excluded.supplier,
            batch_number = excluded.batch_number,
            expiry_date = excluded.expiry_date,
            notes = excluded.notes,
            reason = excluded.reason,
            project_name = excluded.project_name,
            justification = excluded.justification,
            created_at = excluded.created_at,
            origin = excluded.origin",
        params![
            b.id,
            b.kind.as_str(),
            b.product_id,
            b.product_name,
            b.quantity,
            b.unit_price,
            b.total_price,
            b.type_tag,
            b.reference,
            b.location,
            b.supplier,
            b.batch_number,
            b.expiry_date,
            b.notes,
            b.reason,
            b.project_name,
            b.justification,
            b.created_at.to_rfc3339(),
            origin.as_str(),
        ],
    )?;
    Ok(!existed)
}

/// Whole-unit stock movement of a booking; fractions are dropped the way the
/// server drops them.
fn stock_delta(kind: BookingKind, quantity: f64) -> i64 {
    let units = quantity.trunc() as i64;
    match kind {
        BookingKind::Inbound => units,
        BookingKind::Outbound => -units,
    }
}

fn apply_stock_delta(conn: &Connection, product_id: ProductId, delta: i64) -> rusqlite::Result<()> {
    if delta != 0 {
        conn.execute(
            "UPDATE products SET stock_quantity = stock_quantity + ?2 WHERE id = ?1",
            params![product_id, delta],
        )?;
    }
    Ok(())
}

fn origin_for(local_only: bool) -> BookingOrigin {
    if local_only {
        BookingOrigin::LocalPending
    } else {
        BookingOrigin::RemoteConfirmed
    }
}

impl SqliteStore {
    /// Fresh in-memory store with the current schema.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    #[cfg(test)]
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.lock().expect("lock");
        f(&conn)
    }
}

impl LocalStore for SqliteStore {
    fn products(&self) -> Result<Vec<Product>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name COLLATE NOCASE, id"
        ))?;
        let rows = stmt.query_map([], product_from_row)?;
        let products = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(products)
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let conn = self.lock()?;
        let product = conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert_product(&conn, product)?;
        trace!(product_id = product.id, "product mirrored");
        Ok(())
    }

    fn save_products(&self, products: &[Product]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for product in products {
            upsert_product(&tx, product)?;
        }
        tx.commit()?;
        Ok(products.len())
    }

    fn bookings(&self, kind: Option<BookingKind>) -> Result<Vec<Booking>, StoreError> {
        let conn = self.lock()?;
        let bookings = match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings WHERE kind = ?1
                     ORDER BY created_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map(params![kind.as_str()], booking_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map([], booking_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(bookings)
    }

    fn booking(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let conn = self.lock()?;
        let booking = conn
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
                params![id],
                booking_from_row,
            )
            .optional()?;
        Ok(booking)
    }

    fn save_booking(&self, booking: &Booking, local_only: bool) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert_booking(&conn, booking, origin_for(local_only))?;
        trace!(booking_id = %booking.id, local_only, "booking mirrored");
        Ok(())
    }

    fn save_bookings(&self, bookings: &[Booking]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for booking in bookings {
            upsert_booking(&tx, booking, booking.origin)?;
        }
        tx.commit()?;
        Ok(bookings.len())
    }

    fn commit_booking(&self, booking: &Booking) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = upsert_booking(&tx, booking, booking.origin)?;
        if inserted {
            apply_stock_delta(
                &tx,
                booking.product_id,
                stock_delta(booking.kind, booking.quantity),
            )?;
        }
        tx.commit()?;
        trace!(booking_id = %booking.id, inserted, "booking committed to mirror");
        Ok(inserted)
    }

    fn replace_booking(&self, old_id: &str, replacement: &Booking) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bookings WHERE id = ?1", params![old_id])?;
        upsert_booking(&tx, replacement, replacement.origin)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_booking(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing = tx
            .query_row(
                "SELECT kind, product_id, quantity FROM bookings WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, ProductId>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((kind_raw, product_id, quantity)) = existing else {
            return Ok(false);
        };
        let kind = BookingKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown booking kind {kind_raw:?}")))?;
        tx.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
        apply_stock_delta(&tx, product_id, -stock_delta(kind, quantity))?;
        tx.commit()?;
        Ok(true)
    }

    fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS bookings;
             DROP TABLE IF EXISTS products;
             DROP TABLE IF EXISTS schema_version;",
        )?;
        run_migrations(&tx)?;
        tx.commit()?;
        warn!("local store reset");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute_batch("DELETE FROM bookings; DELETE FROM products;")?;
        tx.commit()?;
        info!("local store cleared");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{booking, product};

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_schema_and_are_idempotent() {
        let store = SqliteStore::open_in_memory().expect("store");
        store.with_conn(|conn| {
            let tables = table_names(conn);
            assert!(tables.contains(&"products".to_string()));
            assert!(tables.contains(&"bookings".to_string()));

            run_migrations(conn).expect("second run should succeed");
            let version: i32 = conn
                .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
                .expect("read schema version");
            assert_eq!(version, CURRENT_SCHEMA_VERSION);
        });
    }

    #[test]
    fn test_wal_mode_and_reopen_on_file_db() {
        let dir = std::env::temp_dir().join(format!("warenbuchung_db_{}", uuid::Uuid::new_v4()));
        {
            let store = init(&dir).expect("init");
            assert_eq!(store.db_path(), Some(dir.join(DB_FILE_NAME).as_path()));
            store.save_product(&product(1, 3)).expect("save");
            store.with_conn(|conn| {
                let mode: String = conn
                    .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .expect("read journal_mode");
                assert_eq!(mode.to_lowercase(), "wal");
            });
        }
        let reopened = init(&dir).expect("reopen");
        assert_eq!(reopened.products().expect("products").len(), 1);
        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_replaced_on_init() {
        let dir = std::env::temp_dir().join(format!("warenbuchung_db_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(DB_FILE_NAME), b"definitely not sqlite").expect("write garbage");

        let store = init(&dir).expect("init recovers");
        assert!(store.products().expect("products").is_empty());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_product_upsert_never_duplicates() {
        let store = SqliteStore::open_in_memory().expect("store");
        let mut p = product(7, 5);
        store.save_product(&p).expect("insert");
        p.stock_quantity = 12;
        p.name = "Schraube M10".into();
        store.save_products(&[p.clone()]).expect("upsert");

        let all = store.products().expect("products");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], p);
    }

    #[test]
    fn test_booking_round_trip_preserves_amounts() {
        let store = SqliteStore::open_in_memory().expect("store");
        let mut b = booking("local-a", BookingKind::Inbound, 3, 2.5);
        b.unit_price = 1.2;
        b.total_price = 3.0;
        b.justification = Some("Notfall".into());
        store.save_booking(&b, true).expect("save");

        let loaded = store.booking("local-a").expect("read").expect("present");
        assert_eq!(loaded.quantity, 2.5);
        assert_eq!(loaded.unit_price, 1.2);
        assert_eq!(loaded.total_price, 3.0);
        assert_eq!(loaded.origin, BookingOrigin::LocalPending);
        assert_eq!(loaded, b);
    }

    #[test]
    fn test_save_booking_origin_follows_flag() {
        let store = SqliteStore::open_in_memory().expect("store");
        let b = booking("local-b", BookingKind::Outbound, 1, 1.0);
        store.save_booking(&b, false).expect("save");
        let loaded = store.booking("local-b").expect("read").expect("present");
        assert_eq!(loaded.origin, BookingOrigin::RemoteConfirmed);
    }

    #[test]
    fn test_commit_applies_stock_delta_once() {
        let store = SqliteStore::open_in_memory().expect("store");
        store.save_product(&product(3, 5)).expect("product");
        let b = booking("17", BookingKind::Outbound, 3, 8.0);

        assert!(store.commit_booking(&b).expect("first commit"));
        assert!(!store.commit_booking(&b).expect("second commit"));

        assert_eq!(store.bookings(None).expect("bookings").len(), 1);
        let p = store.product(3).expect("read").expect("present");
        assert_eq!(p.stock_quantity, -3);
    }

    #[test]
    fn test_delete_reverts_stock() {
        let store = SqliteStore::open_in_memory().expect("store");
        store.save_product(&product(3, 5)).expect("product");
        store
            .commit_booking(&booking("9", BookingKind::Inbound, 3, 4.0))
            .expect("commit");
        assert_eq!(store.product(3).expect("read").expect("p").stock_quantity, 9);

        assert!(store.delete_booking("9").expect("delete"));
        assert!(!store.delete_booking("9").expect("delete again"));
        assert_eq!(store.product(3).expect("read").expect("p").stock_quantity, 5);
    }

    #[test]
    fn test_replace_supersedes_pending_row() {
        let store = SqliteStore::open_in_memory().expect("store");
        store.save_product(&product(3, 5)).expect("product");
        let pending = booking("local-x", BookingKind::Inbound, 3, 2.0);
        store.commit_booking(&pending).expect("commit");

        let mut confirmed = pending.clone();
        confirmed.id = "101".into();
        confirmed.origin = BookingOrigin::RemoteConfirmed;
        store.replace_booking("local-x", &confirmed).expect("replace");

        let all = store.bookings(Some(BookingKind::Inbound)).expect("bookings");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "101");
        assert_eq!(store.product(3).expect("read").expect("p").stock_quantity, 7);
    }

    #[test]
    fn test_bookings_filter_by_kind_newest_first() {
        let store = SqliteStore::open_in_memory().expect("store");
        let mut older = booking("1", BookingKind::Inbound, 1, 1.0);
        older.created_at = older.created_at - chrono::Duration::hours(1);
        store.save_booking(&older, false).expect("save");
        store
            .save_booking(&booking("2", BookingKind::Inbound, 1, 1.0), false)
            .expect("save");
        store
            .save_booking(&booking("3", BookingKind::Outbound, 1, 1.0), false)
            .expect("save");

        let inbound = store.bookings(Some(BookingKind::Inbound)).expect("inbound");
        let ids: Vec<_> = inbound.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(store.bookings(None).expect("all").len(), 3);
    }

    #[test]
    fn test_reset_leaves_valid_empty_store() {
        let store = SqliteStore::open_in_memory().expect("store");
        store.save_product(&product(1, 1)).expect("product");
        store.with_conn(|conn| conn.execute_batch("DROP TABLE bookings;").expect("drop"));
        assert!(store.bookings(None).is_err());

        store.reset().expect("reset");
        assert!(store.products().expect("products").is_empty());
        assert!(store.bookings(None).expect("bookings").is_empty());
    }

    #[test]
    fn test_clear_keeps_schema() {
        let store = SqliteStore::open_in_memory().expect("store");
        store.save_product(&product(1, 1)).expect("product");
        store
            .save_booking(&booking("1", BookingKind::Inbound, 1, 1.0), false)
            .expect("booking");
        store.clear().expect("clear");
        assert!(store.products().expect("products").is_empty());
        assert!(store.bookings(None).expect("bookings").is_empty());
    }

    #[test]
    fn test_unknown_origin_is_reported_as_corrupt() {
        let store = SqliteStore::open_in_memory().expect("store");
        store
            .save_booking(&booking("1", BookingKind::Inbound, 1, 1.0), false)
            .expect("booking");
        store.with_conn(|conn| {
            conn.execute_batch(
                "PRAGMA ignore_check_constraints = ON;
                 UPDATE bookings SET origin = 'queued' WHERE id = '1';",
            )
            .expect("tamper")
        });
        assert!(matches!(store.bookings(None), Err(StoreError::Corrupt(_))));
    }
}
