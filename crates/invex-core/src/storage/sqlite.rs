use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::debug;

use super::{InsertOutcome, InvoiceStore, TenantScope};
use crate::error::StorageError;
use crate::models::invoice::InvoiceRecord;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS invoices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id TEXT NOT NULL,
        file_id TEXT NOT NULL UNIQUE,
        file_name TEXT NOT NULL,
        invoice_number TEXT NOT NULL,
        invoice_date TEXT NOT NULL,
        gst_number TEXT NOT NULL,
        vendor_name TEXT NOT NULL,
        description TEXT NOT NULL,
        total_amount TEXT NOT NULL,
        raw_text TEXT NOT NULL,
        extraction_method TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_invoices_tenant ON invoices(tenant_id);
";

const SELECT_COLUMNS: &str = "SELECT tenant_id, file_id, file_name, invoice_number, invoice_date, gst_number,
            vendor_name, description, total_amount, raw_text, extraction_method
     FROM invoices";

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened record store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

/// Row as stored, before the amount is decoded.
struct StoredRow {
    record: InvoiceRecord,
    total_amount: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    let mut record = InvoiceRecord::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?);
    record.tenant_id = row.get(0)?;
    record.invoice_number = row.get(3)?;
    record.invoice_date = row.get(4)?;
    record.gst_number = row.get(5)?;
    record.vendor_name = row.get(6)?;
    record.description = row.get(7)?;
    record.raw_text = row.get(9)?;
    record.extraction_method = row.get(10)?;
    Ok(StoredRow {
        record,
        total_amount: row.get(8)?,
    })
}

fn decode(row: StoredRow) -> Result<InvoiceRecord, StorageError> {
    let mut record = row.record;
    record.total_amount = Decimal::from_str(&row.total_amount).map_err(|_| StorageError::Corrupt {
        column: "total_amount".into(),
        value: row.total_amount.clone(),
    })?;
    Ok(record)
}

#[async_trait]
impl InvoiceStore for SqliteStore {
    async fn exists(&self, file_id: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM invoices WHERE file_id = ?1", params![file_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert(&self, record: &InvoiceRecord, tenant_id: &str) -> Result<InsertOutcome, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO invoices (
                tenant_id, file_id, file_name, invoice_number, invoice_date, gst_number,
                vendor_name, description, total_amount, raw_text, extraction_method, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                tenant_id,
                record.file_id,
                record.file_name,
                record.invoice_number,
                record.invoice_date,
                record.gst_number,
                record.vendor_name,
                record.description,
                record.total_amount.to_string(),
                record.raw_text,
                record.extraction_method,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(if changed == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn read(&self, scope: &TenantScope) -> Result<Vec<InvoiceRecord>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let rows = match scope {
            TenantScope::Tenant(tenant) => {
                let mut stmt = conn.prepare(&format!("{} WHERE tenant_id = ?1 ORDER BY id", SELECT_COLUMNS))?;
                let rows = stmt
                    .query_map(params![tenant], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            TenantScope::All => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
                let rows = stmt.query_map([], map_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        rows.into_iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(file_id: &str) -> InvoiceRecord {
        let mut record = InvoiceRecord::new(file_id, format!("{}.pdf", file_id));
        record.vendor_name = "Acme Co".into();
        record.invoice_date = "05-Jan-2024".into();
        record.total_amount = Decimal::from_str("1234.50").unwrap();
        record.extraction_method = "AI (groq)".into();
        record
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_file() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(store.insert(&record("f1"), "t1").await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&record("f1"), "t1").await.unwrap(), InsertOutcome::Duplicate);
        assert!(store.exists("f1").await.unwrap());
        assert!(!store.exists("f2").await.unwrap());
        assert_eq!(store.read(&TenantScope::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_round_trips_amount_and_tenant() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record("f1"), "t1").await.unwrap();
        store.insert(&record("f2"), "t2").await.unwrap();

        let stored = store.read(&TenantScope::Tenant("t2".into())).await.unwrap();
        assert_eq!(stored.len(), 1);
        let mut expected = record("f2");
        expected.tenant_id = "t2".into();
        assert_eq!(stored[0], expected);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("invoices.db");

        SqliteStore::open(&path).unwrap().insert(&record("f1"), "t1").await.unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened.exists("f1").await.unwrap());
    }
}
