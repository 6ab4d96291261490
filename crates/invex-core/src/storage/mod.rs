//! Record persistence.
//!
//! Stores are keyed by source file id: inserting a record whose file was
//! already ingested is a no-op, so re-running a folder never duplicates.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::invoice::InvoiceRecord;

/// Whether an insert stored a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Which records to read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    Tenant(String),
    All,
}

impl TenantScope {
    pub fn includes(&self, tenant_id: &str) -> bool {
        match self {
            TenantScope::Tenant(t) => t == tenant_id,
            TenantScope::All => true,
        }
    }
}

/// Record store contract.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// True when a record for this source file exists, for any tenant.
    async fn exists(&self, file_id: &str) -> Result<bool, StorageError>;

    /// Store `record` under `tenant_id`; a duplicate file id is left untouched.
    async fn insert(&self, record: &InvoiceRecord, tenant_id: &str) -> Result<InsertOutcome, StorageError>;

    /// Records in insertion order.
    async fn read(&self, scope: &TenantScope) -> Result<Vec<InvoiceRecord>, StorageError>;
}
