use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{InsertOutcome, InvoiceStore, TenantScope};
use crate::error::StorageError;
use crate::models::invoice::InvoiceRecord;

#[derive(Default)]
struct Inner {
    file_ids: HashSet<String>,
    records: Vec<InvoiceRecord>,
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn exists(&self, file_id: &str) -> Result<bool, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.file_ids.contains(file_id))
    }

    async fn insert(&self, record: &InvoiceRecord, tenant_id: &str) -> Result<InsertOutcome, StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        if !inner.file_ids.insert(record.file_id.clone()) {
            return Ok(InsertOutcome::Duplicate);
        }
        let mut stored = record.clone();
        stored.tenant_id = tenant_id.to_string();
        inner.records.push(stored);
        Ok(InsertOutcome::Inserted)
    }

    async fn read(&self, scope: &TenantScope) -> Result<Vec<InvoiceRecord>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner
            .records
            .iter()
            .filter(|r| scope.includes(&r.tenant_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_second_insert_is_duplicate() {
        let store = MemoryStore::new();
        let record = InvoiceRecord::new("file-1", "a.pdf");

        assert!(!store.exists("file-1").await.unwrap());
        assert_eq!(store.insert(&record, "t1").await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&record, "t2").await.unwrap(), InsertOutcome::Duplicate);
        assert!(store.exists("file-1").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_by_tenant() {
        let store = MemoryStore::new();
        store.insert(&InvoiceRecord::new("a", "a.pdf"), "t1").await.unwrap();
        store.insert(&InvoiceRecord::new("b", "b.pdf"), "t2").await.unwrap();

        let t1 = store.read(&TenantScope::Tenant("t1".into())).await.unwrap();
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].tenant_id, "t1");
        assert_eq!(store.read(&TenantScope::All).await.unwrap().len(), 2);
    }
}
