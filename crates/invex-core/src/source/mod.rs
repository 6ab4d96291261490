//! File source collaborator: where documents are listed, fetched and filed.

mod local;

pub use local::{LocalFolderSource, mime_for_extension};

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::document::FileDescriptor;
use crate::retry::RetryPolicy;

/// Listing, download and move operations of a document store.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Files directly inside `folder`.
    async fn list(&self, folder: &str) -> Result<Vec<FileDescriptor>, SourceError>;

    /// Raw bytes of a file.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, SourceError>;

    /// Move a file into the `destination` folder.
    async fn move_to(&self, file_id: &str, name: &str, destination: &str) -> Result<(), SourceError>;
}

/// Wraps a source so transient failures are retried with backoff.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: FileSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: FileSource> FileSource for RetryingSource<S> {
    async fn list(&self, folder: &str) -> Result<Vec<FileDescriptor>, SourceError> {
        self.policy.run("list", || self.inner.list(folder)).await
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        self.policy.run("download", || self.inner.download(file_id)).await
    }

    async fn move_to(&self, file_id: &str, name: &str, destination: &str) -> Result<(), SourceError> {
        self.policy
            .run("move", || self.inner.move_to(file_id, name, destination))
            .await
    }
}
