use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::FileSource;
use crate::error::SourceError;
use crate::models::document::{FileDescriptor, FileKind};

/// Hex characters of the content digest carried in a file id.
const DIGEST_LEN: usize = 16;

/// A directory on disk acting as a file source.
///
/// File ids are `<relative path>#<content digest>`. The same bytes under the
/// same name always get the same id, while a new file reusing an old name
/// gets a new one, so the id can serve as the dedup key.
#[derive(Debug, Clone)]
pub struct LocalFolderSource {
    root: PathBuf,
}

impl LocalFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file id or folder under the root, refusing escapes.
    fn resolve(&self, id: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(strip_digest(id));
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(SourceError::NotFound(relative.display().to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// MIME type for a lowercased extension, empty when unknown.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match FileKind::detect("", extension) {
        FileKind::Pdf => "application/pdf",
        FileKind::Image(format) => format.mime_type(),
        FileKind::Csv => "text/csv",
        FileKind::Spreadsheet if extension == "xls" => "application/vnd.ms-excel",
        FileKind::Spreadsheet if extension == "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        FileKind::Spreadsheet => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        FileKind::WordDocument => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        FileKind::PlainText => "text/plain",
        FileKind::Unknown => "",
    }
}

/// Leading hex of the SHA-256 of `data`.
fn content_digest(data: &[u8]) -> String {
    let mut digest = format!("{:x}", Sha256::digest(data));
    digest.truncate(DIGEST_LEN);
    digest
}

/// File id for a relative path and its contents.
fn file_id(relative: &Path, data: &[u8]) -> String {
    format!("{}#{}", relative.to_string_lossy(), content_digest(data))
}

/// Path part of a file id; ids without a digest are plain paths.
fn strip_digest(id: &str) -> &str {
    match id.rsplit_once('#') {
        Some((path, digest)) if digest.len() == DIGEST_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit()) => path,
        _ => id,
    }
}

/// `<stem>_<unix seconds><.ext>`, so repeated moves never collide.
fn timestamped_name(name: &str, timestamp: i64) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext),
        None => format!("{}_{}", stem, timestamp),
    }
}

fn not_found(path: &Path, error: std::io::Error) -> SourceError {
    if error.kind() == std::io::ErrorKind::NotFound {
        SourceError::NotFound(path.display().to_string())
    } else {
        SourceError::Io(error)
    }
}

#[async_trait]
impl FileSource for LocalFolderSource {
    async fn list(&self, folder: &str) -> Result<Vec<FileDescriptor>, SourceError> {
        let dir = self.resolve(folder)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| not_found(&dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let data = tokio::fs::read(&path).await.map_err(|e| not_found(&path, e))?;
            let id = file_id(&Path::new(folder).join(&name), &data);
            let mut descriptor = FileDescriptor::new(id, name, "");
            descriptor.type_hint = mime_for_extension(&descriptor.extension()).to_string();
            files.push(descriptor);
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(folder = %dir.display(), count = files.len(), "listed folder");
        Ok(files)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(file_id)?;
        tokio::fs::read(&path).await.map_err(|e| not_found(&path, e))
    }

    async fn move_to(&self, file_id: &str, name: &str, destination: &str) -> Result<(), SourceError> {
        let from = self.resolve(file_id)?;
        let dir = self.resolve(destination)?;
        tokio::fs::create_dir_all(&dir).await?;

        let to = dir.join(timestamped_name(name, chrono::Utc::now().timestamp()));
        tokio::fs::rename(&from, &to).await.map_err(|e| not_found(&from, e))?;
        debug!(from = %from.display(), to = %to.display(), "moved file");
        Ok(())
    }
}
