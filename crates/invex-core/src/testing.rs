//! Testing utilities: scripted stand-ins for the model, vision and file
//! source collaborators, so the pipeline can be exercised without network
//! calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ProviderError, SourceError};
use crate::llm::LanguageModel;
use crate::models::document::FileDescriptor;
use crate::source::{FileSource, mime_for_extension};
use crate::vision::{ImageInput, VisionBackend};

/// A language model answering from a script.
///
/// Replies are consumed in order; the last one keeps being returned once the
/// queue is down to it.
pub struct MockLanguageModel {
    id: String,
    replies: RwLock<VecDeque<String>>,
    fail: bool,
    prompts: RwLock<Vec<String>>,
}

impl MockLanguageModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            replies: RwLock::new(VecDeque::new()),
            fail: false,
            prompts: RwLock::new(Vec::new()),
        }
    }

    /// Queue a reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.write().unwrap().push_back(text.into());
        self
    }

    /// Answer every call with a server error.
    pub fn fail_always(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.read().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.write().unwrap().push(prompt.to_string());

        if self.fail {
            return Err(ProviderError::Http {
                provider: self.id.clone(),
                status: 503,
                body: "service unavailable".into(),
            });
        }

        let mut replies = self.replies.write().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        reply.ok_or_else(|| ProviderError::EmptyResponse(self.id.clone()))
    }
}

/// How a [`MockVision`] variant answers.
#[derive(Debug, Clone)]
pub enum VisionReply {
    Text(String),
    Empty,
    Fail,
    RateLimited,
    Unsupported,
}

/// A vision tier with scripted per-variant answers. Unscripted variants fail.
pub struct MockVision {
    name: String,
    variants: Vec<String>,
    replies: HashMap<String, VisionReply>,
    calls: RwLock<Vec<String>>,
}

impl MockVision {
    pub fn new(name: impl Into<String>, variants: &[&str]) -> Self {
        Self {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            replies: HashMap::new(),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn on(mut self, variant: impl Into<String>, reply: VisionReply) -> Self {
        self.replies.insert(variant.into(), reply);
        self
    }

    /// Variants called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl VisionBackend for MockVision {
    fn name(&self) -> &str {
        &self.name
    }

    fn variants(&self) -> Vec<String> {
        self.variants.clone()
    }

    async fn read_image(&self, variant: &str, _image: &ImageInput, _instruction: &str) -> Result<String, ProviderError> {
        self.calls.write().unwrap().push(variant.to_string());

        match self.replies.get(variant).cloned().unwrap_or(VisionReply::Fail) {
            VisionReply::Text(text) => Ok(text),
            VisionReply::Empty => Ok(String::new()),
            VisionReply::Fail => Err(ProviderError::Transport {
                provider: self.name.clone(),
                message: format!("{} failed", variant),
            }),
            VisionReply::RateLimited => Err(ProviderError::RateLimited {
                provider: self.name.clone(),
            }),
            VisionReply::Unsupported => Err(ProviderError::UnsupportedModel {
                provider: self.name.clone(),
                model: variant.to_string(),
            }),
        }
    }
}

/// In-memory file source with injectable download failures.
#[derive(Default)]
pub struct MockFileSource {
    descriptors: Vec<FileDescriptor>,
    contents: HashMap<String, Vec<u8>>,
    failures: RwLock<HashMap<String, (u16, u32)>>,
    panics: HashSet<String>,
    downloads: RwLock<HashMap<String, u32>>,
    moves: RwLock<Vec<(String, String)>>,
}

impl MockFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, id: impl Into<String>, name: impl Into<String>, content: Vec<u8>) -> Self {
        let id = id.into();
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let descriptor = FileDescriptor::new(&id, &name, mime_for_extension(&extension));
        self.descriptors.push(descriptor);
        self.contents.insert(id, content);
        self
    }

    /// Fail the next `times` downloads of `id` with `status`.
    pub fn fail_downloads(self, id: impl Into<String>, status: u16, times: u32) -> Self {
        self.failures.write().unwrap().insert(id.into(), (status, times));
        self
    }

    /// Panic whenever `id` is downloaded.
    pub fn panic_on_download(mut self, id: impl Into<String>) -> Self {
        self.panics.insert(id.into());
        self
    }

    /// Every registered file, in registration order.
    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.descriptors.clone()
    }

    pub fn download_attempts(&self, id: &str) -> u32 {
        self.downloads.read().unwrap().get(id).copied().unwrap_or(0)
    }

    /// `(file id, destination)` pairs, in call order.
    pub fn moves(&self) -> Vec<(String, String)> {
        self.moves.read().unwrap().clone()
    }
}

#[async_trait]
impl FileSource for MockFileSource {
    async fn list(&self, _folder: &str) -> Result<Vec<FileDescriptor>, SourceError> {
        Ok(self.descriptors())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        *self.downloads.write().unwrap().entry(file_id.to_string()).or_default() += 1;

        if self.panics.contains(file_id) {
            panic!("download of {} blew up", file_id);
        }

        if let Some((status, remaining)) = self.failures.write().unwrap().get_mut(file_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::Status {
                    operation: "download".into(),
                    status: *status,
                    message: format!("injected failure for {}", file_id),
                });
            }
        }

        self.contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(file_id.to_string()))
    }

    async fn move_to(&self, file_id: &str, _name: &str, destination: &str) -> Result<(), SourceError> {
        if !self.contents.contains_key(file_id) {
            return Err(SourceError::NotFound(file_id.to_string()));
        }
        self.moves
            .write()
            .unwrap()
            .push((file_id.to_string(), destination.to_string()));
        Ok(())
    }
}
