//! Offline OCR floor backed by `pure-onnx-ocr` (pure Rust, no network).
//!
//! The engine is not thread-safe, so it lives on one dedicated worker thread
//! that loads the models on first use and serves requests over a channel.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use pure_onnx_ocr::engine::{OcrEngine, OcrEngineBuilder};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{ImageInput, VisionBackend};
use crate::error::ProviderError;

const DETECTION_MODEL: &str = "det.onnx";
const RECOGNITION_MODEL: &str = "latin_rec.onnx";
const DICTIONARY: &str = "latin_dict.txt";

type Reply = oneshot::Sender<Result<String, ProviderError>>;

/// Local OCR engine, loaded from disk on first use.
pub struct LocalOcrBackend {
    model_dir: PathBuf,
    keep_unk: bool,
    worker: OnceLock<Result<mpsc::Sender<(DynamicImage, Reply)>, String>>,
}

/// One recognized line with its top-left corner.
struct Region {
    x: f64,
    y: f64,
    text: String,
}

impl LocalOcrBackend {
    pub fn new(model_dir: PathBuf, keep_unk: bool) -> Self {
        Self {
            model_dir,
            keep_unk,
            worker: OnceLock::new(),
        }
    }

    /// Request channel of the worker thread, started on first call.
    fn worker(&self) -> Result<&mpsc::Sender<(DynamicImage, Reply)>, ProviderError> {
        self.worker
            .get_or_init(|| {
                let (tx, rx) = mpsc::channel();
                let model_dir = self.model_dir.clone();
                let keep_unk = self.keep_unk;
                thread::Builder::new()
                    .name("invex-ocr".into())
                    .spawn(move || serve(&model_dir, keep_unk, rx))
                    .map_err(|e| format!("failed to start OCR worker: {}", e))?;
                Ok(tx)
            })
            .as_ref()
            .map_err(|e| ProviderError::Ocr(e.clone()))
    }
}

/// Worker loop: owns the engine until every sender is dropped.
fn serve(model_dir: &Path, keep_unk: bool, requests: mpsc::Receiver<(DynamicImage, Reply)>) {
    let mut engine: Option<Result<OcrEngine, String>> = None;

    for (image, reply) in requests {
        let result = match engine.get_or_insert_with(|| load_engine(model_dir)) {
            Ok(engine) => recognize(engine, &image, keep_unk),
            Err(e) => Err(ProviderError::Ocr(e.clone())),
        };
        if reply.send(result).is_err() {
            debug!("OCR caller went away before the result was ready");
        }
    }
    debug!("OCR worker stopped");
}

fn load_engine(model_dir: &Path) -> Result<OcrEngine, String> {
    let engine = OcrEngineBuilder::new()
        .det_model_path(model_dir.join(DETECTION_MODEL))
        .rec_model_path(model_dir.join(RECOGNITION_MODEL))
        .dictionary_path(model_dir.join(DICTIONARY))
        .build()
        .map_err(|e| format!("failed to load models from {}: {}", model_dir.display(), e))?;
    info!("Loaded local OCR engine from {}", model_dir.display());
    Ok(engine)
}

fn recognize(engine: &OcrEngine, image: &DynamicImage, keep_unk: bool) -> Result<String, ProviderError> {
    let start = Instant::now();
    let (width, height) = image.dimensions();

    let results = engine
        .run_from_image(image)
        .map_err(|e| ProviderError::Ocr(e.to_string()))?;

    let mut regions: Vec<Region> = results
        .iter()
        .map(|r| {
            let (x, y) = r
                .bounding_box
                .exterior()
                .coords()
                .fold((f64::MAX, f64::MAX), |(x, y), c| (x.min(c.x), y.min(c.y)));
            let text = if keep_unk {
                r.text.clone()
            } else {
                r.text.replace("[UNK]", " ")
            };
            Region { x, y, text }
        })
        .collect();

    // Reading order: 20px rows, then left to right.
    regions.sort_by(|a, b| {
        let row_a = (a.y / 20.0) as i64;
        let row_b = (b.y / 20.0) as i64;
        row_a
            .cmp(&row_b)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    debug!(
        "Local OCR: {} regions on {}x{} in {}ms",
        regions.len(),
        width,
        height,
        start.elapsed().as_millis()
    );

    Ok(regions
        .into_iter()
        .map(|r| r.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[async_trait]
impl VisionBackend for LocalOcrBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn variants(&self) -> Vec<String> {
        vec!["local".to_string()]
    }

    async fn read_image(&self, _variant: &str, image: &ImageInput, _instruction: &str) -> Result<String, ProviderError> {
        let decoded = image::load_from_memory(&image.data)
            .map_err(|e| ProviderError::Ocr(format!("cannot decode {}: {}", image.name, e)))?;

        let (reply, result) = oneshot::channel();
        if self.worker()?.send((decoded, reply)).is_err() {
            warn!("OCR worker is gone");
            return Err(ProviderError::Ocr("OCR worker stopped".into()));
        }
        result
            .await
            .map_err(|_| ProviderError::Ocr("OCR worker dropped the request".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::ImageFormat;
    use crate::vision::VisionChain;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn blank_png(name: &str) -> ImageInput {
        let mut png = Vec::new();
        DynamicImage::new_rgb8(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        ImageInput::new(name, png, ImageFormat::Png)
    }

    #[tokio::test]
    async fn test_missing_models_fail_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalOcrBackend::new(dir.path().to_path_buf(), false);
        let input = blank_png("blank.png");

        let err = backend.read_image("local", &input, "").await.unwrap_err();
        assert!(matches!(err, ProviderError::Ocr(ref msg) if msg.contains("failed to load models")));

        // The worker stays up and reports the same load failure again.
        let again = backend.read_image("local", &input, "").await.unwrap_err();
        assert_eq!(again.to_string(), err.to_string());
    }

    #[tokio::test]
    async fn test_chain_reaches_local_floor() {
        let dir = tempfile::tempdir().unwrap();
        let local: Arc<dyn VisionBackend> = Arc::new(LocalOcrBackend::new(dir.path().to_path_buf(), false));
        let chain = VisionChain::new("read").with_tier(local);

        let err = chain.read(&blank_png("scan.png")).await.unwrap_err();

        assert_eq!(chain.tier_names(), vec!["local"]);
        assert!(matches!(err, ProviderError::Exhausted(ref f) if f.len() == 1 && f[0].starts_with("local/local")));
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_cleanly() {
        let backend = LocalOcrBackend::new(PathBuf::from("models"), false);
        let input = ImageInput::new("broken.png", vec![1, 2, 3], ImageFormat::Png);

        let err = backend.read_image("local", &input, "").await.unwrap_err();
        assert!(matches!(err, ProviderError::Ocr(_)));
    }
}
