//! Text extraction dispatcher.
//!
//! Turns file bytes into [`ExtractedText`] according to the file kind.
//! Extraction never fails outright: any error downgrades to empty text and
//! is returned alongside as a string so the document can still be reported.

mod docx;
mod pdf;
mod sheet;

pub use docx::docx_lines;
pub use pdf::{PdfText, extract_pdf};
pub use sheet::{csv_lines, spreadsheet_lines};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::models::document::{ExtractedText, FileDescriptor, FileKind, ImageFormat};
use crate::vision::{ImageInput, VisionChain};

/// Result of dispatching one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub text: ExtractedText,
    /// Why the text is empty or partial, when something went wrong.
    pub error: Option<String>,
    /// Vision backend that produced the text, for images and scans.
    pub vision_backend: Option<String>,
}

impl Extraction {
    fn ok(text: ExtractedText) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }

    fn failed(error: ExtractionError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Per-format text materialization with optional vision OCR for images.
#[derive(Clone, Default)]
pub struct TextExtractor {
    vision: Option<Arc<VisionChain>>,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision(mut self, vision: Arc<VisionChain>) -> Self {
        self.vision = Some(vision);
        self
    }

    /// Extract text from `data`, dispatching on the descriptor's kind.
    pub async fn extract(&self, descriptor: &FileDescriptor, data: &[u8]) -> Extraction {
        let kind = descriptor.kind();
        debug!(file = %descriptor.name, ?kind, bytes = data.len(), "dispatching");

        let extraction = match kind {
            FileKind::Pdf => self.extract_pdf(descriptor, data).await,
            FileKind::Image(format) => {
                let image = ImageInput::new(descriptor.name.clone(), data.to_vec(), format);
                self.read_image(&image).await
            }
            FileKind::Spreadsheet => from_lines(spreadsheet_lines(data)),
            FileKind::Csv => from_lines(csv_lines(data)),
            FileKind::WordDocument => from_lines(docx_lines(data)),
            FileKind::PlainText | FileKind::Unknown => Extraction::ok(ExtractedText::from_text(&decode_text(data))),
        };

        if let Some(error) = &extraction.error {
            warn!(file = %descriptor.name, error = %error, "text extraction failed");
        } else {
            debug!(file = %descriptor.name, lines = extraction.text.lines().len(), "text extracted");
        }
        extraction
    }

    async fn extract_pdf(&self, descriptor: &FileDescriptor, data: &[u8]) -> Extraction {
        let owned = data.to_vec();
        let parsed = tokio::task::spawn_blocking(move || extract_pdf(&owned))
            .await
            .unwrap_or_else(|e| Err(ExtractionError::Pdf(format!("parser task failed: {}", e))));
        let pdf = match parsed {
            Ok(pdf) => pdf,
            Err(e) => return Extraction::failed(e),
        };

        let text = ExtractedText::from_text(&pdf.text);
        if !text.is_empty() {
            return Extraction::ok(text);
        }

        match pdf.scanned_image {
            Some(jpeg) => {
                debug!(file = %descriptor.name, bytes = jpeg.len(), "no text layer, reading page scan");
                let image = ImageInput::new(format!("{} (scan)", descriptor.name), jpeg, ImageFormat::Jpeg);
                self.read_image(&image).await
            }
            None => Extraction::ok(text),
        }
    }

    async fn read_image(&self, image: &ImageInput) -> Extraction {
        let Some(vision) = &self.vision else {
            return Extraction::failed(ExtractionError::NoVision(image.name.clone()));
        };

        match vision.read(image).await {
            Ok(read) => Extraction {
                text: ExtractedText::from_text(&read.text),
                error: None,
                vision_backend: Some(read.backend),
            },
            Err(e) => {
                debug!(image = %image.name, error = %e, "vision chain exhausted");
                Extraction::failed(ExtractionError::VisionExhausted(image.name.clone()))
            }
        }
    }
}

fn from_lines(lines: Result<Vec<String>, ExtractionError>) -> Extraction {
    match lines {
        Ok(lines) => Extraction::ok(ExtractedText::from_lines(lines)),
        Err(e) => Extraction::failed(e),
    }
}

/// UTF-8, or ISO-8859-1 when the bytes are not valid UTF-8.
pub fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockVision, VisionReply};
    use pretty_assertions::assert_eq;

    fn descriptor(name: &str, hint: &str) -> FileDescriptor {
        FileDescriptor::new("id-1", name, hint)
    }

    #[tokio::test]
    async fn test_plain_text_lines() {
        let extraction = TextExtractor::new()
            .extract(&descriptor("note.txt", "text/plain"), b"  Grand Total: 10.00 \n\n Acme Co\n")
            .await;
        assert_eq!(extraction.text.lines(), &["Grand Total: 10.00", "Acme Co"]);
        assert_eq!(extraction.error, None);
    }

    #[test]
    fn test_latin1_fallback() {
        assert_eq!(decode_text(&[0x54, 0x6f, 0x74, 0x61, 0x6c, 0x20, 0xa3, 0x35]), "Total £5");
        assert_eq!(decode_text("\u{feff}Total".as_bytes()), "Total");
    }

    #[tokio::test]
    async fn test_csv_dispatch() {
        let extraction = TextExtractor::new()
            .extract(&descriptor("bill.csv", ""), b"Total,99.00\n")
            .await;
        assert_eq!(extraction.text.lines(), &["Total | 99.00"]);
    }

    #[tokio::test]
    async fn test_broken_pdf_degrades_to_empty_text() {
        let extraction = TextExtractor::new()
            .extract(&descriptor("scan.pdf", "application/pdf"), b"%PDF-garbage")
            .await;
        assert!(extraction.text.is_empty());
        assert!(extraction.error.unwrap().contains("PDF"));
    }

    #[tokio::test]
    async fn test_image_without_vision_is_an_error() {
        let extraction = TextExtractor::new()
            .extract(&descriptor("receipt.jpg", "image/jpeg"), &[0xff, 0xd8])
            .await;
        assert!(extraction.text.is_empty());
        assert_eq!(
            extraction.error.as_deref(),
            Some("no vision backend configured for image receipt.jpg")
        );
    }

    #[tokio::test]
    async fn test_image_goes_through_vision_chain() {
        let tier = Arc::new(MockVision::new("local", &["local"]).on("local", VisionReply::Text("TOTAL 42.00\nShop".into())));
        let chain = Arc::new(VisionChain::new("read").with_tier(tier.clone()));

        let extraction = TextExtractor::new()
            .with_vision(chain)
            .extract(&descriptor("receipt.png", ""), &[0x89, 0x50])
            .await;

        assert_eq!(extraction.text.lines(), &["TOTAL 42.00", "Shop"]);
        assert_eq!(extraction.vision_backend.as_deref(), Some("local"));
        assert_eq!(tier.calls(), vec!["local"]);
    }

    #[tokio::test]
    async fn test_exhausted_vision_records_error() {
        let tier = Arc::new(MockVision::new("gemini", &["flash"]).on("flash", VisionReply::Fail));
        let chain = Arc::new(VisionChain::new("read").with_tier(tier));

        let extraction = TextExtractor::new()
            .with_vision(chain)
            .extract(&descriptor("receipt.webp", "image/webp"), &[0])
            .await;

        assert!(extraction.text.is_empty());
        assert!(extraction.error.unwrap().contains("receipt.webp"));
    }
}
