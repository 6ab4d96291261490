//! Source documents and the text materialized from them.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A file as reported by a file source listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Stable identifier, used as the dedup key.
    pub id: String,
    /// Display name, including extension.
    pub name: String,
    /// MIME type hint from the source (may be empty).
    #[serde(default, rename = "type")]
    pub type_hint: String,
}

impl FileDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_hint: type_hint.into(),
        }
    }

    /// Lowercased extension of the display name, without the dot.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Classify the file from its type hint, falling back to the extension.
    pub fn kind(&self) -> FileKind {
        FileKind::detect(&self.type_hint, &self.extension())
    }
}

/// A downloaded document travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub descriptor: FileDescriptor,
    /// Raw bytes; dropped once text is materialized.
    pub content: Vec<u8>,
    /// Error recorded by the text dispatcher, if any.
    pub extraction_error: Option<String>,
}

impl SourceDocument {
    pub fn new(descriptor: FileDescriptor, content: Vec<u8>) -> Self {
        Self {
            descriptor,
            content,
            extraction_error: None,
        }
    }
}

/// Image encodings accepted by the vision chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// MIME type used in data URIs and inline payloads.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }
}

/// Broad file category driving text extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Image(ImageFormat),
    Spreadsheet,
    Csv,
    WordDocument,
    PlainText,
    Unknown,
}

impl FileKind {
    /// Detect the kind from a MIME hint and a lowercased extension.
    pub fn detect(type_hint: &str, extension: &str) -> Self {
        let hint = type_hint.to_ascii_lowercase();

        if hint == "application/pdf" {
            return Self::Pdf;
        }
        if let Some(sub) = hint.strip_prefix("image/") {
            let sub = sub.split(';').next().unwrap_or_default();
            if let Some(format) = ImageFormat::from_extension(sub) {
                return Self::Image(format);
            }
        }
        if hint == "text/csv" {
            return Self::Csv;
        }
        if hint.contains("spreadsheetml")
            || hint == "application/vnd.ms-excel"
            || hint == "application/vnd.oasis.opendocument.spreadsheet"
            || hint == "application/vnd.google-apps.spreadsheet"
        {
            return Self::Spreadsheet;
        }
        if hint.contains("wordprocessingml") || hint == "application/vnd.google-apps.document" {
            return Self::WordDocument;
        }

        match extension {
            "pdf" => Self::Pdf,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::Spreadsheet,
            "csv" => Self::Csv,
            "docx" => Self::WordDocument,
            "txt" | "text" | "md" | "log" => Self::PlainText,
            other => match ImageFormat::from_extension(other) {
                Some(format) => Self::Image(format),
                None if hint.starts_with("text/") => Self::PlainText,
                None => Self::Unknown,
            },
        }
    }
}

/// Ordered, non-empty, trimmed lines of text.
///
/// An empty sequence means extraction failed or the document is blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    lines: Vec<String>,
}

impl ExtractedText {
    /// Build from raw text, dropping blank lines.
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Build from individual lines, trimming each and dropping blanks.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(|l| l.as_ref().trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with newlines.
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_from_hint_and_extension() {
        assert_eq!(FileKind::detect("application/pdf", "bin"), FileKind::Pdf);
        assert_eq!(FileKind::detect("", "JPG".to_ascii_lowercase().as_str()), FileKind::Image(ImageFormat::Jpeg));
        assert_eq!(FileKind::detect("image/png", ""), FileKind::Image(ImageFormat::Png));
        assert_eq!(
            FileKind::detect("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", ""),
            FileKind::Spreadsheet
        );
        assert_eq!(FileKind::detect("", "csv"), FileKind::Csv);
        assert_eq!(FileKind::detect("", "docx"), FileKind::WordDocument);
        assert_eq!(FileKind::detect("text/plain", "dat"), FileKind::PlainText);
        assert_eq!(FileKind::detect("", "zip"), FileKind::Unknown);
    }

    #[test]
    fn test_descriptor_extension() {
        let file = FileDescriptor::new("1", "Receipt.JPEG", "");
        assert_eq!(file.extension(), "jpeg");
        assert_eq!(file.kind(), FileKind::Image(ImageFormat::Jpeg));
    }

    #[test]
    fn test_extracted_text_drops_blank_lines() {
        let text = ExtractedText::from_text("  Acme Co \n\n   \nTotal: 10.00\n");
        assert_eq!(text.lines(), &["Acme Co".to_string(), "Total: 10.00".to_string()]);
        assert!(ExtractedText::from_text(" \n\t\n").is_empty());
    }
}
