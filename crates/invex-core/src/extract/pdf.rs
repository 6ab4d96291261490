//! PDF text extraction using lopdf and pdf-extract.

use std::panic::{AssertUnwindSafe, catch_unwind};

use lopdf::{Document, Object};
use tracing::{debug, trace, warn};

use crate::error::{ExtractionError, panic_message};

/// Text recovered from a PDF.
#[derive(Debug, Clone, Default)]
pub struct PdfText {
    /// Page texts concatenated in page order.
    pub text: String,
    pub page_count: usize,
    /// Largest embedded JPEG, kept when the PDF carries no text (scans).
    pub scanned_image: Option<Vec<u8>>,
}

/// Extract page text from a PDF, falling back to pdf-extract and finally to
/// the embedded scan image.
pub fn extract_pdf(data: &[u8]) -> Result<PdfText, ExtractionError> {
    let mut doc = Document::load_mem(data).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    let mut raw = None;
    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(ExtractionError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");

        let mut decrypted = Vec::new();
        doc.save_to(&mut decrypted)
            .map_err(|e| ExtractionError::Pdf(format!("failed to save decrypted PDF: {}", e)))?;
        raw = Some(decrypted);
    }
    let raw = raw.as_deref().unwrap_or(data);

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ExtractionError::NoPages);
    }

    let mut page_texts = Vec::with_capacity(pages.len());
    for page in pages.keys() {
        match doc.extract_text(&[*page]) {
            Ok(text) if !text.trim().is_empty() => page_texts.push(text),
            Ok(_) => trace!("page {} has no text layer", page),
            Err(e) => trace!("page {} text extraction failed: {}", page, e),
        }
    }
    let mut text = page_texts.join("\n");

    if text.trim().is_empty() {
        match catch_parser_panic("pdf-extract", || pdf_extract::extract_text_from_mem(raw))? {
            Ok(fallback) => text = fallback,
            Err(e) => debug!("pdf-extract fallback failed: {}", e),
        }
    }

    let scanned_image = if text.trim().is_empty() {
        largest_jpeg(&doc)
    } else {
        None
    };

    debug!(
        "PDF: {} pages, {} chars of text, scan image: {}",
        pages.len(),
        text.len(),
        scanned_image.is_some()
    );

    Ok(PdfText {
        text,
        page_count: pages.len(),
        scanned_image,
    })
}

/// Run `parse`, reporting a panic inside it as a PDF error.
fn catch_parser_panic<T>(parser: &str, parse: impl FnOnce() -> T) -> Result<T, ExtractionError> {
    catch_unwind(AssertUnwindSafe(parse)).map_err(|payload| {
        let message = panic_message(&*payload);
        warn!("{} panicked: {}", parser, message);
        ExtractionError::Pdf(format!("{} panicked: {}", parser, message))
    })
}

/// Raw bytes of the largest DCT-encoded image XObject.
fn largest_jpeg(doc: &Document) -> Option<Vec<u8>> {
    doc.objects
        .values()
        .filter_map(|object| match object {
            Object::Stream(stream) => Some(stream),
            _ => None,
        })
        .filter(|stream| {
            let dict = &stream.dict;
            let is_image = dict
                .get(b"Subtype")
                .and_then(|o| o.as_name())
                .is_ok_and(|name| name == b"Image");
            let is_jpeg = match dict.get(b"Filter") {
                Ok(Object::Name(name)) => name.as_slice() == b"DCTDecode",
                Ok(Object::Array(filters)) => filters
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .is_some_and(|name| name == b"DCTDecode"),
                _ => false,
            };
            is_image && is_jpeg
        })
        .max_by_key(|stream| stream.content.len())
        .map(|stream| stream.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};

    /// Single-page PDF with one line of Helvetica text.
    fn text_pdf(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_extracts_page_text() {
        let pdf = extract_pdf(&text_pdf("Grand Total: 250.00")).unwrap();
        assert_eq!(pdf.page_count, 1);
        assert!(pdf.text.contains("Grand Total"));
        assert!(pdf.scanned_image.is_none());
    }

    #[test]
    fn test_parser_panic_becomes_pdf_error() {
        let err = catch_parser_panic("pdf-extract", || -> String { panic!("bad font widths") }).unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(ref msg) if msg == "pdf-extract panicked: bad font widths"));

        assert_eq!(catch_parser_panic("pdf-extract", || 7).unwrap(), 7);
    }

    #[test]
    fn test_garbage_is_a_pdf_error() {
        let err = extract_pdf(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }
}
