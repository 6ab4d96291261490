//! Word documents: paragraph text from `word/document.xml`.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::ExtractionError;

const DOCUMENT_PART: &str = "word/document.xml";

/// One line per non-empty paragraph.
pub fn docx_lines(data: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).map_err(|e| ExtractionError::Document(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ExtractionError::Document(format!("{}: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Document(e.to_string()))?;

    paragraphs(&xml)
}

fn paragraphs(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        lines.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if matches!(e.local_name().as_ref(), b"tab" | b"br") => current.push(' '),
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ExtractionError::Document(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Document(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        lines.push(tail.to_string());
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Invoice No: INV-7</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Grand </w:t></w:r><w:r><w:t>Total:</w:t></w:r><w:r><w:tab/><w:t>&#8377;1,250.00</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t>Vendor &amp; Sons</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn docx(xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(DOCUMENT_PART, SimpleFileOptions::default()).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_paragraphs_become_lines() {
        assert_eq!(
            docx_lines(&docx(BODY)).unwrap(),
            vec!["Invoice No: INV-7", "Grand Total: ₹1,250.00", "Vendor & Sons"]
        );
    }

    #[test]
    fn test_missing_document_part() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("other.xml", SimpleFileOptions::default()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(docx_lines(&bytes), Err(ExtractionError::Document(_))));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(docx_lines(b"plain text"), Err(ExtractionError::Document(_))));
    }
}
