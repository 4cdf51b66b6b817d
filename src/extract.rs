//! Multi-format text extraction for document files.
//!
//! Pure function over bytes: the sync pipeline supplies file bytes plus the
//! file extension; this module returns plain UTF-8 text. Supported formats
//! are `.txt`, `.pdf`, and `.docx`. Unknown extensions fail with
//! [`EngineError::UnsupportedFormat`] and the pipeline skips the file.

use std::io::Read;

use crate::error::EngineError;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from file bytes based on the file extension.
///
/// The extension is matched case-insensitively, with or without the leading
/// dot. Legacy `.doc` is recognized but rejected with a conversion hint.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, EngineError> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "txt" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "doc" => Err(EngineError::UnsupportedFormat(
            ".doc is not supported; convert the file to .docx".to_string(),
        )),
        _ => Err(EngineError::UnsupportedFormat(format!(".{}", ext))),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, EngineError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| EngineError::Extraction(e.to_string()))
}

/// DOCX stores body text as `w:t` runs inside `word/document.xml`.
fn extract_docx(bytes: &[u8]) -> Result<String, EngineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| EngineError::Extraction(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| EngineError::Extraction("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| EngineError::Extraction(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(EngineError::Extraction(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_w_t_elements(&doc_xml)
}

fn extract_w_t_elements(xml: &[u8]) -> Result<String, EngineError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_paragraph = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"p" {
                    // Paragraph breaks become newlines, matching how the
                    // documents read when chunked by sentence.
                    if in_paragraph && !out.is_empty() {
                        out.push('\n');
                    }
                    in_paragraph = true;
                } else if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(EngineError::Extraction(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txt_reads_lossy_utf8() {
        let text = extract_text(b"Hello. World.", ".txt").unwrap();
        assert_eq!(text, "Hello. World.");

        // Invalid UTF-8 is replaced rather than failing the file
        let text = extract_text(&[0x48, 0x69, 0xFF, 0x21], "txt").unwrap();
        assert!(text.starts_with("Hi"));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let err = extract_text(b"data", ".xyz").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_legacy_doc_is_rejected_with_hint() {
        let err = extract_text(b"data", ".doc").unwrap_err();
        match err {
            EngineError::UnsupportedFormat(msg) => assert!(msg.contains("docx")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        assert!(extract_text(b"ok", "TXT").is_ok());
        assert!(extract_text(b"ok", ".Txt").is_ok());
    }

    #[test]
    fn test_invalid_pdf_returns_extraction_error() {
        let err = extract_text(b"not a pdf", ".pdf").unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }

    #[test]
    fn test_invalid_docx_returns_extraction_error() {
        let err = extract_text(b"not a zip", ".docx").unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }

    #[test]
    fn test_docx_text_runs_are_extracted() {
        // Minimal DOCX: a ZIP with just word/document.xml
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file(
                    "word/document.xml",
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            std::io::Write::write_all(
                &mut writer,
                br#"<w:document xmlns:w="x"><w:body>
                    <w:p><w:r><w:t>Hello.</w:t></w:r></w:p>
                    <w:p><w:r><w:t>World.</w:t></w:r></w:p>
                </w:body></w:document>"#,
            )
            .unwrap();
            writer.finish().unwrap();
        }
        let text = extract_text(cursor.get_ref(), ".docx").unwrap();
        assert!(text.contains("Hello."));
        assert!(text.contains("World."));
    }
}
