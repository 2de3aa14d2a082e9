//! Baseline direct text extraction.
//!
//! Cheap, local, always available: pulls whatever text layer a document
//! already carries. PDFs go through `pdf-extract` (page count via `lopdf`),
//! OOXML containers through `zip` + `quick-xml`, plain text is decoded as
//! lossy UTF-8. Raster images have no text layer and report one empty page,
//! which routes them to OCR.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_TIFF: &str = "image/tiff";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard for a single decompressed OOXML part.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Text layer of a document plus the number of pages it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectText {
    pub text: String,
    pub page_count: u32,
}

/// One page image for a vision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Maps a file extension to one of the supported content types.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        "txt" => MIME_TEXT,
        "md" | "markdown" => MIME_MARKDOWN,
        "png" => MIME_PNG,
        "jpg" | "jpeg" => MIME_JPEG,
        "webp" => MIME_WEBP,
        "tif" | "tiff" => MIME_TIFF,
        _ => return None,
    })
}

pub fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<DirectText, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_TEXT | MIME_MARKDOWN => Ok(DirectText {
            text: String::from_utf8_lossy(bytes).into_owned(),
            page_count: 1,
        }),
        ct if is_image(ct) => Ok(DirectText {
            text: String::new(),
            page_count: 1,
        }),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

/// Images to hand to a vision engine, at most `max_pages` of them.
///
/// An image file is its own single page. For PDFs this collects the JPEG
/// streams embedded on each page, which is how scanners store page images.
pub fn page_images(
    bytes: &[u8],
    content_type: &str,
    max_pages: u32,
) -> Result<Vec<PageImage>, ExtractError> {
    if is_image(content_type) {
        return Ok(vec![PageImage {
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }]);
    }
    if content_type != MIME_PDF {
        return Err(ExtractError::UnsupportedContentType(content_type.to_string()));
    }

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let mut images = Vec::new();
    for (_, page_id) in doc.get_pages().into_iter().take(max_pages as usize) {
        let page_images = doc
            .get_page_images(page_id)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        for image in page_images {
            let is_jpeg = image
                .filters
                .as_ref()
                .is_some_and(|f| f.iter().any(|name| name == "DCTDecode"));
            if is_jpeg {
                images.push(PageImage {
                    content_type: MIME_JPEG.to_string(),
                    bytes: image.content.to_vec(),
                });
            }
        }
    }
    Ok(images)
}

fn extract_pdf(bytes: &[u8]) -> Result<DirectText, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let page_count = doc.get_pages().len() as u32;
    // Scans often have no text layer at all; that is an OCR case, not an error.
    let text = pdf_extract::extract_text_from_mem(bytes).unwrap_or_default();
    Ok(DirectText { text, page_count })
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Part names matching `{prefix}N.xml`, in numeric order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenates the text of every `<*:t>` element (`w:t` in Word, `a:t` in slides).
fn collect_t_text(xml: &[u8], separator: &str) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_t = false,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                if !out.is_empty() && !out.ends_with(separator) {
                    out.push_str(separator);
                }
            }
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<DirectText, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    Ok(DirectText {
        text: collect_t_text(&xml, "\n")?,
        page_count: 1,
    })
}

fn extract_pptx(bytes: &[u8]) -> Result<DirectText, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_parts(&archive, "ppt/slides/slide");
    let mut texts = Vec::with_capacity(slides.len());
    for name in &slides {
        let xml = read_part(&mut archive, name)?;
        texts.push(collect_t_text(&xml, "\n")?);
    }
    Ok(DirectText {
        text: texts.join("\n\n"),
        page_count: slides.len() as u32,
    })
}

fn extract_xlsx(bytes: &[u8]) -> Result<DirectText, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        // Workbooks with only numeric cells omit the shared string table.
        Err(_) => Vec::new(),
    };
    let sheets = numbered_parts(&archive, "xl/worksheets/sheet");
    let mut texts = Vec::new();
    for name in sheets.iter().take(XLSX_MAX_SHEETS) {
        let xml = read_part(&mut archive, name)?;
        texts.push(sheet_cells(&xml, &shared)?);
    }
    Ok(DirectText {
        text: texts.join("\n"),
        page_count: texts.len() as u32,
    })
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one sheet, space separated. Shared-string cells are
/// resolved; inline and numeric values are kept as written.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared_cell = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if value.is_empty() {
                    continue;
                }
                if shared_cell {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else {
                    cells.push(value.to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared_cell = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut w = zip::ZipWriter::new(&mut buf);
            let opts = zip::write::SimpleFileOptions::default();
            for (name, body) in parts {
                w.start_file(*name, opts).unwrap();
                w.write_all(body.as_bytes()).unwrap();
            }
            w.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for_path(Path::new("a/发票.PDF")), Some(MIME_PDF));
        assert_eq!(content_type_for_path(Path::new("scan.jpeg")), Some(MIME_JPEG));
        assert_eq!(content_type_for_path(Path::new("notes.md")), Some(MIME_MARKDOWN));
        assert_eq!(content_type_for_path(Path::new("archive.tar.gz")), None);
        assert_eq!(content_type_for_path(Path::new("README")), None);
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn images_have_one_empty_page() {
        let out = extract_text(&[0x89, b'P', b'N', b'G'], MIME_PNG).unwrap();
        assert_eq!(out, DirectText { text: String::new(), page_count: 1 });
        let pages = page_images(b"img", MIME_PNG, 3).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content_type, MIME_PNG);
        assert_eq!(pages[0].bytes, b"img");
    }

    #[test]
    fn plain_text_is_lossy_utf8() {
        let out = extract_text("合同 v2\n".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(out.text, "合同 v2\n");
        assert_eq!(out.page_count, 1);
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>Invoice</w:t></w:r><w:r><w:t> 42</w:t></w:r></w:p>
            <w:p><w:r><w:t>Total: 10</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", xml)]);
        let out = extract_text(&bytes, MIME_DOCX).unwrap();
        assert_eq!(out.text, "Invoice42\nTotal: 10");
    }

    #[test]
    fn pptx_counts_slides_as_pages() {
        let slide = |t: &str| format!(r#"<p:sld xmlns:a="a" xmlns:p="p"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#, t);
        let s1 = slide("first");
        let s2 = slide("second");
        let bytes = zip_with(&[("ppt/slides/slide2.xml", &s2), ("ppt/slides/slide1.xml", &s1)]);
        let out = extract_text(&bytes, MIME_PPTX).unwrap();
        assert_eq!(out.page_count, 2);
        assert_eq!(out.text, "first\n\nsecond");
    }

    #[test]
    fn xlsx_resolves_shared_strings() {
        let shared = r#"<sst><si><t>vendor</t></si><si><t>ACME</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row>
            <c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1"><v>12.5</v></c>
        </row></sheetData></worksheet>"#;
        let bytes = zip_with(&[("xl/sharedStrings.xml", shared), ("xl/worksheets/sheet1.xml", sheet)]);
        let out = extract_text(&bytes, MIME_XLSX).unwrap();
        assert_eq!(out.text, "vendor ACME 12.5");
        assert_eq!(out.page_count, 1);
    }
}
