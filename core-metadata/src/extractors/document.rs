//! Office Open XML (docx, xlsx, pptx) and PDF metadata.
//!
//! OOXML files are zip packages; document properties live in
//! `docProps/core.xml` and the counts come from the main parts. PDFs are read
//! with `lopdf` through the trailer's `Info` dictionary.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use lopdf::{Dictionary, Document as PdfDocument, Object};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::ExtractorError;
use crate::extractor::MetadataExtractor;
use crate::router::{self, DocumentFormat};
use crate::value::{RawMetadata, RawValue};

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl MetadataExtractor for DocumentExtractor {
    fn name(&self) -> &'static str {
        "document"
    }

    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractorError> {
        match router::document_format(path) {
            Some(DocumentFormat::Word) => word_metadata(path),
            Some(DocumentFormat::Pdf) => pdf_metadata(path),
            Some(DocumentFormat::Excel) => excel_metadata(path),
            Some(DocumentFormat::PowerPoint) => powerpoint_metadata(path),
            None => Err(ExtractorError::parse("not a supported document format")),
        }
    }
}

// ============================================================================
// OOXML
// ============================================================================

struct Package {
    archive: ZipArchive<BufReader<File>>,
}

impl Package {
    fn open(path: &Path) -> Result<Self, ExtractorError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ExtractorError::parse(format!("not an Office Open XML package: {}", e)))?;
        Ok(Self { archive })
    }

    /// `Ok(None)` when the part is absent.
    fn read_part(&mut self, name: &str) -> Result<Option<String>, ExtractorError> {
        match self.archive.by_name(name) {
            Ok(mut part) => {
                let mut xml = String::new();
                part.read_to_string(&mut xml)?;
                Ok(Some(xml))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(ExtractorError::parse(format!("failed to read {}: {}", name, e))),
        }
    }

    fn require_part(&mut self, name: &str) -> Result<String, ExtractorError> {
        self.read_part(name)?
            .ok_or_else(|| ExtractorError::parse(format!("package is missing {}", name)))
    }

    fn part_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    fn core_properties(&mut self) -> Result<CoreProperties, ExtractorError> {
        match self.read_part("docProps/core.xml")? {
            Some(xml) => Ok(CoreProperties(leaf_text(&xml)?)),
            None => Ok(CoreProperties(HashMap::new())),
        }
    }
}

/// `docProps/core.xml` values keyed by element local name.
struct CoreProperties(HashMap<String, String>);

impl CoreProperties {
    fn text(&self, name: &str) -> RawValue {
        self.0.get(name).cloned().into()
    }

    fn date(&self, name: &str) -> RawValue {
        match self.0.get(name) {
            Some(value) => match DateTime::parse_from_rfc3339(value.trim()) {
                Ok(ts) => RawValue::Timestamp(ts.with_timezone(&Utc)),
                Err(_) => RawValue::Text(value.clone()),
            },
            None => RawValue::Null,
        }
    }

    fn integer(&self, name: &str) -> RawValue {
        match self.0.get(name) {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .map(RawValue::Integer)
                .unwrap_or_else(|_| RawValue::Text(value.clone())),
            None => RawValue::Null,
        }
    }
}

fn xml_error(err: quick_xml::Error) -> ExtractorError {
    ExtractorError::parse(format!("malformed XML: {}", err))
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Text content of every leaf element, keyed by local name.
fn leaf_text(xml: &str) -> Result<HashMap<String, String>, ExtractorError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut values = HashMap::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => current = Some(local_name(&e)),
            Event::Text(t) => {
                if let Some(name) = &current {
                    let text = t.unescape().map_err(xml_error)?;
                    values
                        .entry(name.clone())
                        .or_insert_with(String::new)
                        .push_str(&text);
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(values)
}

fn word_metadata(path: &Path) -> Result<RawMetadata, ExtractorError> {
    let mut package = Package::open(path)?;
    let core = package.core_properties()?;
    let body = package.require_part("word/document.xml")?;
    let stats = word_body_stats(&body)?;

    let mut metadata = RawMetadata::new();
    metadata.insert("Author", core.text("creator"));
    metadata.insert("Title", core.text("title"));
    metadata.insert("Subject", core.text("subject"));
    metadata.insert("Date Created", core.date("created"));
    metadata.insert("Date Modified", core.date("modified"));
    metadata.insert("Revision", core.integer("revision"));
    metadata.insert("Last Printed", core.date("lastPrinted"));
    metadata.insert("Category", core.text("category"));
    metadata.insert("Keywords", core.text("keywords"));
    metadata.insert("Comments", core.text("description"));
    metadata.insert("Version", core.text("version"));
    metadata.insert("Status", core.text("contentStatus"));
    metadata.insert("Page Count", stats.sections);
    metadata.insert("Word Count", stats.words);
    Ok(metadata)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct WordStats {
    sections: usize,
    words: usize,
}

/// Counts `sectPr` elements and whitespace-separated words per paragraph.
fn word_body_stats(xml: &str) -> Result<WordStats, ExtractorError> {
    let mut reader = Reader::from_str(xml);
    let mut stats = WordStats::default();
    let mut paragraph = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sectPr" => stats.sections += 1,
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"sectPr" => stats.sections += 1,
                b"tab" | b"br" => paragraph.push(' '),
                _ => {}
            },
            Event::Text(t) if in_text => {
                paragraph.push_str(&t.unescape().map_err(xml_error)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    stats.words += paragraph.split_whitespace().count();
                    paragraph.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(stats)
}

fn excel_metadata(path: &Path) -> Result<RawMetadata, ExtractorError> {
    let mut package = Package::open(path)?;
    let core = package.core_properties()?;
    let workbook = package.require_part("xl/workbook.xml")?;
    let sheets = workbook_sheets(&workbook)?;

    let first_sheet_part = match sheets.first() {
        Some(rel_id) => {
            let rels = package.read_part("xl/_rels/workbook.xml.rels")?;
            rels.as_deref()
                .map(|rels| relationship_target(rels, rel_id))
                .transpose()?
                .flatten()
                .map(|target| resolve_xl_target(&target))
        }
        None => None,
    }
    .unwrap_or_else(|| "xl/worksheets/sheet1.xml".to_string());

    let extent = match package.read_part(&first_sheet_part)? {
        Some(xml) => sheet_extent(&xml)?,
        None => None,
    };

    let mut metadata = RawMetadata::new();
    metadata.insert("Author", core.text("creator"));
    metadata.insert("Title", core.text("title"));
    metadata.insert("Date Created", core.date("created"));
    metadata.insert("Date Modified", core.date("modified"));
    metadata.insert("Sheet Count", sheets.len());
    metadata.insert("Row Count", extent.map(|(rows, _)| rows));
    metadata.insert("Column Count", extent.map(|(_, cols)| cols));
    Ok(metadata)
}

/// Relationship ids of the workbook's sheets, in workbook order.
fn workbook_sheets(xml: &str) -> Result<Vec<String>, ExtractorError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                sheets.push(attribute(&e, b"id").unwrap_or_default());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

fn relationship_target(xml: &str, rel_id: &str) -> Result<Option<String>, ExtractorError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship"
                    && attribute(&e, b"Id").as_deref() == Some(rel_id) =>
            {
                return Ok(attribute(&e, b"Target"));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn resolve_xl_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// `(rows, columns)` of a worksheet, from its `dimension` element or, when
/// that is missing, from the highest cell reference present.
fn sheet_extent(xml: &str) -> Result<Option<(u32, u32)>, ExtractorError> {
    let mut reader = Reader::from_str(xml);
    let mut scanned: Option<(u32, u32)> = None;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"dimension" => {
                    if let Some(extent) = attribute(&e, b"ref").as_deref().and_then(range_extent) {
                        return Ok(Some(extent));
                    }
                }
                b"c" => {
                    if let Some((row, col)) = attribute(&e, b"r").as_deref().and_then(cell_position) {
                        let (max_row, max_col) = scanned.unwrap_or((0, 0));
                        scanned = Some((max_row.max(row), max_col.max(col)));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(scanned)
}

/// `"A1:D20"` -> `(20, 4)`; a single cell `"A1"` -> `(1, 1)`.
fn range_extent(range: &str) -> Option<(u32, u32)> {
    let last = range.rsplit(':').next()?;
    cell_position(last)
}

/// `"AB12"` -> `(12, 28)`.
fn cell_position(cell: &str) -> Option<(u32, u32)> {
    let cell = cell.trim().replace('$', "");
    let split = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let column = letters.chars().try_fold(0u32, |acc, c| {
        acc.checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
    })?;
    let row = digits.parse().ok()?;
    Some((row, column))
}

fn powerpoint_metadata(path: &Path) -> Result<RawMetadata, ExtractorError> {
    let mut package = Package::open(path)?;
    let core = package.core_properties()?;
    let slides = package
        .part_names()
        .iter()
        .filter(|name| is_slide_part(name))
        .count();

    let mut metadata = RawMetadata::new();
    metadata.insert("Author", core.text("creator"));
    metadata.insert("Title", core.text("title"));
    metadata.insert("Subject", core.text("subject"));
    metadata.insert("Date Created", core.date("created"));
    metadata.insert("Date Modified", core.date("modified"));
    metadata.insert("Slide Count", slides);
    Ok(metadata)
}

fn is_slide_part(name: &str) -> bool {
    name.strip_prefix("ppt/slides/slide")
        .and_then(|rest| rest.strip_suffix(".xml"))
        .is_some_and(|number| !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()))
}

// ============================================================================
// PDF
// ============================================================================

fn pdf_metadata(path: &Path) -> Result<RawMetadata, ExtractorError> {
    let doc = PdfDocument::load(path)
        .map_err(|e| ExtractorError::parse(format!("failed to open PDF: {}", e)))?;
    let info = info_dictionary(&doc);
    let text = |key: &[u8]| -> Option<String> {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(|object| pdf_text(&doc, object))
    };
    let date = |key: &[u8]| -> RawValue {
        match text(key) {
            Some(raw) => parse_pdf_date(&raw)
                .map(RawValue::Timestamp)
                .unwrap_or(RawValue::Text(raw)),
            None => RawValue::Null,
        }
    };

    let mut metadata = RawMetadata::new();
    metadata.insert("Author", text(b"Author"));
    metadata.insert("Title", text(b"Title"));
    metadata.insert("Date Created", date(b"CreationDate"));
    metadata.insert("Date Modified", date(b"ModDate"));
    metadata.insert("Subject", text(b"Subject"));
    metadata.insert("Keywords", text(b"Keywords"));
    metadata.insert("PDDocID", document_id(&doc));
    metadata.insert("PDFVersion", doc.version.clone());
    metadata.insert("Page Count", doc.get_pages().len());
    Ok(metadata)
}

fn info_dictionary(doc: &PdfDocument) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn pdf_text(doc: &PdfDocument, object: &Object) -> Option<String> {
    match object {
        Object::Reference(id) => pdf_text(doc, doc.get_object(*id).ok()?),
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// First trailer `ID` entry as uppercase hex.
fn document_id(doc: &PdfDocument) -> Option<String> {
    let Object::Array(ids) = doc.trailer.get(b"ID").ok()? else {
        return None;
    };
    match ids.first()? {
        Object::String(bytes, _) => Some(bytes.iter().map(|b| format!("{:02X}", b)).collect()),
        _ => None,
    }
}

/// UTF-16BE with BOM, UTF-8 with BOM, otherwise byte-per-character.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// `D:YYYYMMDDHHmmSSOHH'mm'` with every part after the year optional.
fn parse_pdf_date(raw: &str) -> Option<DateTime<Utc>> {
    let body = raw.trim().trim_start_matches("D:");
    let digits_len = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len < 4 {
        return None;
    }
    let (digits, zone) = body.split_at(digits_len);
    let part = |start: usize, len: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + len) {
            Some(s) => s.parse().ok(),
            None => Some(default),
        }
    };

    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, part(4, 2, 1)?, part(6, 2, 1)?)?.and_hms_opt(
        part(8, 2, 0)?,
        part(10, 2, 0)?,
        part(12, 2, 0)?,
    )?;

    let offset_secs = match zone.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let rest: String = zone[1..].chars().filter(|c| c.is_ascii_digit()).collect();
            let hours: i32 = rest.get(0..2).and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i32 = rest.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let secs = hours * 3600 + minutes * 60;
            if sign == '-' {
                -secs
            } else {
                secs
            }
        }
        _ => 0,
    };

    FixedOffset::east_opt(offset_secs)?
        .from_local_datetime(&naive)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
}
