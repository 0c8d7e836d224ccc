//! EPUB metadata extraction.
//!
//! An EPUB is a ZIP container. `META-INF/container.xml` names the OPF
//! package document, whose `<metadata>` block carries Dublin Core
//! `title`, `creator`, `language` and `description` elements. Only that
//! block is read; chapter content is never decompressed.

use chrono::{DateTime, Utc};
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::Event;

use crate::models::Candidate;
use crate::traits::MetadataExtractor;

const CONTAINER_XML: &str = "META-INF/container.xml";
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 8 * 1024 * 1024;

/// Metadata fields as they appear in the container, unnormalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid container: {0}")]
    Archive(String),
    #[error("missing entry: {0}")]
    MissingEntry(String),
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("entry {0} exceeds size limit")]
    EntryTooLarge(String),
}

/// The built-in extractor for `.epub` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubExtractor;

impl MetadataExtractor for EpubExtractor {
    fn parse(&self, path: &Path) -> Result<BookMetadata, ExtractError> {
        let file = std::fs::File::open(path)?;
        parse_epub(file)
    }
}

/// Run `extractor` on `path` and attach file size and modification time.
pub fn load_candidate(
    extractor: &dyn MetadataExtractor,
    path: &Path,
) -> Result<Candidate, ExtractError> {
    let metadata = std::fs::metadata(path)?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let book = extractor.parse(path)?;

    Ok(Candidate {
        path: path.to_path_buf(),
        title: book.title,
        author: book.author,
        language: book.language,
        description: book.description,
        modified,
        size: metadata.len(),
    })
}

/// Parse EPUB metadata from any seekable reader.
pub fn parse_epub<R: Read + Seek>(reader: R) -> Result<BookMetadata, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| ExtractError::Archive(e.to_string()))?;

    let container = read_zip_entry_bounded(&mut archive, CONTAINER_XML)?;
    let opf_path = find_rootfile(&container)?;
    let opf = read_zip_entry_bounded(&mut archive, &opf_path)?;
    parse_opf_metadata(&opf)
}

fn read_zip_entry_bounded<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => ExtractError::MissingEntry(name.to_string()),
        other => ExtractError::Archive(other.to_string()),
    })?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::EntryTooLarge(name.to_string()));
    }
    Ok(out)
}

/// Find the `full-path` of the first `<rootfile>` in container.xml.
fn find_rootfile(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                let attr = e
                    .try_get_attribute("full-path")
                    .map_err(|err| ExtractError::Xml(err.to_string()))?;
                if let Some(attr) = attr {
                    let value = attr
                        .unescape_value()
                        .map_err(|err| ExtractError::Xml(err.to_string()))?;
                    if !value.is_empty() {
                        return Ok(value.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Err(ExtractError::MissingEntry("rootfile".to_string()))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Creator,
    Language,
    Description,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"creator" => Some(Field::Creator),
            b"language" => Some(Field::Language),
            b"description" => Some(Field::Description),
            _ => None,
        }
    }
}

/// Collect the first non-empty value of each Dublin Core field inside `<metadata>`.
fn parse_opf_metadata(xml: &[u8]) -> Result<BookMetadata, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut meta = BookMetadata::default();
    let mut in_metadata = false;
    let mut saw_metadata = false;
    let mut current: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"metadata" {
                    in_metadata = true;
                    saw_metadata = true;
                } else if in_metadata && current.is_none() {
                    current = Field::from_local_name(name.as_ref());
                    text.clear();
                }
            }
            Ok(Event::Text(t)) if current.is_some() => {
                let value = t.unescape().map_err(|e| ExtractError::Xml(e.to_string()))?;
                text.push_str(&value);
            }
            Ok(Event::CData(t)) if current.is_some() => {
                text.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"metadata" {
                    break;
                }
                if let Some(field) = current {
                    if Field::from_local_name(name.as_ref()) == Some(field) {
                        let slot = match field {
                            Field::Title => &mut meta.title,
                            Field::Creator => &mut meta.author,
                            Field::Language => &mut meta.language,
                            Field::Description => &mut meta.description,
                        };
                        if slot.is_empty() {
                            *slot = text.trim().to_string();
                        }
                        current = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !saw_metadata {
        return Err(ExtractError::MissingEntry("opf metadata".to_string()));
    }
    Ok(meta)
}
