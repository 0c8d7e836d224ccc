#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use booksing::extract::{BookMetadata, ExtractError, EpubExtractor};
use booksing::traits::MetadataExtractor;
use zip::write::SimpleFileOptions;

/// A minimal EPUB with the given Dublin Core fields.
pub fn epub_bytes(title: &str, author: &str, language: &str) -> Vec<u8> {
    let opf = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{}</dc:title>
    <dc:creator>{}</dc:creator>
    <dc:language>{}</dc:language>
  </metadata>
  <manifest/>
</package>"#,
        title, author, language
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("mimetype", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
    )
    .unwrap();
    zip.start_file("OEBPS/content.opf", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(opf.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

pub fn write_epub(dir: &Path, name: &str, title: &str, author: &str, language: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, epub_bytes(title, author, language)).unwrap();
    path
}

pub fn write_garbage(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, b"this is not a zip archive").unwrap();
    path
}

/// Wraps [`EpubExtractor`], sleeping on every parse and recording the
/// highest number of parses running at once.
#[derive(Default)]
pub struct InstrumentedExtractor {
    pub delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl InstrumentedExtractor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataExtractor for InstrumentedExtractor {
    fn parse(&self, path: &Path) -> Result<BookMetadata, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let result = EpubExtractor.parse(path);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
