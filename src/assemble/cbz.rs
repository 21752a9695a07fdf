//! CBZ container: a ZIP of `0001.jpg`, `0002.jpg`, ... plus `ComicInfo.xml`.
//!
//! Entries are named after the source page number, so a chapter packed with
//! a gap skips that number. Page entries are stored uncompressed (JPEG does
//! not deflate) and every entry carries the same fixed timestamp, so
//! identical pages always produce a byte-identical archive.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::result::ZipResult;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::PackedPage;

/// Name of the metadata entry.
pub const COMIC_INFO_ENTRY: &str = "ComicInfo.xml";

/// Archive entry name of source page `page_number` (1-based).
#[must_use]
pub fn page_entry_name(page_number: usize) -> String {
    format!("{page_number:04}.jpg")
}

fn entry_page_number(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(".jpg")?;
    if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Chapter metadata written into `ComicInfo.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicInfo {
    pub series: String,
    pub title: String,
    pub number: u32,
    pub page_count: usize,
}

impl ComicInfo {
    fn to_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <ComicInfo>\n  <Series>{}</Series>\n  <Title>{}</Title>\n  \
             <Number>{}</Number>\n  <PageCount>{}</PageCount>\n</ComicInfo>\n",
            escape_xml(&self.series),
            escape_xml(&self.title),
            self.number,
            self.page_count
        )
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn entry_options(method: CompressionMethod) -> FileOptions {
    FileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Writes `pages` in order, followed by the metadata entry.
///
/// # Errors
///
/// Returns the ZIP or IO error from the underlying writer.
pub fn write_cbz<W: Write + Seek>(writer: W, pages: &[PackedPage], info: &ComicInfo) -> ZipResult<W> {
    let mut zip = ZipWriter::new(writer);

    for packed in pages {
        zip.start_file(page_entry_name(packed.number), entry_options(CompressionMethod::Stored))?;
        zip.write_all(&packed.page.jpeg)?;
    }

    zip.start_file(COMIC_INFO_ENTRY, entry_options(CompressionMethod::Deflated))?;
    zip.write_all(info.to_xml().as_bytes())?;

    zip.finish()
}

/// Source page numbers of the page entries, in archive order. Only the
/// central directory is read.
///
/// # Errors
///
/// Returns the error when the file is not a readable ZIP archive.
pub fn page_numbers(path: &Path) -> ZipResult<Vec<usize>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut numbers = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        if let Some(number) = entry_page_number(archive.by_index_raw(i)?.name()) {
            numbers.push(number);
        }
    }
    Ok(numbers)
}

/// Reads every page entry back in archive order.
///
/// # Errors
///
/// Returns the error when the archive or an entry cannot be read.
pub fn read_entries<R: Read + Seek>(reader: R) -> ZipResult<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(reader)?;
    let mut pages = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.name() == COMIC_INFO_ENTRY {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        pages.push((entry.name().to_string(), bytes));
    }
    Ok(pages)
}
