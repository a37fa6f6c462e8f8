//! Table extraction from PDF documents.
//!
//! The PDF text layer is pulled out page by page, then each line is split
//! into cells on tab characters or runs of two or more spaces. Consecutive
//! lines with enough cells form one table; a page break or a line that does
//! not look like a row ends it.

use std::panic;
use std::path::Path;
use std::sync::OnceLock;

use matq_core::{Record, Relation};
use regex::Regex;

use crate::IngestError;

/// Tables shorter than this are treated as layout noise.
const MIN_TABLE_ROWS: usize = 2;

const PAGE_BREAK: char = '\x0c';

/// Produces the ordered tables of a document.
pub trait TableExtractor: Send + Sync {
    fn extract_tables(&self, path: &Path) -> Result<Vec<Relation>, IngestError>;

    /// Extractor name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct PdfTableExtractor {
    min_columns: usize,
}

impl PdfTableExtractor {
    pub fn new(min_columns: usize) -> Self {
        Self {
            min_columns: min_columns.max(1),
        }
    }

    fn read_text(&self, path: &Path) -> Result<String, IngestError> {
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(IngestError::NotFound(shown));
        }

        let bytes = std::fs::read(path)?;

        // pdf-extract can panic on some fonts
        let extraction = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes));

        match extraction {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(IngestError::Extraction {
                path: shown,
                reason: e.to_string(),
            }),
            Err(_) => {
                tracing::warn!(path = %shown, "pdf-extract panicked, falling back to lopdf");
                extract_text_basic(&bytes, &shown)
            }
        }
    }
}

impl Default for PdfTableExtractor {
    fn default() -> Self {
        Self::new(2)
    }
}

impl TableExtractor for PdfTableExtractor {
    fn extract_tables(&self, path: &Path) -> Result<Vec<Relation>, IngestError> {
        let text = self.read_text(path)?;
        let pages = text.matches(PAGE_BREAK).count().max(1);
        let tables = segment_tables(&text, self.min_columns);

        tracing::info!(
            path = %path.display(),
            pages = pages,
            tables = tables.len(),
            "Extracted tables from document"
        );

        Ok(tables)
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// Page-by-page text via lopdf, pages separated by form feeds.
fn extract_text_basic(bytes: &[u8], shown: &str) -> Result<String, IngestError> {
    use std::io::Cursor;

    let doc = lopdf::Document::load_from(Cursor::new(bytes)).map_err(|e| IngestError::Extraction {
        path: shown.to_string(),
        reason: e.to_string(),
    })?;

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        if let Ok(page_text) = doc.extract_text(&[*page_num]) {
            text.push_str(&page_text);
            text.push(PAGE_BREAK);
        }
    }

    if text.trim_matches(PAGE_BREAK).trim().is_empty() {
        return Err(IngestError::Extraction {
            path: shown.to_string(),
            reason: "no text layer (scanned document or unsupported fonts)".to_string(),
        });
    }

    Ok(text)
}

fn cell_gap() -> &'static Regex {
    static CELL_GAP: OnceLock<Regex> = OnceLock::new();
    CELL_GAP.get_or_init(|| Regex::new(r"\t+| {2,}").expect("cell gap pattern is valid"))
}

fn split_cells(line: &str) -> Vec<String> {
    cell_gap()
        .split(line.trim())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Group text lines into tables. Blank lines are ignored; the `i`-th table
/// found becomes relation `table_{i}`.
pub fn segment_tables(text: &str, min_columns: usize) -> Vec<Relation> {
    let mut tables: Vec<Vec<Record>> = Vec::new();
    let mut current: Vec<Record> = Vec::new();

    let mut flush = |current: &mut Vec<Record>| {
        let rows = std::mem::take(current);
        if rows.len() >= MIN_TABLE_ROWS {
            tables.push(rows);
        }
    };

    for page in text.split(PAGE_BREAK) {
        for line in page.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let cells = split_cells(line);
            if cells.len() >= min_columns.max(1) {
                current.push(Record { cells });
            } else {
                flush(&mut current);
            }
        }
        flush(&mut current);
    }
    flush(&mut current);

    tables
        .into_iter()
        .enumerate()
        .map(|(i, rows)| Relation::from_rows(i, rows))
        .collect()
}
