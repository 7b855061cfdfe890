//! Parsing of the engine's tab-separated structured output
//!
//! Two strategies read the raw table: [`StrictColumns`] is a `csv` reader
//! that rejects rows wider than the header, [`LenientSplit`] splits lines by
//! hand and skips any row whose width does not match. [`parse_with_fallback`]
//! tries them in order.

use thiserror::Error;
use tracing::warn;

use super::{BoundingBox, OcrError, WordRecord};

/// Column-aligned table; an empty cell is `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    fn column(&self, name: &str) -> Result<usize, OcrError> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| OcrError::Unexpected(format!("OCR table has no '{}' column", name)))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("no header row")]
    MissingHeader,

    #[error("unreadable table: {0}")]
    Read(String),

    #[error("line {line}: expected {expected} fields, saw {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("all strategies failed: {0}")]
    Exhausted(String),
}

/// A way of reading the raw engine table
pub trait TableStrategy {
    fn name(&self) -> &'static str;
    fn parse(&self, raw: &str) -> Result<RawTable, TableError>;
}

/// Every row must fit the header; short rows are padded with empty cells
pub struct StrictColumns;

/// Manual split; rows whose field count differs from the header are skipped
pub struct LenientSplit;

impl TableStrategy for StrictColumns {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn parse(&self, raw: &str) -> Result<RawTable, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .has_headers(true)
            .from_reader(raw.as_bytes());

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| TableError::Read(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if header.iter().all(|h| h.is_empty()) {
            return Err(TableError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TableError::Read(e.to_string()))?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            if record.len() > header.len() {
                return Err(TableError::FieldCount {
                    line: record.position().map_or(0, |p| p.line() as usize),
                    expected: header.len(),
                    found: record.len(),
                });
            }

            let mut cells: Vec<Option<String>> = record.iter().map(cell_value).collect();
            cells.resize(header.len(), None);
            rows.push(cells);
        }

        Ok(RawTable { header, rows })
    }
}

impl TableStrategy for LenientSplit {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn parse(&self, raw: &str) -> Result<RawTable, TableError> {
        let mut lines = raw.trim().lines();
        let header_line = lines.next().filter(|l| !l.trim().is_empty());
        let Some(header_line) = header_line else {
            return Err(TableError::MissingHeader);
        };
        let header = split_header(header_line);

        let rows = lines
            .filter(|line| !line.trim().is_empty())
            .map(split_cells)
            .filter(|cells| cells.len() == header.len())
            .collect();

        Ok(RawTable { header, rows })
    }
}

fn split_header(line: &str) -> Vec<String> {
    line.split('\t').map(|h| h.trim().to_string()).collect()
}

fn split_cells(line: &str) -> Vec<Option<String>> {
    line.split('\t').map(cell_value).collect()
}

fn cell_value(cell: &str) -> Option<String> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Try each strategy in order, returning the first table that parses
pub fn parse_with_fallback(raw: &str, strategies: &[&dyn TableStrategy]) -> Result<RawTable, TableError> {
    let mut failures = Vec::new();
    for strategy in strategies {
        match strategy.parse(raw) {
            Ok(table) => return Ok(table),
            Err(e) => {
                warn!("{} table parse failed: {}", strategy.name(), e);
                failures.push(format!("{}: {}", strategy.name(), e));
            }
        }
    }
    Err(TableError::Exhausted(failures.join("; ")))
}

/// Drop rows without text or with confidence at or below `min_confidence`,
/// and trim what is left. Table order is preserved.
pub fn clean_words(table: &RawTable, min_confidence: f32) -> Result<Vec<WordRecord>, OcrError> {
    let text_col = table.column("text")?;
    let conf_col = table.column("conf")?;
    let block_col = table.column("block_num")?;
    let par_col = table.column("par_num")?;
    let line_col = table.column("line_num")?;
    let word_col = table.column("word_num")?;
    let left_col = table.column("left")?;
    let top_col = table.column("top")?;
    let width_col = table.column("width")?;
    let height_col = table.column("height")?;

    let mut words = Vec::new();
    for row in &table.rows {
        let Some(text) = row[text_col].as_deref() else {
            continue;
        };
        let Some(conf) = row[conf_col].as_deref() else {
            continue;
        };
        let confidence: f32 = parse_cell(conf, "conf")?;
        if confidence <= min_confidence {
            continue;
        }

        words.push(WordRecord {
            text: text.trim().to_string(),
            confidence,
            block_num: required(row, block_col, "block_num")?,
            par_num: required(row, par_col, "par_num")?,
            line_num: required(row, line_col, "line_num")?,
            word_num: required(row, word_col, "word_num")?,
            bounds: BoundingBox::new(
                required(row, left_col, "left")?,
                required(row, top_col, "top")?,
                required(row, width_col, "width")?,
                required(row, height_col, "height")?,
            ),
        });
    }

    Ok(words)
}

fn required(row: &[Option<String>], col: usize, name: &str) -> Result<u32, OcrError> {
    let cell = row[col]
        .as_deref()
        .ok_or_else(|| OcrError::Unexpected(format!("OCR table row is missing '{}'", name)))?;
    parse_cell(cell, name)
}

fn parse_cell<T: std::str::FromStr>(cell: &str, name: &str) -> Result<T, OcrError> {
    cell.trim()
        .parse()
        .map_err(|_| OcrError::Unexpected(format!("OCR table has non-numeric {} '{}'", name, cell)))
}
