//! Receipt Field Parser
//!
//! Pulls the total amount and the date out of a structured word table.
//! A keyword anchor (e.g. "Summe", "Datum") picks a text line; the value is
//! the first word on that line matching the expected pattern. Totals are
//! then re-read from a tight crop of the source image for a cleaner result.
//!
//! Only the first anchor in table order is considered. A receipt with
//! several "total" lines (subtotal, total, VAT total) resolves to whichever
//! the engine emitted first.

pub mod corrections;
pub mod roi;

use image::GrayImage;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::ReceiptSettings;
use crate::vision::preprocess::decode_grayscale;
use crate::vision::{OcrError, OcrInvoker, WordRecord};

pub use corrections::TextCorrector;

/// 1-3 digits, '.' or ',', 2 digits
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}[.,]\d{2}").expect("valid amount pattern"));

/// d.m.yy / dd-mm-yyyy / d/m/yyyy and mixes of the three separators
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}[-./]\d{1,2}[-./](?:\d{4}|\d{2})").expect("valid date pattern")
});

/// Fields extracted from one receipt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptParseResult {
    pub total_amount: Option<String>,
    pub date: Option<String>,
    /// Line items are not extracted yet; always empty
    pub items: Vec<serde_json::Value>,
    /// Every word's text, space joined in table order
    pub raw_text: String,
}

/// Keyword-anchored field extraction
#[derive(Debug, Clone)]
pub struct ReceiptParser {
    total_keywords: Vec<String>,
    date_keywords: Vec<String>,
    roi_margin: u32,
}

impl ReceiptParser {
    pub fn new(settings: &ReceiptSettings, roi_margin: u32) -> Self {
        Self {
            total_keywords: lowercase_all(&settings.total_keywords),
            date_keywords: lowercase_all(&settings.date_keywords),
            roi_margin,
        }
    }

    /// Build the parse result for `words`, re-reading the total from
    /// `source`, the original upload.
    pub async fn parse(
        &self,
        words: &[WordRecord],
        source: &[u8],
        invoker: &OcrInvoker,
    ) -> Result<ReceiptParseResult, OcrError> {
        let raw_text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let total_amount = match self.total_candidate(words) {
            Some(candidate) => Some(self.read_total(candidate, source, invoker).await?),
            None => None,
        };
        let date = self.find_date(words);

        info!(
            "Parsed receipt: total={:?} date={:?} words={}",
            total_amount,
            date,
            words.len()
        );

        Ok(ReceiptParseResult {
            total_amount,
            date,
            items: Vec::new(),
            raw_text,
        })
    }

    /// First word on the total anchor's line that looks like an amount
    pub fn total_candidate<'a>(&self, words: &'a [WordRecord]) -> Option<&'a WordRecord> {
        let anchor = find_anchor(words, &self.total_keywords)?;
        debug!("Total anchor '{}' on line {}", anchor.text, anchor.line_num);
        same_line(words, anchor.line_num).find(|w| AMOUNT_RE.is_match(&w.text))
    }

    /// First date-shaped text on the date anchor's line
    pub fn find_date(&self, words: &[WordRecord]) -> Option<String> {
        let anchor = find_anchor(words, &self.date_keywords)?;
        debug!("Date anchor '{}' on line {}", anchor.text, anchor.line_num);
        same_line(words, anchor.line_num)
            .find_map(|w| DATE_RE.find(&w.text).map(|m| m.as_str().to_string()))
    }

    async fn read_total(
        &self,
        candidate: &WordRecord,
        source: &[u8],
        invoker: &OcrInvoker,
    ) -> Result<String, OcrError> {
        let source = source.to_vec();
        let bounds = candidate.bounds;
        let margin = self.roi_margin;
        let crop: Option<GrayImage> = tokio::task::spawn_blocking(move || {
            decode_grayscale(&source).map(|gray| roi::extract_roi(&gray, &bounds, margin))
        })
        .await??;

        let Some(crop) = crop else {
            // The word's box lies outside the image; keep what the page read.
            debug!("Amount box {:?} outside source image", candidate.bounds);
            return Ok(extract_amount(&candidate.text).unwrap_or_else(|| candidate.text.clone()));
        };

        let roi_text = invoker.recognize_roi(&crop).await?;
        let roi_text = roi_text.trim();
        debug!("ROI text for total: '{}'", roi_text);

        Ok(extract_amount(roi_text).unwrap_or_else(|| roi_text.to_string()))
    }
}

fn lowercase_all(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

/// First word whose lowercased text contains any keyword
fn find_anchor<'a>(words: &'a [WordRecord], keywords: &[String]) -> Option<&'a WordRecord> {
    words.iter().find(|w| {
        let text = w.text.to_lowercase();
        keywords.iter().any(|k| text.contains(k.as_str()))
    })
}

fn same_line(words: &[WordRecord], line_num: u32) -> impl Iterator<Item = &WordRecord> {
    words.iter().filter(move |w| w.line_num == line_num)
}

fn extract_amount(text: &str) -> Option<String> {
    AMOUNT_RE.find(text).map(|m| m.as_str().to_string())
}
