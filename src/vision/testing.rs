//! Test helpers: a scripted engine and image builders

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Mutex;

use super::ocr::{OcrEngine, OutputFormat, RecognitionOptions};
use super::OcrError;

/// One call seen by [`ScriptedEngine`]
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub options: RecognitionOptions,
    pub format: OutputFormat,
    pub dimensions: (u32, u32),
}

/// Engine returning canned output; whitelisted calls get the ROI answer
#[derive(Default)]
pub struct ScriptedEngine {
    text: String,
    tsv: String,
    roi: String,
    failure: Option<fn() -> OcrError>,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: OcrError) -> Self {
        let failure: fn() -> OcrError = match err {
            OcrError::InvalidImage(_) => || OcrError::InvalidImage("scripted".into()),
            OcrError::OcrEngine(_) => || OcrError::OcrEngine("scripted".into()),
            OcrError::Unexpected(_) => || OcrError::Unexpected("scripted".into()),
        };
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_tsv(mut self, tsv: &str) -> Self {
        self.tsv = tsv.to_string();
        self
    }

    pub fn with_roi(mut self, roi: &str) -> Self {
        self.roi = roi.to_string();
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    async fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
        format: OutputFormat,
    ) -> Result<String, OcrError> {
        self.calls.lock().unwrap().push(EngineCall {
            options: options.clone(),
            format,
            dimensions: image.dimensions(),
        });

        if let Some(failure) = self.failure {
            return Err(failure());
        }

        Ok(match (format, options.char_whitelist.is_some()) {
            (OutputFormat::Tsv, _) => self.tsv.clone(),
            (OutputFormat::Text, true) => self.roi.clone(),
            (OutputFormat::Text, false) => self.text.clone(),
        })
    }
}

/// (block, par, line, word, text, conf, (left, top, width, height))
pub type TsvWord<'a> = (u32, u32, u32, u32, &'a str, f32, (u32, u32, u32, u32));

/// Render word rows the way tesseract prints them, with a page row first
pub fn tsv_output(words: &[TsvWord]) -> String {
    let mut out = String::from(
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n",
    );
    out.push_str("1\t1\t0\t0\t0\t0\t0\t0\t400\t300\t-1\t\n");
    for (block, par, line, word, text, conf, (left, top, width, height)) in words {
        out.push_str(&format!(
            "5\t1\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            block, par, line, word, left, top, width, height, conf, text
        ));
    }
    out
}

pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    encode_png(&DynamicImage::ImageRgb8(img))
}

/// Insert an eXIf chunk carrying `orientation` right after the PNG header
pub fn with_exif_orientation(png: &[u8], orientation: u16) -> Vec<u8> {
    // Little-endian TIFF header, one IFD entry: 0x0112 SHORT x1
    let mut exif = vec![b'I', b'I', 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00];
    exif.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]);
    exif.extend_from_slice(&orientation.to_le_bytes());
    exif.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    let mut chunk = Vec::new();
    chunk.extend_from_slice(&(exif.len() as u32).to_be_bytes());
    let mut typed = b"eXIf".to_vec();
    typed.extend_from_slice(&exif);
    chunk.extend_from_slice(&typed);
    chunk.extend_from_slice(&crc32(&typed).to_be_bytes());

    // 8-byte signature + 25-byte IHDR chunk
    let mut out = png[..33].to_vec();
    out.extend_from_slice(&chunk);
    out.extend_from_slice(&png[33..]);
    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}
