//! Tesseract CLI backend
//!
//! Runs the `tesseract` executable as a child process on a temporary PNG.
//! The child is awaited asynchronously and killed if it outlives the
//! configured timeout.

use async_trait::async_trait;
use image::{GrayImage, ImageFormat};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::ocr::{OcrEngine, OutputFormat, RecognitionOptions};
use super::OcrError;

/// Tesseract engine wrapper
pub struct TesseractCli {
    binary: PathBuf,
    timeout: Duration,
}

impl TesseractCli {
    /// Create an engine running `binary` with a per-call time limit
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Executable this engine runs
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// First line of `tesseract --version`
    pub async fn version(&self) -> Result<String, OcrError> {
        let output = self.run(vec!["--version".into()]).await?;
        // Older releases print the banner on stderr
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn run(&self, args: Vec<OsString>) -> Result<std::process::Output, OcrError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OcrError::Unexpected(format!(
                    "cannot run {}: {}",
                    self.binary.display(),
                    e
                )))
            }
            Err(_) => {
                return Err(OcrError::Unexpected(format!(
                    "{} did not finish within {}s",
                    self.binary.display(),
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::OcrEngine(stderr.trim().to_string()));
        }

        Ok(output)
    }
}

/// Command line for one recognition call, output written to stdout
pub fn build_args(input: &Path, options: &RecognitionOptions, format: OutputFormat) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![input.into(), "stdout".into()];

    if let Some(languages) = &options.languages {
        args.push("-l".into());
        args.push(languages.into());
    }

    args.push("--psm".into());
    args.push(options.page_segmentation_mode.to_string().into());

    if let Some(whitelist) = &options.char_whitelist {
        args.push("-c".into());
        args.push(format!("tessedit_char_whitelist={}", whitelist).into());
    }

    if format == OutputFormat::Tsv {
        args.push("tsv".into());
    }

    args
}

fn write_png(image: &GrayImage) -> Result<tempfile::NamedTempFile, OcrError> {
    let mut file = tempfile::Builder::new()
        .prefix("receipt-ocr-")
        .suffix(".png")
        .tempfile()?;
    image
        .write_to(&mut file, ImageFormat::Png)
        .map_err(|e| OcrError::Unexpected(format!("cannot encode OCR input: {}", e)))?;
    Ok(file)
}

/// Encode `image` to a temp PNG on the blocking pool
async fn stage_input(image: &GrayImage) -> Result<tempfile::NamedTempFile, OcrError> {
    let image = image.clone();
    tokio::task::spawn_blocking(move || write_png(&image)).await?
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
        format: OutputFormat,
    ) -> Result<String, OcrError> {
        let input = stage_input(image).await?;
        let args = build_args(input.path(), options, format);

        debug!(
            "tesseract {}x{} psm={} format={:?}",
            image.width(),
            image.height(),
            options.page_segmentation_mode,
            format
        );

        let output = self.run(args).await?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();

        debug!("tesseract returned {} bytes", text.len());
        Ok(text)
    }
}
