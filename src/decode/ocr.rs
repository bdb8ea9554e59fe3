//! Last-resort OCR for scanned PDFs.
//!
//! The pipeline runs inside a private temporary directory named after the
//! input file and removed when the decode returns, whatever the outcome:
//!
//! 1. rasterize every page image (`pdfimages <pdf> <stem>`)
//! 2. convert the images to grayscale TIFF (`gm mogrify -format tiff -type Grayscale ..`)
//! 3. run the OCR engine per image (`tesseract <tiff> <base>`)
//! 4. concatenate the text fragments in page order and apply [`ocr_scrub`]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument};

use super::DecodeError;
use super::decoder::{DEFAULT_DECODE_TIMEOUT, Decoder};
use super::process::{CapturedOutput, run_captured};

/// Numbered per-page files: `<root>-<page>.<ext>`.
#[allow(clippy::expect_used)]
static PAGE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-(\d+)\.([a-z]+)$").expect("page file regex is valid"));

/// Multi-stage OCR decoder.
#[derive(Debug, Clone)]
pub struct OcrDecoder {
    rasterizer: String,
    converter: Vec<String>,
    recognizer: String,
    timeout: Duration,
}

impl Default for OcrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrDecoder {
    /// Uses `pdfimages`, GraphicsMagick and `tesseract` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rasterizer: "pdfimages".to_string(),
            converter: ["gm", "mogrify", "-format", "tiff", "-type", "Grayscale"]
                .into_iter()
                .map(String::from)
                .collect(),
            recognizer: "tesseract".to_string(),
            timeout: DEFAULT_DECODE_TIMEOUT,
        }
    }

    /// Program invoked as `<rasterizer> <pdf> <root>`.
    #[must_use]
    pub fn with_rasterizer(mut self, program: impl Into<String>) -> Self {
        self.rasterizer = program.into();
        self
    }

    /// Command invoked as `<program> [args..] <image>..`.
    #[must_use]
    pub fn with_converter<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.converter = std::iter::once(program.into())
            .chain(args.into_iter().map(Into::into))
            .collect();
        self
    }

    /// Program invoked as `<recognizer> <tiff> <output base>`.
    #[must_use]
    pub fn with_recognizer(mut self, program: impl Into<String>) -> Self {
        self.recognizer = program.into();
        self
    }

    /// Budget for each stage invocation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn stage(
        &self,
        program: &str,
        args: Vec<OsString>,
        dir: &Path,
    ) -> Result<CapturedOutput, DecodeError> {
        let output = run_captured(program, &args, Some(dir), self.timeout).await?;
        debug!(program, status = %output.status, "ocr stage finished");
        Ok(output)
    }

    async fn run_pipeline(
        &self,
        input: &Path,
        dir: &Path,
        root: &str,
    ) -> Result<String, DecodeError> {
        let rasterized = self
            .stage(
                &self.rasterizer,
                vec![input.as_os_str().to_os_string(), root.into()],
                dir,
            )
            .await?;
        if stage_failed(&rasterized) {
            return Err(DecodeError::extraction_failed(
                "failed to extract image data from PDF",
            ));
        }

        let images = page_files(dir, is_pnm).await?;
        if images.is_empty() {
            return Err(DecodeError::extraction_failed("no images found in PDF"));
        }

        let (program, fixed) = self
            .converter
            .split_first()
            .ok_or_else(|| DecodeError::extraction_failed("no image converter configured"))?;
        let mut args: Vec<OsString> = fixed.iter().map(OsString::from).collect();
        args.extend(images.iter().map(|path| file_name_arg(path)));
        let converted = self.stage(program, args, dir).await?;
        if stage_failed(&converted) {
            return Err(DecodeError::extraction_failed("failed to convert images to tiff"));
        }

        let tiffs = page_files(dir, |ext| ext == "tiff").await?;
        if tiffs.is_empty() {
            return Err(DecodeError::extraction_failed("converted tiffs not found"));
        }

        for tiff in &tiffs {
            let base = tiff.with_extension("");
            // Per-image failures only show up as a missing text file.
            self.stage(
                &self.recognizer,
                vec![file_name_arg(tiff), file_name_arg(&base)],
                dir,
            )
            .await?;
        }

        let texts = page_files(dir, |ext| ext == "txt").await?;
        if texts.is_empty() {
            return Err(DecodeError::extraction_failed("OCR failed to find any text"));
        }

        let mut raw = String::new();
        for path in &texts {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| DecodeError::io(path, source))?;
            raw.push_str(&String::from_utf8_lossy(&bytes));
            raw.push('\n');
        }

        ocr_scrub(&raw)
    }
}

#[async_trait]
impl Decoder for OcrDecoder {
    fn name(&self) -> &str {
        &self.recognizer
    }

    fn is_ocr(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(file = %path.display()))]
    async fn decode(&self, path: &Path) -> Result<String, DecodeError> {
        let input = tokio::fs::canonicalize(path)
            .await
            .map_err(|source| DecodeError::io(path, source))?;
        let root = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.split('.').next())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("page")
            .to_string();

        let workdir = tempfile::Builder::new()
            .prefix(&format!("{root}-"))
            .tempdir()
            .map_err(|source| DecodeError::io(std::env::temp_dir(), source))?;

        let result = self.run_pipeline(&input, workdir.path(), &root).await;
        match &result {
            Ok(text) => info!(chars = text.chars().count(), "ocr accepted text"),
            Err(error) => debug!(error = %error, "ocr failed"),
        }
        result
    }
}

/// Keeps only lines that look like prose and rejects output that is mostly noise.
///
/// A line is kept when letters make up at least half of its non-whitespace
/// characters. The scrubbed text must be non-empty and at least half as long
/// (in characters) as the raw input.
///
/// # Errors
///
/// Returns [`DecodeError::ExtractionFailed`] if the gate rejects the text.
pub fn ocr_scrub(raw: &str) -> Result<String, DecodeError> {
    let kept: Vec<&str> = raw
        .lines()
        .filter(|line| is_real_line(line))
        .map(str::trim)
        .collect();
    let filtered = kept.join("\n");

    let raw_len = raw.chars().count();
    let filtered_len = filtered.chars().count();
    if filtered_len == 0 || filtered_len * 2 < raw_len {
        return Err(DecodeError::extraction_failed(
            "this does not appear to be text",
        ));
    }
    Ok(filtered)
}

fn is_real_line(line: &str) -> bool {
    let mut visible = 0usize;
    let mut letters = 0usize;
    for c in line.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if c.is_alphabetic() {
            letters += 1;
        }
    }
    letters > 0 && letters * 2 >= visible
}

/// A stage fails if it exits non-zero or writes anything to stderr.
fn stage_failed(output: &CapturedOutput) -> bool {
    !output.status.success() || !output.stderr.trim().is_empty()
}

/// `pbm`, `pgm` and `ppm`, as written by the rasterizer.
fn is_pnm(ext: &str) -> bool {
    ext.len() == 3 && ext.starts_with('p') && ext.ends_with('m')
}

fn file_name_arg(path: &Path) -> OsString {
    path.file_name()
        .map_or_else(|| path.as_os_str().to_os_string(), ToOwned::to_owned)
}

/// Numbered page files in `dir` whose extension passes `accept`, in page order.
async fn page_files(
    dir: &Path,
    accept: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>, DecodeError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| DecodeError::io(dir, source))?;
    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| DecodeError::io(dir, source))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(page) = page_number(name, &accept) {
            pages.push((page, entry.path()));
        }
    }
    pages.sort();
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(name: &str, accept: impl Fn(&str) -> bool) -> Option<u64> {
    let captures = PAGE_FILE.captures(name)?;
    if !accept(captures.get(2)?.as_str()) {
        return None;
    }
    captures.get(1)?.as_str().parse().ok()
}
