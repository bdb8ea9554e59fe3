//! Decoders: one extraction attempt against one file.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::DecodeError;
use super::judge::{OutputKind, judge_output};
use super::process::run_captured;

/// Default wall-clock budget for one decoder run.
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(120);

/// A stateless text-extraction step, shareable across concurrent decodes.
#[async_trait]
pub trait Decoder: Send + Sync + fmt::Debug {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Shape of the raw output.
    fn output_kind(&self) -> OutputKind {
        OutputKind::Text
    }

    /// Whether accepted text comes from optical character recognition.
    fn is_ocr(&self) -> bool {
        false
    }

    /// Extracts text from `path`.
    async fn decode(&self, path: &Path) -> Result<String, DecodeError>;
}

/// Decoder backed by an external program: `program [args..] <file> [append..]`.
///
/// The exit status is not consulted; success is judged from the output alone.
#[derive(Debug, Clone)]
pub struct BinaryDecoder {
    name: String,
    program: String,
    args: Vec<OsString>,
    append: Vec<OsString>,
    error_marker: Option<String>,
    output_kind: OutputKind,
    timeout: Duration,
}

impl BinaryDecoder {
    /// Creates a decoder invoking `program` directly.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args: Vec::new(),
            append: Vec::new(),
            error_marker: None,
            output_kind: OutputKind::Text,
            timeout: DEFAULT_DECODE_TIMEOUT,
        }
    }

    /// Creates a decoder running `script` through `interpreter`. The decoder
    /// is named after the script file.
    #[must_use]
    pub fn script(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        let script = script.into();
        let name = script
            .file_name()
            .map_or_else(|| script.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            name,
            args: vec![script.into_os_string()],
            ..Self::new(interpreter)
        }
    }

    /// Arguments placed before the file path.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments placed after the file path.
    #[must_use]
    pub fn with_append<I, S>(mut self, append: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.append = append.into_iter().map(Into::into).collect();
        self
    }

    /// Output substring that marks the run as failed.
    #[must_use]
    pub fn with_error_marker(mut self, marker: impl Into<String>) -> Self {
        self.error_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_output_kind(mut self, kind: OutputKind) -> Self {
        self.output_kind = kind;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The configured error marker.
    #[must_use]
    pub fn error_marker(&self) -> Option<&str> {
        self.error_marker.as_deref()
    }

    /// The program that is spawned.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Decoder for BinaryDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_kind(&self) -> OutputKind {
        self.output_kind
    }

    #[instrument(skip(self), fields(decoder = %self.name, file = %path.display()))]
    async fn decode(&self, path: &Path) -> Result<String, DecodeError> {
        let mut args = self.args.clone();
        args.push(path.as_os_str().to_os_string());
        args.extend(self.append.iter().cloned());

        let output = run_captured(&self.program, &args, None, self.timeout).await?;
        debug!(status = %output.status, "decoder exited");
        judge_output(
            self.error_marker.as_deref(),
            self.output_kind,
            &output.stdout,
            &output.stderr,
        )
    }
}
