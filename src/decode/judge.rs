//! Success judgment for raw extraction output.
//!
//! Every binary-backed decoder feeds its captured output through
//! [`judge_output`], which applies the rules in a fixed order:
//!
//! 1. the decoder's error marker in stdout or stderr means failure
//! 2. `text` output that is blank means failure
//! 3. `html` output whose body is blank once markup is stripped means failure
//! 4. anything else is accepted (`html` output has its `&nbsp;` family
//!    normalised to plain spaces first)
//!
//! Accepted text always has control characters removed.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DecodeError;

/// Declared shape of a decoder's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Text,
    Html,
}

#[allow(clippy::expect_used)]
static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").expect("body regex is valid"));

/// pdftohtml's generated outline block.
#[allow(clippy::expect_used)]
static OUTLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a name="outline"></a>\s*<h1>Document Outline</h1>\s*<ul>.*</ul>"#)
        .expect("outline regex is valid")
});

#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*?>").expect("tag regex is valid"));

#[allow(clippy::expect_used)]
static NBSP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&nbsp;?|&#160;?|&#xa0;?").expect("nbsp regex is valid"));

/// Decides whether captured output is usable text.
///
/// # Errors
///
/// Returns [`DecodeError::ExtractionFailed`] when any failure rule matches.
pub fn judge_output(
    error_marker: Option<&str>,
    kind: OutputKind,
    stdout: &str,
    stderr: &str,
) -> Result<String, DecodeError> {
    if let Some(marker) = error_marker.filter(|m| !m.is_empty())
        && (stdout.contains(marker) || stderr.contains(marker))
    {
        return Err(DecodeError::extraction_failed(format!(
            "output contained error marker {marker:?}"
        )));
    }

    match kind {
        OutputKind::Text => {
            if stdout.trim().is_empty() {
                return Err(DecodeError::extraction_failed("no text output"));
            }
            Ok(sanitize_control_chars(stdout))
        }
        OutputKind::Html => {
            if html_is_empty(stdout) {
                return Err(DecodeError::extraction_failed("html body is empty"));
            }
            Ok(sanitize_control_chars(&normalize_nbsp(stdout)))
        }
    }
}

/// True if the document has no `<body>` or its body carries no text.
#[must_use]
pub fn html_is_empty(html: &str) -> bool {
    let Some(body) = BODY.captures(html).and_then(|c| c.get(1)) else {
        return true;
    };
    let without_outline = OUTLINE.replace_all(body.as_str(), "");
    TAG.replace_all(&without_outline, "").trim().is_empty()
}

/// Replaces `&nbsp;`, `&#160;` and `&#xa0;` (trailing `;` optional) with a space.
#[must_use]
pub fn normalize_nbsp(text: &str) -> Cow<'_, str> {
    NBSP.replace_all(text, " ")
}

/// Removes C0 and C1 control characters, keeping line feeds and carriage returns.
#[must_use]
pub fn sanitize_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\n' || c == '\r' || !is_stripped_control(c))
        .collect()
}

fn is_stripped_control(c: char) -> bool {
    matches!(u32::from(c), 0x00..=0x1f | 0x7f..=0x9f)
}
