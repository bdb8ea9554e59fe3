//! Document, attachment, view, and docket records.
//!
//! These are the values that flow between the store and the pipeline stages.
//! A [`View`] carries the per-rendition processing state:
//! `downloaded → decoded → {text | failed}`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of text extraction for one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStatus {
    /// Not yet attempted, or reset for reprocessing.
    #[default]
    Pending,
    /// A decoder produced accepted text.
    Success,
    /// Every decoder in the chain failed. Terminal until explicitly reset.
    Failed,
}

impl DecodeStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DecodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid decode status: {s}")),
        }
    }
}

/// One retrievable representation of a document or attachment.
///
/// The `url` is the view's identity within its owner's view list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub url: String,
    pub object_id: Option<String>,
    /// File-type token as published by the portal (`pdf`, `msw8`, `crtext`, ...).
    pub file_type: String,
    /// Local path of the downloaded rendition.
    pub file: Option<PathBuf>,
    pub downloaded: bool,
    pub decoded: DecodeStatus,
    pub text: Option<String>,
    /// Whether the accepted text came from OCR.
    pub ocr: bool,
}

impl View {
    /// Creates a fresh, not-yet-downloaded view.
    #[must_use]
    pub fn new(url: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            object_id: None,
            file_type: file_type.into(),
            file: None,
            downloaded: false,
            decoded: DecodeStatus::Pending,
            text: None,
            ocr: false,
        }
    }

    /// Sets the portal object id.
    #[must_use]
    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Records a completed download. Decoding becomes eligible again.
    pub fn mark_downloaded(&mut self, file: PathBuf) {
        self.downloaded = true;
        self.file = Some(file);
        self.decoded = DecodeStatus::Pending;
        self.text = None;
        self.ocr = false;
    }

    /// Records accepted text from a decoder.
    pub fn mark_decoded(&mut self, text: String, ocr: bool) {
        self.decoded = DecodeStatus::Success;
        self.text = Some(text);
        self.ocr = ocr;
    }

    /// Records chain exhaustion.
    pub fn mark_decode_failed(&mut self) {
        self.decoded = DecodeStatus::Failed;
        self.text = None;
        self.ocr = false;
    }

    /// Lowercased extension of the local file, used to pick a decoder chain.
    #[must_use]
    pub fn file_extension(&self) -> Option<String> {
        self.file
            .as_ref()
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// A secondary file bundled with a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub object_id: String,
    pub title: Option<String>,
    pub views: Vec<View>,
}

/// A filing discovered on the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub docket_id: Option<String>,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub doc_type: Option<String>,
    pub views: Vec<View>,
    pub attachments: Vec<Attachment>,
}

impl Document {
    /// Creates a document with no views or attachments.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            docket_id: None,
            title: None,
            agency: None,
            doc_type: None,
            views: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Returns the document-level view with the given url.
    #[must_use]
    pub fn view(&self, url: &str) -> Option<&View> {
        self.views.iter().find(|view| view.url == url)
    }

    /// Returns the attachment with the given object id.
    #[must_use]
    pub fn attachment(&self, object_id: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|attachment| attachment.object_id == object_id)
    }
}

/// Scrape progress of a docket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    #[default]
    Pending,
    Scraped,
    Failed,
}

impl ScrapeStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraped => "scraped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scraped" => Ok(Self::Scraped),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid scrape status: {s}")),
        }
    }
}

/// A docket scrape task and, once scraped, its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocketRecord {
    /// Store identity of the record.
    pub id: String,
    pub docket_id: String,
    pub scraped: ScrapeStatus,
    pub failure_reason: Option<String>,
    /// Scraped docket metadata as returned by the remote client.
    pub payload: Option<serde_json::Value>,
}

impl DocketRecord {
    /// A new, not-yet-scraped docket keyed by its docket id.
    #[must_use]
    pub fn pending(docket_id: impl Into<String>) -> Self {
        let docket_id = docket_id.into();
        Self {
            id: docket_id.clone(),
            docket_id,
            scraped: ScrapeStatus::Pending,
            failure_reason: None,
            payload: None,
        }
    }

    /// The successful scrape of this record, keeping its store identity.
    #[must_use]
    pub fn scraped_with(&self, payload: serde_json::Value) -> Self {
        Self {
            id: self.id.clone(),
            docket_id: self.docket_id.clone(),
            scraped: ScrapeStatus::Scraped,
            failure_reason: None,
            payload: Some(payload),
        }
    }

    /// This record marked as permanently failed.
    #[must_use]
    pub fn failed_with(&self, reason: impl Into<String>) -> Self {
        Self {
            scraped: ScrapeStatus::Failed,
            failure_reason: Some(reason.into()),
            ..self.clone()
        }
    }
}
