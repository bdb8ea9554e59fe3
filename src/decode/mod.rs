//! Text extraction from downloaded files.
//!
//! A [`Decoder`] turns one local file into text or fails. Decoders are grouped
//! into per-file-type fallback chains by the [`DecoderRegistry`]; the first
//! decoder whose output passes [`judge_output`] wins. The [`DecodePass`] runs
//! the registry over every downloaded view that has not been decoded yet.
//!
//! External programs are always run with a hard deadline and killed when it
//! passes.

mod decoder;
mod error;
mod judge;
mod ocr;
mod pass;
mod process;
mod registry;

pub use decoder::{BinaryDecoder, DEFAULT_DECODE_TIMEOUT, Decoder};
pub use error::DecodeError;
pub use judge::{OutputKind, html_is_empty, judge_output, normalize_nbsp, sanitize_control_chars};
pub use ocr::{OcrDecoder, ocr_scrub};
pub use pass::{DEFAULT_DECODE_CONCURRENCY, DecodePass, DecodePassError, DecodePassSummary};
pub use process::{CapturedOutput, run_captured};
pub use registry::{ChainOutcome, DecoderChain, DecoderRegistry};
