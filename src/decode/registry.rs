//! File-type → decoder chain lookup and fallback execution.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::decoder::{BinaryDecoder, Decoder};
use super::ocr::OcrDecoder;
use crate::config::DecodeConfig;
use crate::model::View;

const NO_CONTENT_MARKER: &str = "The document does not have a content file of type";

/// Shared, ordered decoder list for one file type.
pub type DecoderChain = Vec<Arc<dyn Decoder>>;

/// Result of running one chain against one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A decoder produced accepted text.
    Decoded {
        text: String,
        ocr: bool,
        decoder: String,
    },
    /// Every decoder failed.
    Exhausted { attempts: usize },
    /// No chain is registered for the file type.
    NoChain,
}

/// Registry of decoder chains keyed by file-type token.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    chains: HashMap<String, DecoderChain>,
    aliases: HashMap<String, String>,
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<_> = self.tokens();
        tokens.sort_unstable();
        f.debug_struct("DecoderRegistry")
            .field("tokens", &tokens)
            .finish()
    }
}

impl DecoderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chains for the portal's file types.
    #[must_use]
    pub fn with_defaults(config: &DecodeConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let binary = |program: &str, marker: &str| -> Arc<dyn Decoder> {
            Arc::new(
                BinaryDecoder::new(program)
                    .with_error_marker(marker)
                    .with_timeout(timeout),
            )
        };

        let mut pdf: DecoderChain = vec![
            Arc::new(
                BinaryDecoder::new("pdftotext")
                    .with_append(["-"])
                    .with_error_marker("PDF file is damaged")
                    .with_timeout(timeout),
            ),
            binary("ps2ascii", "Unrecoverable error"),
        ];
        if config.ocr {
            pdf.push(Arc::new(OcrDecoder::new().with_timeout(timeout)));
        }

        let docx: Arc<dyn Decoder> = Arc::new(
            BinaryDecoder::script(
                config.interpreter.clone(),
                config.scripts_dir.join("extract_docx.py"),
            )
            .with_error_marker("Failed to decode file")
            .with_timeout(timeout),
        );

        let mut registry = Self::new();
        registry.register("xml", vec![binary("html2text", NO_CONTENT_MARKER)]);
        registry.register("pdf", pdf);
        registry.register(
            "msw8",
            vec![
                binary("antiword", "is not a Word Document"),
                binary("catdoc", NO_CONTENT_MARKER),
            ],
        );
        registry.register("rtf", vec![binary("catdoc", NO_CONTENT_MARKER)]);
        registry.register("txt", vec![binary("cat", NO_CONTENT_MARKER)]);
        registry.register("msw12", vec![docx]);
        registry.register("wp8", vec![binary("wpd2text", "ERROR")]);

        registry.alias("crtext", "xml");
        registry.alias("html", "xml");
        registry.alias("msw6", "msw8");
        registry.alias("msw", "msw8");
        registry
    }

    /// Registers (or replaces) the chain for `token`.
    pub fn register(&mut self, token: impl Into<String>, chain: DecoderChain) {
        let token = token.into().to_ascii_lowercase();
        self.aliases.remove(&token);
        self.chains.insert(token, chain);
    }

    /// Makes `alias` resolve to `target`'s chain.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(
            alias.into().to_ascii_lowercase(),
            target.into().to_ascii_lowercase(),
        );
    }

    /// Chain for a token, following one level of aliasing.
    #[must_use]
    pub fn chain(&self, token: &str) -> Option<&[Arc<dyn Decoder>]> {
        let token = token.to_ascii_lowercase();
        let key = self.aliases.get(&token).unwrap_or(&token);
        self.chains.get(key).map(Vec::as_slice)
    }

    /// Every registered token and alias.
    #[must_use]
    pub fn tokens(&self) -> Vec<&str> {
        self.chains
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
            .collect()
    }

    /// Tries each decoder for `token` in order; the first success wins.
    #[instrument(skip(self), fields(file = %path.display()))]
    pub async fn decode_file(&self, token: &str, path: &Path) -> ChainOutcome {
        let Some(chain) = self.chain(token) else {
            return ChainOutcome::NoChain;
        };

        for decoder in chain {
            match decoder.decode(path).await {
                Ok(text) => {
                    info!(decoder = decoder.name(), ocr = decoder.is_ocr(), "decoded");
                    return ChainOutcome::Decoded {
                        text,
                        ocr: decoder.is_ocr(),
                        decoder: decoder.name().to_string(),
                    };
                }
                Err(error) => {
                    info!(decoder = decoder.name(), error = %error, "decoder failed");
                }
            }
        }

        ChainOutcome::Exhausted {
            attempts: chain.len(),
        }
    }

    /// Decodes a downloaded view and returns it with its decode state settled.
    ///
    /// A view without a local file, or whose file type has no chain, is
    /// marked failed.
    pub async fn decode_view(&self, mut view: View) -> View {
        let (Some(file), Some(token)) = (view.file.clone(), view.file_extension()) else {
            warn!(url = %view.url, "view has no decodable local file");
            view.mark_decode_failed();
            return view;
        };

        match self.decode_file(&token, &file).await {
            ChainOutcome::Decoded { text, ocr, .. } => view.mark_decoded(text, ocr),
            ChainOutcome::Exhausted { attempts } => {
                warn!(url = %view.url, file = %file.display(), attempts, "all decoders failed");
                view.mark_decode_failed();
            }
            ChainOutcome::NoChain => {
                warn!(url = %view.url, token, "no decoder chain for file type");
                view.mark_decode_failed();
            }
        }
        view
    }
}
