//! Strategy selection with degraded-mode fallback

use crate::config::{ExtractionMode, ExtractorConfig};
use crate::error::ExtractorError;
use crate::{HybridExtractor, LlmExtractor, RegexFallbackExtractor, VisionExtractor};
use billsort_domain::traits::Extractor;
use billsort_llm::SharedProvider;
use std::sync::Arc;
use tracing::{info, warn};

/// The extractor chosen for a run and the mode it actually runs in
pub struct BuiltExtractor {
    /// The strategy, ready to share across worker threads
    pub extractor: Arc<dyn Extractor>,
    /// Effective mode; differs from the requested one when degraded
    pub mode: ExtractionMode,
    /// True when the requested mode needed a provider that was not usable
    pub degraded: bool,
}

impl std::fmt::Debug for BuiltExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltExtractor")
            .field("mode", &self.mode)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

/// Build the strategy described by `config`
///
/// When the mode needs an LLM and `provider` is `None` (construction failed) or
/// reports itself unavailable, the run degrades to the regex strategy instead of
/// aborting.
///
/// # Errors
///
/// Returns `ExtractorError::Config` when `config` fails validation.
pub fn build_extractor(
    config: &ExtractorConfig,
    provider: Option<SharedProvider>,
) -> Result<BuiltExtractor, ExtractorError> {
    config.validate().map_err(ExtractorError::Config)?;

    if !config.mode.needs_provider() {
        return Ok(regex_fallback(false));
    }

    let provider = match provider {
        Some(p) if p.is_available() => p,
        Some(p) => {
            warn!(
                model = p.model_name(),
                requested = %config.mode,
                "LLM provider unavailable, falling back to regex extraction"
            );
            return Ok(regex_fallback(true));
        }
        None => {
            warn!(
                requested = %config.mode,
                "no LLM provider configured, falling back to regex extraction"
            );
            return Ok(regex_fallback(true));
        }
    };

    info!(mode = %config.mode, model = provider.model_name(), "extractor ready");
    let extractor: Arc<dyn Extractor> = match config.mode {
        ExtractionMode::Llm => Arc::new(LlmExtractor::new(provider, config.clone())),
        ExtractionMode::Hybrid => Arc::new(HybridExtractor::new(provider, config.clone())),
        ExtractionMode::Vision => Arc::new(VisionExtractor::new(provider, config.clone())),
        ExtractionMode::RegexFallback => Arc::new(RegexFallbackExtractor::new()),
    };

    Ok(BuiltExtractor {
        extractor,
        mode: config.mode,
        degraded: false,
    })
}

fn regex_fallback(degraded: bool) -> BuiltExtractor {
    BuiltExtractor {
        extractor: Arc::new(RegexFallbackExtractor::new()),
        mode: ExtractionMode::RegexFallback,
        degraded,
    }
}
