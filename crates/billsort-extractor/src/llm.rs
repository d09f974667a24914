//! LLM-only extraction strategy

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::parser::parse_llm_response;
use crate::prompt::{vision_prompt, PromptBuilder};
use billsort_domain::traits::{Extractor, LlmProvider};
use billsort_domain::{Record, RecordFields};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extracts fields by prompting an LLM and parsing its JSON answer
pub struct LlmExtractor<L: ?Sized> {
    provider: Arc<L>,
    config: ExtractorConfig,
}

impl<L> LlmExtractor<L>
where
    L: LlmProvider + ?Sized,
    L::Error: Display,
{
    /// Create a new LLM extractor
    pub fn new(provider: Arc<L>, config: ExtractorConfig) -> Self {
        Self { provider, config }
    }

    /// Name of the model behind this extractor
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Prompt with document text; returns parsed fields and the raw response
    pub(crate) fn fields_from_text(
        &self,
        text: &str,
        file_name: Option<&str>,
    ) -> Result<(RecordFields, String), ExtractorError> {
        let prompt = PromptBuilder::new(text)
            .with_file_name(file_name)
            .with_max_text_length(self.config.max_text_length)
            .build();
        debug!(prompt_len = prompt.len(), model = self.model_name(), "calling LLM");

        let response = self
            .provider
            .generate(&prompt)
            .map_err(|e| ExtractorError::Llm(e.to_string()))?;
        debug!(response_len = response.len(), "LLM responded");

        Ok((parse_llm_response(&response), response))
    }

    /// Prompt with an image; returns parsed fields and the raw response
    pub(crate) fn fields_from_image(
        &self,
        path: &Path,
    ) -> Result<(RecordFields, String), ExtractorError> {
        let response = self
            .provider
            .generate_with_image(&vision_prompt(), path)
            .map_err(|e| ExtractorError::Llm(e.to_string()))?;
        Ok((parse_llm_response(&response), response))
    }
}

impl<L> Extractor for LlmExtractor<L>
where
    L: LlmProvider + Send + Sync + ?Sized,
    L::Error: Display,
{
    fn extract(&self, text: &str, file_name: Option<&str>) -> Record {
        info!(source = file_name.unwrap_or("<text>"), "extracting with LLM");
        match self.fields_from_text(text, file_name) {
            Ok((fields, raw)) => {
                let record = Record::new(fields, "llm").with_raw_response(raw);
                info!(confidence = record.confidence(), "LLM extraction complete");
                record
            }
            Err(e) => {
                warn!(error = %e, "LLM extraction failed");
                Record::failed("llm_failed", Some(e.to_string()))
            }
        }
    }

    fn extract_from_image(&self, path: &Path) -> Record {
        info!(file = %path.display(), "extracting image with LLM vision");
        match self.fields_from_image(path) {
            Ok((fields, raw)) => Record::new(fields, "llm_vision").with_raw_response(raw),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "LLM vision extraction failed");
                Record::failed("llm_vision_failed", Some(e.to_string()))
            }
        }
    }
}
