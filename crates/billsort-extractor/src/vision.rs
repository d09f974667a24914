//! Vision strategy: a multimodal model reads invoice images directly

use crate::config::ExtractorConfig;
use crate::llm::LlmExtractor;
use billsort_domain::traits::{Extractor, LlmProvider};
use billsort_domain::Record;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Sends images straight to a vision-capable model; text goes through the plain
/// LLM strategy
pub struct VisionExtractor<L: ?Sized> {
    llm: LlmExtractor<L>,
}

impl<L> VisionExtractor<L>
where
    L: LlmProvider + ?Sized,
    L::Error: Display,
{
    /// Create a new vision extractor
    pub fn new(provider: Arc<L>, config: ExtractorConfig) -> Self {
        Self {
            llm: LlmExtractor::new(provider, config),
        }
    }
}

impl<L> Extractor for VisionExtractor<L>
where
    L: LlmProvider + Send + Sync + ?Sized,
    L::Error: Display,
{
    fn extract(&self, text: &str, file_name: Option<&str>) -> Record {
        self.llm.extract(text, file_name)
    }

    fn extract_from_image(&self, path: &Path) -> Record {
        info!(file = %path.display(), "extracting with vision strategy");
        let record = self.llm.extract_from_image(path);
        if record.method() == "llm_vision" {
            record.with_method("vision")
        } else {
            record
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billsort_llm::MockProvider;

    #[test]
    fn test_vision_tags() {
        let mock = MockProvider::new(r#"{"invoice_number": "12345678"}"#);
        let extractor = VisionExtractor::new(Arc::new(mock), ExtractorConfig::default());

        let image = extractor.extract_from_image(Path::new("scan.jpg"));
        assert_eq!(image.method(), "vision");
        assert_eq!(image.identifier(), Some("12345678"));

        let text = extractor.extract("text", None);
        assert_eq!(text.method(), "llm");
    }
}
