//! Trait definitions for external interactions
//!
//! These traits define the boundaries between domain logic and infrastructure.
//! Infrastructure implementations live in other crates.

use crate::Record;
use std::path::Path;

/// Trait for LLM provider operations
///
/// Implemented by the infrastructure layer (billsort-llm)
pub trait LlmProvider {
    /// Error type for LLM operations
    type Error;

    /// Name of the model this provider talks to
    fn model_name(&self) -> &str;

    /// Generate text completion
    fn generate(&self, prompt: &str) -> Result<String, Self::Error>;

    /// Generate a completion grounded on an image file
    fn generate_with_image(&self, prompt: &str, image: &Path) -> Result<String, Self::Error>;

    /// Cheap reachability check; providers without one report available
    fn is_available(&self) -> bool {
        true
    }
}

/// Trait for turning document content into a [`Record`]
///
/// Implemented by the application layer (billsort-extractor). Implementations never
/// fail outright: backend problems come back as a record tagged with a failure
/// method and zero confidence.
pub trait Extractor: Send + Sync {
    /// Extract fields from decoded text, optionally hinted with the source file name
    fn extract(&self, text: &str, file_name: Option<&str>) -> Record;

    /// Extract fields directly from an image file
    fn extract_from_image(&self, path: &Path) -> Record;
}

/// Trait for turning a document container into plain text
///
/// Implemented by the pipeline layer, one decoder per [`crate::FileKind`].
/// `None` means no usable text could be recovered.
pub trait TextDecoder: Send + Sync {
    /// Decode the file at `path`
    fn decode(&self, path: &Path) -> Option<String>;
}
