//! billsort Extractor
//!
//! Turns decoded invoice text (or invoice images) into structured [`Record`]s.
//!
//! # Overview
//!
//! Every strategy implements the domain [`Extractor`] trait, so the pipeline never
//! knows which one it is driving. Strategies differ in accuracy and cost, not in
//! contract: none of them returns an error. A backend failure comes back as a
//! record tagged with a failure method and zero confidence.
//!
//! # Architecture
//!
//! ```text
//! text ──► PromptBuilder ──► LlmProvider ──► parser ──► (FieldValidator) ──► Record
//! image ─► vision prompt ──► LlmProvider ──► parser ───────────────────────► Record
//! ```
//!
//! # Strategies
//!
//! | Strategy | Text method | Image method |
//! |----------|-------------|--------------|
//! | [`LlmExtractor`] | `llm` | `llm_vision` |
//! | [`HybridExtractor`] | `hybrid` | `hybrid_vision` |
//! | [`VisionExtractor`] | `llm` | `vision` |
//! | [`RegexFallbackExtractor`] | `regex_fallback` | `regex_fallback_unsupported` |
//!
//! # Example Usage
//!
//! ```
//! use billsort_domain::traits::Extractor;
//! use billsort_extractor::{build_extractor, ExtractionMode, ExtractorConfig};
//! use billsort_llm::{MockProvider, SharedProvider};
//! use std::sync::Arc;
//!
//! let provider: SharedProvider = Arc::new(MockProvider::new(
//!     r#"{"invoice_number": "12345678", "seller_name": "Acme", "buyer_name": "Globex"}"#,
//! ));
//! let built = build_extractor(&ExtractorConfig::default(), Some(provider)).unwrap();
//! assert_eq!(built.mode, ExtractionMode::Hybrid);
//!
//! let record = built.extractor.extract("发票号码：12345678", None);
//! assert_eq!(record.identifier(), Some("12345678"));
//! assert_eq!(record.method(), "hybrid");
//! ```
//!
//! [`Record`]: billsort_domain::Record
//! [`Extractor`]: billsort_domain::traits::Extractor

#![warn(missing_docs)]

mod config;
mod error;
mod factory;
mod hybrid;
mod llm;
mod parser;
mod prompt;
mod regex_fallback;
mod validator;
mod vision;


pub use config::{ExtractionMode, ExtractorConfig};
pub use error::ExtractorError;
pub use factory::{build_extractor, BuiltExtractor};
pub use hybrid::HybridExtractor;
pub use llm::LlmExtractor;
pub use parser::parse_llm_response;
pub use prompt::{vision_prompt, PromptBuilder};
pub use regex_fallback::RegexFallbackExtractor;
pub use validator::{FieldValidator, StandardInvoiceRules};
pub use vision::VisionExtractor;
