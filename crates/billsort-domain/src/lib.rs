//! billsort Domain Layer
//!
//! Value types and trait seams shared by every other billsort crate.
//! Like any clean domain layer it has ZERO external dependencies: infrastructure
//! (LLM clients, document decoders, on-disk stores) lives in the outer crates and
//! plugs in through the traits defined here.
//!
//! ## Key Concepts
//!
//! - **Record**: the structured fields extracted from one document, plus the tag of
//!   the strategy that produced it and a completeness-derived confidence
//! - **ProcessingOutcome**: the single terminal result (success, failure or skip)
//!   for one file in one run
//! - **FileKind**: which supported container a file is, and therefore how it is read
//! - **Traits**: `LlmProvider`, `Extractor`, `TextDecoder`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file_kind;
pub mod outcome;
pub mod record;
pub mod traits;

// Re-exports for convenience
pub use file_kind::{FileKind, SUPPORTED_EXTENSIONS};
pub use outcome::{OutcomeStatus, ProcessingOutcome};
pub use record::{Record, RecordFields, SCORED_FIELD_COUNT};
