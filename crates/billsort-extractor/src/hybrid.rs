//! Hybrid strategy: LLM extraction checked and completed by format rules

use crate::config::ExtractorConfig;
use crate::llm::LlmExtractor;
use crate::validator::{FieldValidator, StandardInvoiceRules};
use billsort_domain::traits::{Extractor, LlmProvider};
use billsort_domain::{Record, RecordFields};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// LLM extraction followed by rule-based validation against the source text
///
/// The rules repair what models most often get wrong: malformed invoice numbers,
/// hallucinated tax identifiers and amounts carrying currency symbols. When the
/// LLM call itself fails the rules still run, so a record can be recovered from
/// the text alone.
pub struct HybridExtractor<L: ?Sized> {
    llm: LlmExtractor<L>,
    validator: Arc<dyn FieldValidator>,
}

impl<L> HybridExtractor<L>
where
    L: LlmProvider + ?Sized,
    L::Error: Display,
{
    /// Create a hybrid extractor using [`StandardInvoiceRules`]
    pub fn new(provider: Arc<L>, config: ExtractorConfig) -> Self {
        Self::with_validator(provider, config, Arc::new(StandardInvoiceRules))
    }

    /// Create a hybrid extractor with custom validation rules
    pub fn with_validator(
        provider: Arc<L>,
        config: ExtractorConfig,
        validator: Arc<dyn FieldValidator>,
    ) -> Self {
        Self {
            llm: LlmExtractor::new(provider, config),
            validator,
        }
    }
}

impl<L> Extractor for HybridExtractor<L>
where
    L: LlmProvider + Send + Sync + ?Sized,
    L::Error: Display,
{
    fn extract(&self, text: &str, file_name: Option<&str>) -> Record {
        info!(source = file_name.unwrap_or("<text>"), "extracting with hybrid strategy");
        let (fields, raw) = match self.llm.fields_from_text(text, file_name) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "LLM step failed, relying on rules");
                (RecordFields::default(), e.to_string())
            }
        };

        let fields = enhance(fields, text, self.validator.as_ref());
        let record = Record::new(fields, "hybrid").with_raw_response(raw);
        info!(confidence = record.confidence(), "hybrid extraction complete");
        record
    }

    fn extract_from_image(&self, path: &Path) -> Record {
        let record = self.llm.extract_from_image(path);
        if record.method() == "llm_vision" {
            record.with_method("hybrid_vision")
        } else {
            record
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Validate and complete LLM-extracted fields against the source text
pub(crate) fn enhance(
    mut fields: RecordFields,
    text: &str,
    validator: &dyn FieldValidator,
) -> RecordFields {
    // Invoice number: fill when missing, replace when malformed
    let current = fields.identifier().map(str::to_string);
    match current {
        None => fields.invoice_number = validator.find_identifier(text),
        Some(current) if !validator.is_valid_identifier(&current) => {
            if let Some(found) = validator.find_identifier(text) {
                info!(llm = %current, rules = %found, "replacing malformed invoice number");
                fields.invoice_number = Some(found);
            }
        }
        Some(_) => {}
    }

    // Tax ids: buyer is printed first, seller second
    if blank(&fields.buyer_tax_id) {
        fields.buyer_tax_id = validator.find_tax_ids(text).into_iter().next();
    } else if let Some(id) = &fields.buyer_tax_id {
        if !validator.is_valid_tax_id(id.trim()) {
            fields.buyer_tax_id = None;
        }
    }

    if blank(&fields.seller_tax_id) {
        fields.seller_tax_id = validator.find_tax_ids(text).into_iter().nth(1);
    } else if let Some(id) = &fields.seller_tax_id {
        if !validator.is_valid_tax_id(id.trim()) {
            fields.seller_tax_id = None;
        }
    }

    for amount in [
        &mut fields.total_amount,
        &mut fields.amount,
        &mut fields.tax_amount,
    ] {
        if let Some(value) = amount.take() {
            *amount = validator.clean_amount(&value);
        }
    }

    fields
}
