//! Record module - the structured result of extracting one document

use std::fmt;

/// Number of fields that contribute to the completeness score
pub const SCORED_FIELD_COUNT: usize = 8;

/// The raw field values pulled out of an invoice
///
/// Every field is optional: extraction strategies fill in what they can find.
/// A field holding only whitespace is treated the same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFields {
    /// Invoice number - the natural key used for deduplication
    pub invoice_number: Option<String>,
    /// Invoice type (e.g. "VAT special invoice")
    pub invoice_type: Option<String>,
    /// Issue date as printed on the document
    pub issue_date: Option<String>,
    /// Buyer (party B) name
    pub buyer_name: Option<String>,
    /// Buyer tax identifier
    pub buyer_tax_id: Option<String>,
    /// Seller (party A) name
    pub seller_name: Option<String>,
    /// Seller tax identifier
    pub seller_tax_id: Option<String>,
    /// Amount before tax
    pub amount: Option<String>,
    /// Tax amount
    pub tax_amount: Option<String>,
    /// Total including tax
    pub total_amount: Option<String>,
    /// Free-text goods/services description
    pub content: Option<String>,
    /// Remark printed on the invoice
    pub remark: Option<String>,
}

impl RecordFields {
    /// Fraction (0.0-1.0) of the scored field subset that is filled in
    ///
    /// The subset is: invoice number, invoice type, issue date, both party names,
    /// both party tax identifiers and the tax-inclusive total.
    pub fn completeness_score(&self) -> f64 {
        let scored = [
            &self.invoice_number,
            &self.invoice_type,
            &self.issue_date,
            &self.buyer_name,
            &self.buyer_tax_id,
            &self.seller_name,
            &self.seller_tax_id,
            &self.total_amount,
        ];
        let filled = scored.iter().filter(|f| is_filled(f)).count();
        filled as f64 / SCORED_FIELD_COUNT as f64
    }

    /// The trimmed invoice number, if any
    pub fn identifier(&self) -> Option<&str> {
        self.invoice_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn is_filled(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// The output of one extraction attempt
///
/// Records are immutable once built. The confidence is always derived from the
/// completeness of the fields, so two records with the same fields carry the same
/// confidence regardless of which strategy produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: RecordFields,
    method: String,
    confidence: f64,
    raw_response: Option<String>,
}

impl Record {
    /// Build a record from extracted fields, tagging the producing strategy
    pub fn new(fields: RecordFields, method: impl Into<String>) -> Self {
        let confidence = fields.completeness_score();
        Self {
            fields,
            method: method.into(),
            confidence,
            raw_response: None,
        }
    }

    /// Build an empty record tagged with a failure marker
    ///
    /// Strategies return this instead of an error so that a backend failure never
    /// escapes the extractor. The optional text is kept for diagnostics.
    pub fn failed(method: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self {
            fields: RecordFields::default(),
            method: method.into(),
            confidence: 0.0,
            raw_response: diagnostic,
        }
    }

    /// Attach the raw backend response for diagnostics
    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    /// Re-tag the record with a different method, keeping everything else
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Extracted field values
    pub fn fields(&self) -> &RecordFields {
        &self.fields
    }

    /// Consume the record, returning its fields and raw response
    pub fn into_parts(self) -> (RecordFields, Option<String>) {
        (self.fields, self.raw_response)
    }

    /// Tag identifying the strategy that produced this record
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Completeness-derived confidence in [0.0, 1.0]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Raw backend response, if retained
    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }

    /// The trimmed invoice number, if any
    pub fn identifier(&self) -> Option<&str> {
        self.fields.identifier()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {:.0}%]",
            self.identifier().unwrap_or("<no number>"),
            self.method,
            self.confidence * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    fn fields_from_mask(mask: [bool; SCORED_FIELD_COUNT]) -> RecordFields {
        let pick = |i: usize, v: &str| if mask[i] { some(v) } else { None };
        RecordFields {
            invoice_number: pick(0, "24442000000012345678"),
            invoice_type: pick(1, "electronic"),
            issue_date: pick(2, "2024-05-01"),
            buyer_name: pick(3, "Buyer Ltd"),
            buyer_tax_id: pick(4, "91110000MA01ABCD2X"),
            seller_name: pick(5, "Seller Co"),
            seller_tax_id: pick(6, "91310000MA1FL0XY3K"),
            total_amount: pick(7, "113.00"),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_record_has_zero_confidence() {
        let record = Record::new(RecordFields::default(), "llm");
        assert_eq!(record.confidence(), 0.0);
        assert_eq!(record.method(), "llm");
    }

    #[test]
    fn test_full_record_has_full_confidence() {
        let record = Record::new(fields_from_mask([true; SCORED_FIELD_COUNT]), "hybrid");
        assert_eq!(record.confidence(), 1.0);
    }

    #[test]
    fn test_blank_fields_do_not_count() {
        let fields = RecordFields {
            invoice_number: some("   "),
            seller_name: some("Seller Co"),
            ..Default::default()
        };
        assert_eq!(fields.completeness_score(), 1.0 / 8.0);
        assert_eq!(fields.identifier(), None);
    }

    #[test]
    fn test_unscored_fields_do_not_count() {
        let fields = RecordFields {
            amount: some("100.00"),
            tax_amount: some("13.00"),
            content: some("consulting"),
            remark: some("n/a"),
            ..Default::default()
        };
        assert_eq!(fields.completeness_score(), 0.0);
    }

    #[test]
    fn test_failed_record() {
        let record = Record::failed("llm_failed", Some("connection refused".into()));
        assert_eq!(record.confidence(), 0.0);
        assert_eq!(record.raw_response(), Some("connection refused"));
        assert!(record.identifier().is_none());
    }

    #[test]
    fn test_identifier_is_trimmed() {
        let fields = RecordFields {
            invoice_number: some("  A00123 \n"),
            seller_name: some("Seller Co"),
            ..Default::default()
        };
        let record = Record::new(fields, "llm");
        assert_eq!(record.identifier(), Some("A00123"));
        assert_eq!(record.to_string(), "A00123 [llm 25%]");
    }

    proptest! {
        #[test]
        fn prop_more_fields_never_lower_confidence(
            base in proptest::array::uniform8(any::<bool>()),
            extra in proptest::array::uniform8(any::<bool>()),
        ) {
            let mut superset = base;
            for i in 0..SCORED_FIELD_COUNT {
                superset[i] |= extra[i];
            }
            let fewer = Record::new(fields_from_mask(base), "llm");
            let more = Record::new(fields_from_mask(superset), "llm");
            prop_assert!(more.confidence() >= fewer.confidence());
        }

        #[test]
        fn prop_confidence_in_unit_interval(mask in proptest::array::uniform8(any::<bool>())) {
            let record = Record::new(fields_from_mask(mask), "regex_fallback");
            prop_assert!((0.0..=1.0).contains(&record.confidence()));
        }
    }
}
