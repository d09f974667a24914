//! Field validation rules
//!
//! The hybrid strategy checks and completes LLM output with format rules. The rules
//! are a trait so other invoice regimes can plug in their own formats.

use regex::Regex;
use std::sync::LazyLock;

/// Format rules for identifiers, tax identifiers and amounts
pub trait FieldValidator: Send + Sync {
    /// Whether `value` is a well-formed invoice number
    fn is_valid_identifier(&self, value: &str) -> bool;

    /// Find an invoice number in raw document text
    fn find_identifier(&self, text: &str) -> Option<String>;

    /// Whether `value` is a well-formed tax identifier
    fn is_valid_tax_id(&self, value: &str) -> bool;

    /// All distinct tax identifiers in raw document text, in order of appearance
    fn find_tax_ids(&self, text: &str) -> Vec<String>;

    /// Normalise a monetary amount; `None` when it is not a number
    fn clean_amount(&self, value: &str) -> Option<String>;
}

static RE_E_INVOICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(24[4-8]\d{17})\b").expect("valid e-invoice regex"));
static RE_PAPER_INVOICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"发票号码[：:]\s*(\d{8})").expect("valid paper invoice regex"));
static RE_TAX_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-9A-HJ-NPQRTUWXY]{2}[0-9]{6}[0-9A-HJ-NPQRTUWXY]{10})\b")
        .expect("valid tax id regex")
});
static RE_CREDIT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-HJ-NPQRTUWXY]{2}[0-9]{6}[0-9A-HJ-NPQRTUWXY]{10}$")
        .expect("valid credit code regex")
});

/// Rules for mainland Chinese VAT invoices
///
/// - Invoice numbers: 20-digit electronic numbers starting `244`-`248`, or 8-digit
///   paper numbers printed after the `发票号码` label
/// - Tax identifiers: 18-character unified social credit codes, or 15-character
///   legacy taxpayer numbers
/// - Amounts: currency symbols, separators and whitespace stripped
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardInvoiceRules;

impl FieldValidator for StandardInvoiceRules {
    fn is_valid_identifier(&self, value: &str) -> bool {
        let all_digits = value.chars().all(|c| c.is_ascii_digit());
        all_digits && (value.len() == 20 || value.len() == 8)
    }

    fn find_identifier(&self, text: &str) -> Option<String> {
        RE_E_INVOICE_NUMBER
            .captures(text)
            .or_else(|| RE_PAPER_INVOICE_NUMBER.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn is_valid_tax_id(&self, value: &str) -> bool {
        let len = value.chars().count();
        (len == 18 && RE_CREDIT_CODE.is_match(value))
            || (len == 15 && value.chars().all(char::is_alphanumeric))
    }

    fn find_tax_ids(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for caps in RE_TAX_ID.captures_iter(text) {
            let id = &caps[1];
            if !found.iter().any(|f| f == id) {
                found.push(id.to_string());
            }
        }
        found
    }

    fn clean_amount(&self, value: &str) -> Option<String> {
        let cleaned: String = value
            .chars()
            .filter(|c| !matches!(c, '￥' | '¥' | ',' | '，') && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse::<f64>().ok().map(|_| cleaned)
    }
}
