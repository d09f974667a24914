//! Parse LLM output into record fields
//!
//! Models wrap JSON in markdown, use single quotes, leave trailing commas and
//! sometimes answer with the Chinese field labels instead of the requested keys.
//! Parsing is therefore tolerant: the JSON path repairs what it can, and when the
//! response still does not decode, individual fields are scraped with regexes.

use crate::error::ExtractorError;
use billsort_domain::RecordFields;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

static RE_JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid json fence regex"));
static RE_ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").expect("valid fence regex"));
static RE_TRAILING_BRACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\}").expect("valid trailing brace regex"));
static RE_TRAILING_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\]").expect("valid trailing bracket regex"));

/// One field of [`RecordFields`]
#[derive(Debug, Clone, Copy)]
enum Slot {
    InvoiceNumber,
    InvoiceType,
    IssueDate,
    BuyerName,
    BuyerTaxId,
    SellerName,
    SellerTaxId,
    Amount,
    TaxAmount,
    TotalAmount,
    Content,
    Remark,
}

impl Slot {
    fn target(self, fields: &mut RecordFields) -> &mut Option<String> {
        match self {
            Slot::InvoiceNumber => &mut fields.invoice_number,
            Slot::InvoiceType => &mut fields.invoice_type,
            Slot::IssueDate => &mut fields.issue_date,
            Slot::BuyerName => &mut fields.buyer_name,
            Slot::BuyerTaxId => &mut fields.buyer_tax_id,
            Slot::SellerName => &mut fields.seller_name,
            Slot::SellerTaxId => &mut fields.seller_tax_id,
            Slot::Amount => &mut fields.amount,
            Slot::TaxAmount => &mut fields.tax_amount,
            Slot::TotalAmount => &mut fields.total_amount,
            Slot::Content => &mut fields.content,
            Slot::Remark => &mut fields.remark,
        }
    }
}

/// Accepted keys per field, requested English key first
const KEY_ALIASES: &[(Slot, &[&str])] = &[
    (Slot::InvoiceNumber, &["invoice_number", "发票号码"]),
    (Slot::InvoiceType, &["invoice_type", "发票类型"]),
    (Slot::IssueDate, &["issue_date", "开票日期"]),
    (Slot::BuyerName, &["buyer_name", "购买方名称"]),
    (Slot::BuyerTaxId, &["buyer_tax_id", "购买方纳税人识别号"]),
    (Slot::SellerName, &["seller_name", "销售方名称"]),
    (Slot::SellerTaxId, &["seller_tax_id", "销售方纳税人识别号"]),
    (Slot::Amount, &["amount", "金额", "金额（不含税）"]),
    (Slot::TaxAmount, &["tax_amount", "税额"]),
    (Slot::TotalAmount, &["total_amount", "价税合计"]),
    (Slot::Content, &["content", "发票内容", "发票内容/商品名称"]),
    (Slot::Remark, &["remark", "备注"]),
];

/// Per-field scraping patterns used when the response is not valid JSON
static SCRAPE_PATTERNS: LazyLock<Vec<(Slot, Regex)>> = LazyLock::new(|| {
    let pattern = |keys: &str, value: &str| {
        Regex::new(&format!(r#""(?:{})"\s*[：:]\s*{}"#, keys, value)).expect("valid scrape regex")
    };
    vec![
        (
            Slot::InvoiceNumber,
            pattern("invoice_number|发票号码", r#""?([^",\n]+)"?"#),
        ),
        (Slot::BuyerName, pattern("buyer_name|购买方名称", r#""([^"]+)""#)),
        (Slot::SellerName, pattern("seller_name|销售方名称", r#""([^"]+)""#)),
        (
            Slot::BuyerTaxId,
            pattern("buyer_tax_id|购买方纳税人识别号", r#""?([A-Za-z0-9]+)"?"#),
        ),
        (
            Slot::SellerTaxId,
            pattern("seller_tax_id|销售方纳税人识别号", r#""?([A-Za-z0-9]+)"?"#),
        ),
        (
            Slot::TotalAmount,
            pattern("total_amount|价税合计", r#""?([0-9.]+)"?"#),
        ),
        (Slot::InvoiceType, pattern("invoice_type|发票类型", r#""([^"]+)""#)),
    ]
});

/// Parse an LLM response into record fields
///
/// Never fails: a response that cannot be decoded as a JSON object is scraped
/// field by field, and an unusable response yields empty fields.
pub fn parse_llm_response(response: &str) -> RecordFields {
    match parse_json_object(response) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(error = %e, "LLM response is not valid JSON, scraping fields");
            scrape_fields(response)
        }
    }
}

fn parse_json_object(response: &str) -> Result<RecordFields, ExtractorError> {
    let candidate = repair_json(extract_json_block(response));

    let value: Value = match serde_json::from_str(&candidate) {
        Ok(value) => value,
        Err(e) => {
            // Prose around a bare object: retry on the outermost braces
            let (Some(start), Some(end)) = (candidate.find('{'), candidate.rfind('}')) else {
                return Err(e.into());
            };
            if start >= end {
                return Err(e.into());
            }
            debug!("retrying JSON parse on brace-delimited slice");
            serde_json::from_str(&candidate[start..=end])?
        }
    };

    let object = value
        .as_object()
        .ok_or_else(|| ExtractorError::InvalidFormat("expected a JSON object".to_string()))?;
    Ok(fields_from_object(object))
}

/// The JSON payload of a response: a ```json fence, any fence, or the whole text
fn extract_json_block(response: &str) -> &str {
    let captured = RE_JSON_FENCE
        .captures(response)
        .or_else(|| RE_ANY_FENCE.captures(response))
        .and_then(|caps| caps.get(1));
    match captured {
        Some(m) => m.as_str().trim(),
        None => response.trim(),
    }
}

/// Repair the most common model formatting mistakes
fn repair_json(json: &str) -> String {
    let json = json.trim_start_matches('\u{feff}');
    let json = if json.contains('\'') && !json.contains('"') {
        json.replace('\'', "\"")
    } else {
        json.to_string()
    };
    let json = RE_TRAILING_BRACE.replace_all(&json, "}");
    RE_TRAILING_BRACKET.replace_all(&json, "]").into_owned()
}

fn fields_from_object(object: &Map<String, Value>) -> RecordFields {
    let mut fields = RecordFields::default();
    for (slot, keys) in KEY_ALIASES {
        let value = keys
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(clean_value);
        *slot.target(&mut fields) = value;
    }
    fields
}

/// Normalise a JSON value; placeholders for "missing" become `None`
fn clean_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.to_ascii_lowercase().as_str() {
                "" | "null" | "none" | "n/a" => None,
                _ => Some(trimmed.to_string()),
            }
        }
        other => Some(other.to_string()),
    }
}

fn scrape_fields(response: &str) -> RecordFields {
    let mut fields = RecordFields::default();
    for (slot, re) in SCRAPE_PATTERNS.iter() {
        if let Some(m) = re.captures(response).and_then(|caps| caps.get(1)) {
            let value = m.as_str().trim();
            if !value.is_empty() {
                *slot.target(&mut fields) = Some(value.to_string());
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let fields = parse_llm_response(
            r#"{"invoice_number": "24442000000012345678", "seller_name": "Acme", "total_amount": 113.5}"#,
        );
        assert_eq!(fields.invoice_number.as_deref(), Some("24442000000012345678"));
        assert_eq!(fields.seller_name.as_deref(), Some("Acme"));
        assert_eq!(fields.total_amount.as_deref(), Some("113.5"));
        assert_eq!(fields.buyer_name, None);
    }

    #[test]
    fn test_parse_json_with_markdown_wrapper() {
        let response = "Here is the result:\n```json\n{\"invoice_number\": \"12345678\"}\n```\nDone.";
        let fields = parse_llm_response(response);
        assert_eq!(fields.invoice_number.as_deref(), Some("12345678"));
    }

    #[test]
    fn test_parse_chinese_keys() {
        let response = r#"{"发票号码": "12345678", "购买方名称": "甲公司", "金额（不含税）": "100.00", "发票内容/商品名称": "咨询服务"}"#;
        let fields = parse_llm_response(response);
        assert_eq!(fields.invoice_number.as_deref(), Some("12345678"));
        assert_eq!(fields.buyer_name.as_deref(), Some("甲公司"));
        assert_eq!(fields.amount.as_deref(), Some("100.00"));
        assert_eq!(fields.content.as_deref(), Some("咨询服务"));
    }

    #[test]
    fn test_placeholders_become_none() {
        let response = r#"{"invoice_number": "null", "buyer_name": " N/A ", "seller_name": "", "remark": null, "issue_date": "None"}"#;
        let fields = parse_llm_response(response);
        assert_eq!(fields, RecordFields::default());
    }

    #[test]
    fn test_empty_alias_falls_through() {
        let fields = parse_llm_response(r#"{"amount": "", "金额": "88.00"}"#);
        assert_eq!(fields.amount.as_deref(), Some("88.00"));
    }

    #[test]
    fn test_repairs_single_quotes_and_trailing_commas() {
        let fields = parse_llm_response("\u{feff}{'invoice_number': '12345678', 'seller_name': 'Acme',}");
        assert_eq!(fields.invoice_number.as_deref(), Some("12345678"));
        assert_eq!(fields.seller_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_prose_around_object() {
        let fields = parse_llm_response("Sure! {\"invoice_number\": \"87654321\"} Hope that helps.");
        assert_eq!(fields.invoice_number.as_deref(), Some("87654321"));
    }

    #[test]
    fn test_scrape_fallback() {
        let response = r#"Result: "发票号码": "24442000000012345678", "销售方名称": "乙公司", "价税合计": 113.00, oops"#;
        let fields = parse_llm_response(response);
        assert_eq!(fields.invoice_number.as_deref(), Some("24442000000012345678"));
        assert_eq!(fields.seller_name.as_deref(), Some("乙公司"));
        assert_eq!(fields.total_amount.as_deref(), Some("113.00"));
    }

    #[test]
    fn test_array_response_is_scraped_not_panicking() {
        let fields = parse_llm_response(r#"[{"invoice_number": "12345678"}]"#);
        assert_eq!(fields.invoice_number.as_deref(), Some("12345678"));
    }

    #[test]
    fn test_garbage_yields_empty_fields() {
        assert_eq!(parse_llm_response("I cannot read this."), RecordFields::default());
    }
}
