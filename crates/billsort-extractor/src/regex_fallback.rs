//! Regex-only strategy, used when no LLM backend is reachable

use billsort_domain::traits::Extractor;
use billsort_domain::{Record, RecordFields};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

static RE_INVOICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"发票号码[：:]\s*(\d{8,20})").expect("valid invoice number regex"));
static RE_BUYER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(购买方|购方|买方)\s*名\s*称[：:]\s*([^\n]+)").expect("valid buyer regex")
});
static RE_SELLER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(销售方|销方|卖方)\s*名\s*称[：:]\s*([^\n]+)").expect("valid seller regex")
});
static RE_TAX_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"纳税人识别号[：:]\s*([A-Za-z0-9]{15,20})").expect("valid tax id regex")
});
static RE_TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(价税合计|合计)[：:￥¥]?\s*(\d+\.?\d*)").expect("valid total regex")
});

/// Pulls labelled fields out of document text with regular expressions
///
/// Needs no backend, so it is the degraded-mode strategy. Images are not
/// supported and come back as an empty `regex_fallback_unsupported` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexFallbackExtractor;

impl RegexFallbackExtractor {
    /// Create a new regex extractor
    pub fn new() -> Self {
        Self
    }
}

fn capture(re: &Regex, text: &str, group: usize) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Extractor for RegexFallbackExtractor {
    fn extract(&self, text: &str, file_name: Option<&str>) -> Record {
        info!(source = file_name.unwrap_or("<text>"), "extracting with regex fallback");
        let mut tax_ids = RE_TAX_ID
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()));

        let fields = RecordFields {
            invoice_number: capture(&RE_INVOICE_NUMBER, text, 1),
            buyer_name: capture(&RE_BUYER_NAME, text, 2),
            seller_name: capture(&RE_SELLER_NAME, text, 2),
            buyer_tax_id: tax_ids.next(),
            seller_tax_id: tax_ids.next(),
            total_amount: capture(&RE_TOTAL, text, 2),
            ..RecordFields::default()
        };
        Record::new(fields, "regex_fallback")
    }

    fn extract_from_image(&self, path: &Path) -> Record {
        warn!(file = %path.display(), "regex fallback cannot read images");
        Record::new(RecordFields::default(), "regex_fallback_unsupported")
    }
}
