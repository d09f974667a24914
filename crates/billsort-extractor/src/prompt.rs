//! LLM prompt engineering for invoice field extraction

/// Instructions shared by the text and vision prompts
const EXTRACTION_INSTRUCTIONS: &str = "\
You are an expert at reading Chinese VAT invoices (增值税发票), including electronic \
invoices (全电发票), special invoices (专用发票) and ordinary invoices (普通发票).

Extract the following fields and answer with ONE JSON object using exactly these keys:

- invoice_number: 发票号码 (20 digits for electronic invoices, 8 digits for paper invoices)
- invoice_type: 发票类型
- issue_date: 开票日期, formatted YYYY-MM-DD
- buyer_name: 购买方名称
- buyer_tax_id: 购买方纳税人识别号 (18-character unified social credit code)
- seller_name: 销售方名称
- seller_tax_id: 销售方纳税人识别号
- amount: 金额 (before tax, digits only)
- tax_amount: 税额 (digits only)
- total_amount: 价税合计 (total including tax, digits only)
- content: 发票内容 / 商品名称 (main goods or services)
- remark: 备注";

/// Output format reminder appended to every prompt
const OUTPUT_FORMAT_REMINDER: &str = "\
Rules:
- Use null for any field that is not present. Do not guess.
- Amounts must not contain currency symbols or thousands separators.
- Respond with the JSON object only, wrapped in a ```json code block.";

/// Builds prompts for the LLM to extract invoice fields from text
pub struct PromptBuilder {
    text: String,
    file_name: Option<String>,
    max_text_length: usize,
}

impl PromptBuilder {
    /// Create a new prompt builder for the given document text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_name: None,
            max_text_length: usize::MAX,
        }
    }

    /// Mention the source file name as a hint
    pub fn with_file_name(mut self, file_name: Option<&str>) -> Self {
        self.file_name = file_name.map(str::to_string);
        self
    }

    /// Truncate the embedded document text to this many characters
    pub fn with_max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    /// Build the complete extraction prompt
    pub fn build(&self) -> String {
        let mut prompt = String::with_capacity(self.text.len().min(self.max_text_length) + 1024);

        prompt.push_str(EXTRACTION_INSTRUCTIONS);
        prompt.push_str("\n\n");

        if let Some(name) = &self.file_name {
            prompt.push_str(&format!("Source file: {}\n\n", name));
        }

        prompt.push_str("Invoice text:\n");
        prompt.push_str("---\n");
        prompt.push_str(&truncate_chars(&self.text, self.max_text_length));
        prompt.push_str("\n---\n\n");

        prompt.push_str(OUTPUT_FORMAT_REMINDER);
        prompt
    }
}

/// Prompt for reading an invoice image directly
pub fn vision_prompt() -> String {
    format!(
        "The attached image is a scanned or photographed invoice.\n\n{}\n\n{}",
        EXTRACTION_INSTRUCTIONS, OUTPUT_FORMAT_REMINDER
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
