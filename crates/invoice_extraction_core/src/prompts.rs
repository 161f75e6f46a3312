//! crates/invoice_extraction_core/src/prompts.rs
//!
//! Instruction prompts shared by every inference backend.

/// The canonical field list and output rules, shared by both prompt variants.
const FIELD_INSTRUCTIONS: &str = r#"Extract these fields:
- supplierName: The company/vendor name on the invoice
- invoiceNumber: The invoice number/ID
- invoiceDate: The invoice date (format: YYYY-MM-DD)
- dueDate: The payment due date (format: YYYY-MM-DD)
- currency: The currency code (e.g., USD, EUR, INR)
- subtotal: The subtotal amount before tax (number)
- taxAmount: The tax amount (number)
- total: The total amount due (number)
- lineItems: Array of items with:
  - description: Item description
  - quantity: Quantity (number)
  - unitPrice: Price per unit (number)
  - lineTotal: Total for this line (number)
- confidence: Your confidence in the extraction accuracy (0-1)

IMPORTANT RULES:
1. Return ONLY valid JSON, no markdown or explanations
2. Use null for fields you cannot find
3. Parse numbers without currency symbols
4. If a field is ambiguous, use your best judgment and lower confidence
5. Always include the confidence field (0-1 scale)

Return the JSON object directly."#;

/// Prompt sent alongside an invoice image.
pub fn vision_prompt() -> String {
    format!(
        "You are an invoice data extraction expert. Analyze the provided invoice image/document and extract the following information in JSON format.\n\n{}",
        FIELD_INSTRUCTIONS
    )
}

/// Prompt embedding text already extracted from a paginated document.
pub fn text_prompt(document_text: &str) -> String {
    format!(
        "You are an invoice data extraction expert. Analyze the following invoice text and extract structured data.\n\n{}\n\nInvoice Text:\n{}",
        FIELD_INSTRUCTIONS, document_text
    )
}
