//! crates/invoice_extraction_core/src/normalizer.rs
//!
//! Turns a model's loosely structured reply into an `ExtractedInvoice`.
//!
//! The reply is untrusted: models wrap JSON in prose or markdown fences, omit
//! fields, or emit the wrong types. Only two repairs are made (currency and
//! confidence defaults); everything else that does not fit the schema is
//! reported as a field violation.

use crate::domain::{ExtractedInvoice, LineItem, DEFAULT_CURRENCY};
use crate::ports::{FieldViolation, PortError, PortResult};
use serde_json::{Map, Value};

/// Normalizes a raw reply, failing with `Parse` or `Validation`.
pub fn normalize(reply: &str) -> PortResult<ExtractedInvoice> {
    let json = locate_json_object(reply).ok_or_else(|| {
        PortError::Parse("Could not find a JSON object in the provider reply".to_string())
    })?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| PortError::Parse(format!("Malformed JSON in provider reply: {}", e)))?;

    match value {
        Value::Object(object) => validate(&object),
        _ => Err(PortError::Parse(
            "Provider reply JSON is not an object".to_string(),
        )),
    }
}

/// Returns the substring from the first `{` to the last `}`, if any.
pub fn locate_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Validates a parsed reply object against the invoice schema.
pub fn validate(object: &Map<String, Value>) -> PortResult<ExtractedInvoice> {
    let mut violations = Vec::new();

    let supplier_name = optional_string(object, "supplierName", &mut violations);
    let invoice_number = optional_string(object, "invoiceNumber", &mut violations);
    let invoice_date = optional_string(object, "invoiceDate", &mut violations);
    let due_date = optional_string(object, "dueDate", &mut violations);
    let subtotal = optional_number(object, "subtotal", &mut violations);
    let tax_amount = optional_number(object, "taxAmount", &mut violations);
    let total = optional_number(object, "total", &mut violations);

    let currency = optional_string(object, "currency", &mut violations)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let confidence = match object.get("confidence") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => c,
            _ => {
                violations.push(FieldViolation::new(
                    "confidence",
                    "must be between 0 and 1",
                ));
                0.0
            }
        },
        Some(other) => {
            violations.push(type_violation("confidence", "a number", other));
            0.0
        }
    };

    let line_items = match object.get("lineItems") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| line_item(index, item, &mut violations))
            .collect(),
        Some(other) => {
            violations.push(type_violation("lineItems", "an array", other));
            Vec::new()
        }
    };

    if !violations.is_empty() {
        return Err(PortError::invalid_fields(violations));
    }

    Ok(ExtractedInvoice {
        supplier_name,
        invoice_number,
        invoice_date,
        due_date,
        currency,
        subtotal,
        tax_amount,
        total,
        line_items,
        confidence,
    })
}

fn line_item(index: usize, item: &Value, violations: &mut Vec<FieldViolation>) -> Option<LineItem> {
    let path = format!("lineItems[{}]", index);
    let Value::Object(object) = item else {
        violations.push(type_violation(&path, "an object", item));
        return None;
    };

    let before = violations.len();
    let description = match object.get("description") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            violations.push(type_violation(&format!("{}.description", path), "a string", other));
            None
        }
        None => {
            violations.push(missing(&format!("{}.description", path)));
            None
        }
    };
    let quantity = required_number(object, &path, "quantity", violations);
    let unit_price = required_number(object, &path, "unitPrice", violations);
    let line_total = required_number(object, &path, "lineTotal", violations);

    if violations.len() != before {
        return None;
    }

    Some(LineItem {
        description: description?,
        quantity: quantity?,
        unit_price: unit_price?,
        line_total: line_total?,
    })
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            violations.push(type_violation(field, "a string or null", other));
            None
        }
    }
}

fn optional_number(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<f64> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(other) => {
            violations.push(type_violation(field, "a number or null", other));
            None
        }
    }
}

fn required_number(
    object: &Map<String, Value>,
    path: &str,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<f64> {
    let full = format!("{}.{}", path, field);
    match object.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(other) => {
            violations.push(type_violation(&full, "a number", other));
            None
        }
        None => {
            violations.push(missing(&full));
            None
        }
    }
}

fn missing(field: &str) -> FieldViolation {
    FieldViolation::new(field, "is required")
}

fn type_violation(field: &str, expected: &str, found: &Value) -> FieldViolation {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    FieldViolation::new(field, format!("expected {}, found {}", expected, found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violated_fields(err: PortError) -> Vec<String> {
        match err {
            PortError::Validation { violations, .. } => {
                violations.into_iter().map(|v| v.field).collect()
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn tolerates_markdown_fences_and_prose() {
        let reply = "Sure! Here is the data:\n```json\n{\"supplierName\": \"Acme Ltd\", \"total\": 120.5, \"confidence\": 0.9}\n```\nLet me know.";
        let payload = normalize(reply).unwrap();

        assert_eq!(payload.supplier_name.as_deref(), Some("Acme Ltd"));
        assert_eq!(payload.total, Some(120.5));
        assert_eq!(payload.confidence, 0.9);
        assert!(payload.line_items.is_empty());
    }

    #[test]
    fn defaults_currency_and_confidence() {
        let payload = normalize(r#"{"currency": ""}"#).unwrap();
        assert_eq!(payload.currency, "USD");
        assert_eq!(payload.confidence, 0.0);

        let payload = normalize(r#"{"currency": null}"#).unwrap();
        assert_eq!(payload.currency, "USD");

        let payload = normalize(r#"{"currency": "EUR", "confidence": 1}"#).unwrap();
        assert_eq!(payload.currency, "EUR");
        assert_eq!(payload.confidence, 1.0);
    }

    #[test]
    fn prose_only_reply_is_a_parse_error() {
        let err = normalize("I could not read this invoice, sorry.").unwrap_err();
        assert!(matches!(err, PortError::Parse(_)));

        let err = normalize("} backwards {").unwrap_err();
        assert!(matches!(err, PortError::Parse(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = normalize(r#"{"supplierName": "Acme", }"#).unwrap_err();
        assert!(matches!(err, PortError::Parse(_)));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let err = normalize(r#"{"confidence": 1.5}"#).unwrap_err();
        assert_eq!(violated_fields(err), vec!["confidence"]);

        let err = normalize(r#"{"confidence": -0.1}"#).unwrap_err();
        assert_eq!(violated_fields(err), vec!["confidence"]);
    }

    #[test]
    fn line_item_missing_unit_price_names_the_field() {
        let reply = r#"{
            "supplierName": "Acme",
            "currency": "USD",
            "lineItems": [
                {"description": "Widget", "quantity": 2, "unitPrice": 5, "lineTotal": 10},
                {"description": "Gadget", "quantity": 1, "lineTotal": 7}
            ],
            "confidence": 0.8
        }"#;
        let err = normalize(reply).unwrap_err();
        assert_eq!(violated_fields(err), vec!["lineItems[1].unitPrice"]);
    }

    #[test]
    fn collects_every_violation() {
        let reply = r#"{"supplierName": 42, "total": "12.00", "lineItems": "none"}"#;
        let fields = violated_fields(normalize(reply).unwrap_err());
        assert_eq!(fields, vec!["supplierName", "total", "lineItems"]);
    }

    #[test]
    fn no_arithmetic_repair_is_attempted() {
        let reply = r#"{
            "subtotal": 10, "taxAmount": 1, "total": 99,
            "lineItems": [{"description": "x", "quantity": 2, "unitPrice": 3, "lineTotal": 100}]
        }"#;
        let payload = normalize(reply).unwrap();
        assert_eq!(payload.total, Some(99.0));
        assert_eq!(payload.line_items[0].line_total, 100.0);
    }
}
