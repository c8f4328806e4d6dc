//! "Not Available" substitution.
//!
//! Runs exactly once per successful extraction, before the result is cached.

use crate::value::{ExtractionResult, Field, FieldValue, RawMetadata, RawValue};

/// Normalizes every field of `raw`, keeping field order.
pub fn normalize(raw: RawMetadata) -> ExtractionResult {
    let fields = raw
        .into_iter()
        .map(|(name, value)| Field {
            name,
            value: normalize_value(value),
        })
        .collect();
    ExtractionResult::from_fields(fields)
}

/// Null, blank text and empty lists become `NotAvailable`. Lists are joined
/// with `", "` after dropping members that are themselves unavailable.
pub fn normalize_value(value: RawValue) -> FieldValue {
    match value {
        RawValue::Null => FieldValue::NotAvailable,
        RawValue::Text(text) if text.trim().is_empty() => FieldValue::NotAvailable,
        RawValue::Text(text) => FieldValue::Text(text),
        RawValue::Integer(n) => FieldValue::Integer(n),
        RawValue::Float(n) => FieldValue::Float(n),
        RawValue::Timestamp(ts) => FieldValue::Timestamp(ts),
        RawValue::List(items) => {
            let parts: Vec<String> = items
                .into_iter()
                .map(normalize_value)
                .filter(FieldValue::is_available)
                .map(|value| value.to_string())
                .collect();
            if parts.is_empty() {
                FieldValue::NotAvailable
            } else {
                FieldValue::Text(parts.join(", "))
            }
        }
    }
}
