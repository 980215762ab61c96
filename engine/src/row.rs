//! Row types flowing from the source to the sink.

use crate::{FieldType, RowIndex};
use serde::{Deserialize, Serialize};

/// A raw source row: ordered string cells, positionally meaningful.
///
/// Rows carry no identifier of their own; their identity is their index in
/// the source's native row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(pub Vec<String>);

impl RawRow {
    /// Create a row from any sequence of cells.
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(cells.into_iter().map(Into::into).collect())
    }

    /// Get a cell, treating missing trailing cells as empty text.
    pub fn cell(&self, position: usize) -> &str {
        self.0.get(position).map(String::as_str).unwrap_or("")
    }

    /// Number of cells actually present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the row has no cells at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All cells in order.
    pub fn cells(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for RawRow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// One named, typed field of a [`SyncRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    /// Field name as the sink knows it
    pub name: String,
    /// Declared type of the field
    pub field_type: FieldType,
    /// Field content
    pub value: String,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, field_type: FieldType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            value: value.into(),
        }
    }
}

/// A transformed row, ready for the sink.
///
/// Built fresh for each delivery attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Index of the originating row in the source
    pub source_index: RowIndex,
    /// Deterministic key derived from the index and the row contents
    pub idempotency_key: String,
    /// Named fields in schema order
    pub fields: Vec<FieldValue>,
}

impl SyncRecord {
    /// Create a new record.
    pub fn new(
        source_index: RowIndex,
        idempotency_key: impl Into<String>,
        fields: Vec<FieldValue>,
    ) -> Self {
        Self {
            source_index,
            idempotency_key: idempotency_key.into(),
            fields,
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field's value by name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_trailing_cells_are_empty() {
        let row = RawRow::new(["Alice", "alice@example.com"]);

        assert_eq!(row.len(), 2);
        assert_eq!(row.cell(0), "Alice");
        assert_eq!(row.cell(2), "");
        assert_eq!(row.cell(99), "");
    }

    #[test]
    fn raw_row_serializes_as_array() {
        let row: RawRow = ["a", "b"].into_iter().collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["a","b"]"#);

        let parsed: RawRow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, row);
    }

    #[test]
    fn record_field_lookup() {
        let record = SyncRecord::new(
            3,
            "key",
            vec![
                FieldValue::new("name", FieldType::Text, "Alice"),
                FieldValue::new("date", FieldType::Date, "2024-02-01"),
            ],
        );

        assert_eq!(record.value("name"), Some("Alice"));
        assert_eq!(record.field("date").unwrap().field_type, FieldType::Date);
        assert!(record.value("email").is_none());
    }

    #[test]
    fn record_serialization_format() {
        let record = SyncRecord::new(0, "k", vec![]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("sourceIndex")); // camelCase
        assert!(json.contains("idempotencyKey"));
    }
}
