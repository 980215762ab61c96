//! Record schema and validation.
//!
//! The schema describes the field set the sink accepts. Sinks use it to
//! reject malformed records before attempting delivery, which makes the
//! rejection permanent rather than transient.

use crate::{error::Result, Error, SyncRecord};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex")
});

/// Field types understood by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text
    Text,
    /// Email-formatted text
    Email,
    /// ISO-8601 calendar date (`YYYY-MM-DD`)
    Date,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => write!(f, "Text"),
            FieldType::Email => write!(f, "Email"),
            FieldType::Date => write!(f, "Date"),
        }
    }
}

/// Definition of a field in a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether an empty value is rejected
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Validate a value against this field definition.
    pub fn validate(&self, value: Option<&str>) -> Result<()> {
        match value {
            None | Some("") if self.required => {
                Err(Error::MissingRequiredField(self.name.clone()))
            }
            None | Some("") => Ok(()),
            Some(v) => self.validate_type(v),
        }
    }

    fn validate_type(&self, value: &str) -> Result<()> {
        let valid = match self.field_type {
            FieldType::Text => true,
            FieldType::Email => is_email(value),
            FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        };

        if valid {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: self.field_type.to_string(),
                got: format!("{:?}", value),
            })
        }
    }
}

/// Whether a value has the shape of an email address.
pub fn is_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// Schema for sink records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSchema {
    /// Field definitions in positional order
    pub fields: Vec<FieldDef>,
}

impl RecordSchema {
    /// Create a new schema.
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// The form-submission schema: name, email, message, date.
    pub fn form_submission() -> Self {
        Self::new(vec![
            FieldDef::required("name", FieldType::Text),
            FieldDef::required("email", FieldType::Email),
            FieldDef::optional("message", FieldType::Text),
            FieldDef::required("date", FieldType::Date),
        ])
    }

    /// Validate a record against this schema.
    ///
    /// Checks both presence and declared type; a record whose field carries
    /// a different type than the schema declares is rejected.
    pub fn validate(&self, record: &SyncRecord) -> Result<()> {
        for def in &self.fields {
            let field = record.field(&def.name);
            if let Some(f) = field {
                if f.field_type != def.field_type {
                    return Err(Error::TypeMismatch {
                        field: def.name.clone(),
                        expected: def.field_type.to_string(),
                        got: f.field_type.to_string(),
                    });
                }
            }
            def.validate(field.map(|f| f.value.as_str()))?;
        }
        Ok(())
    }
}
