//! Mapping raw source rows to sink records.

use crate::{FieldType, FieldValue, RawRow, RowIndex, SyncRecord};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// Date layouts accepted from the source, tried in order. Covers the
/// display formats Sheets offers for date cells rendered as text.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%A, %B %d, %Y",
    "%d-%b-%Y",
];

/// Datetime layouts without offset. `%m/%d/%Y %H:%M:%S` is the default US
/// Sheets date-time and the Google Forms timestamp.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Largest serial number Sheets renders as a date (9999-12-31).
const MAX_SERIAL_DATE: f64 = 2_958_465.0;

/// Maps one raw row to the sink's record shape. Must be pure and total.
pub trait RowTransformer: Send + Sync {
    fn transform(&self, index: RowIndex, row: &RawRow) -> SyncRecord;
}

/// Positional mapping for form submissions:
/// 0 = name, 1 = email, 2 = message, 3 = date.
#[derive(Debug, Clone)]
pub struct FormRowTransformer {
    columns: Vec<(&'static str, FieldType)>,
}

impl Default for FormRowTransformer {
    fn default() -> Self {
        Self {
            columns: vec![
                ("name", FieldType::Text),
                ("email", FieldType::Email),
                ("message", FieldType::Text),
                ("date", FieldType::Date),
            ],
        }
    }
}

impl FormRowTransformer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowTransformer for FormRowTransformer {
    fn transform(&self, index: RowIndex, row: &RawRow) -> SyncRecord {
        let fields = self
            .columns
            .iter()
            .enumerate()
            .map(|(position, (name, field_type))| {
                let raw = row.cell(position).trim();
                let value = match field_type {
                    FieldType::Date => normalize_date(raw),
                    _ => raw.to_string(),
                };
                FieldValue::new(*name, *field_type, value)
            })
            .collect();

        SyncRecord::new(index, idempotency_key(index, row), fields)
    }
}

/// Normalize a source date to an ISO-8601 calendar date (`YYYY-MM-DD`).
///
/// Unrecognized input is returned unchanged so that the sink rejects it.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return iso(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return iso(dt.date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return iso(dt.date());
        }
    }

    if let Some(date) = from_serial(raw) {
        return iso(date);
    }

    raw.to_string()
}

/// Sheets serial dates count days from 1899-12-30.
fn from_serial(raw: &str) -> Option<NaiveDate> {
    let serial: f64 = raw.parse().ok()?;
    if !(1.0..=MAX_SERIAL_DATE).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// blake3 over the source index and the unit-separated cells.
fn idempotency_key(index: RowIndex, row: &RawRow) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&index.to_le_bytes());
    for cell in row.cells() {
        hasher.update(&[0x1f]);
        hasher.update(cell.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
