//! Type-driven coercions applied after a column's converter has run.
//!
//! Calendar columns are reparsed leniently and fall back to null, timestamps
//! use one canonical grammar, and integer columns are read as numbers unless
//! the legacy epoch behaviour is requested.
use crate::converter::Value;
use crate::schema::{ColumnInfo, ColumnType};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, ParseResult};

/// Canonical timestamp grammar: `YYYY-MM-DD HH:MM:SS` with optional fraction.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Date-only layouts tried in order. Day-first wins over month-first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d/%b/%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%Y%m%d",
];

/// Layouts carrying a time of day.
const DATE_TIME_FORMATS: &[&str] = &[
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// How integer columns interpret their text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NumericCoercion {
    /// Read the text as a whole number
    #[default]
    Parse,
    /// Read the text as a timestamp and keep its epoch milliseconds (UTC)
    EpochMillis,
}

/// Outcome of coercing one cell.
#[derive(Debug, PartialEq)]
pub(crate) enum Coerced {
    /// Value ready for the record
    Ready(Value),
    /// Calendar text that could not be read; the field becomes null
    Absent(String),
    /// Row-scoped conversion failure
    Failed(String),
}

/// Applies the target-type coercion for `column`, reparsing the cell's `text`.
pub(crate) fn coerce(column: &ColumnInfo, text: &str, converted: Value, numeric: NumericCoercion) -> Coerced {
    match column.target_type {
        ColumnType::Date => match parse_date(text, &column.format_hint) {
            Some(date) => Coerced::Ready(Value::Date(date)),
            None => Coerced::Absent(format!("'{text}' is not a recognised date")),
        },
        ColumnType::DateTime => match parse_date_time(text, &column.format_hint) {
            Some(datetime) => Coerced::Ready(Value::DateTime(datetime)),
            None => Coerced::Absent(format!("'{text}' is not a recognised date")),
        },
        ColumnType::Timestamp => match parse_timestamp(text) {
            Ok(timestamp) => Coerced::Ready(Value::Timestamp(timestamp)),
            Err(error) => Coerced::Failed(format!("'{text}' is not a timestamp ({error})")),
        },
        ColumnType::Integer => match numeric {
            NumericCoercion::Parse => match parse_integer(text) {
                Some(integer) => Coerced::Ready(Value::Integer(integer)),
                None => Coerced::Failed(format!("'{text}' is not an integer")),
            },
            NumericCoercion::EpochMillis => match parse_timestamp(text) {
                Ok(timestamp) => Coerced::Ready(Value::Integer(timestamp.and_utc().timestamp_millis())),
                Err(error) => Coerced::Failed(format!("'{text}' is not a timestamp ({error})")),
            },
        },
        ColumnType::Varchar | ColumnType::Boolean | ColumnType::Double => Coerced::Ready(converted),
    }
}

/// Parses a calendar date, trying `format_hint` first when it is not empty.
pub fn parse_date(text: &str, format_hint: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if !format_hint.is_empty() {
        if let Ok(date) = NaiveDate::parse_from_str(text, format_hint) {
            return Some(date);
        }
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format_hint) {
            return Some(datetime.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| parse_with_time(text).map(|datetime| datetime.date()))
}

/// Parses a local date-time; a date without time of day means midnight.
pub fn parse_date_time(text: &str, format_hint: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if !format_hint.is_empty() {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format_hint) {
            return Some(datetime);
        }
    }
    parse_with_time(trimmed).or_else(|| {
        parse_date(trimmed, format_hint).map(|date| date.and_time(NaiveTime::MIN))
    })
}

fn parse_with_time(text: &str) -> Option<NaiveDateTime> {
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Parses the canonical timestamp grammar strictly.
pub fn parse_timestamp(text: &str) -> ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
}

/// Parses a whole number. Grouping commas are ignored and `30.0` reads as 30.
pub fn parse_integer(text: &str) -> Option<i64> {
    let digits = text.trim().replace(',', "");
    if let Ok(integer) = digits.parse::<i64>() {
        return Some(integer);
    }
    digits
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite() && number.fract() == 0.0)
        .filter(|number| *number >= i64::MIN as f64 && *number <= i64::MAX as f64)
        .map(|number| number as i64)
}

/// Parses a floating point number, ignoring grouping commas.
pub fn parse_double(text: &str) -> Option<f64> {
    text.trim().replace(',', "").parse::<f64>().ok()
}

/// Reads `true/false`, `yes/no`, `y/n` and `1/0` in any case.
pub fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
