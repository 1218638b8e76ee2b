//! # Records
//!
//! The boundary between the mapper and the user's record types. A record type
//! declares its columns and writes values into its own fields through an
//! explicit setter; no runtime introspection is involved. [`impl_record!`]
//! generates both halves for plain structs.
//!
//! [`impl_record!`]: crate::impl_record
use crate::converter::coercion::{parse_boolean, parse_double, parse_integer};
use crate::converter::Value;
use crate::schema::ColumnDeclaration;
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

/// Failure to write one value into one field. Only that field is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Cannot store {found} value in {expected} field")]
    TypeMismatch { expected: &'static str, found: &'static str },

    #[error("Field does not accept null")]
    Null,
}

/// A type whose instances are built from sheet rows.
pub trait Record {
    /// Column metadata of the type, read once before the first parse.
    fn columns() -> Vec<ColumnDeclaration>;

    /// Writes `value` into the field named `field_id`.
    fn set_field(&mut self, field_id: &str, value: Value) -> Result<(), FieldError>;
}

/// Produces the blank record for each data row.
pub trait RecordFactory<T> {
    fn create(&mut self, row: usize) -> Result<T>;
}

impl<T, F> RecordFactory<T> for F
where
    F: FnMut(usize) -> Result<T>,
{
    fn create(&mut self, row: usize) -> Result<T> {
        self(row)
    }
}

/// Factory building records with [`Default`].
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultFactory;

impl<T: Default> RecordFactory<T> for DefaultFactory {
    fn create(&mut self, _row: usize) -> Result<T> {
        Ok(T::default())
    }
}

/// Conversion from a cell [`Value`] into a field type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, FieldError>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> Result<T, FieldError> {
    Err(FieldError::TypeMismatch {
        expected,
        found: value.kind_name(),
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match value {
            Value::Null => Err(FieldError::Null),
            Value::Text(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match &value {
            Value::Null => Err(FieldError::Null),
            Value::Integer(integer) => Ok(*integer),
            Value::Double(number) if number.fract() == 0.0 => Ok(*number as i64),
            Value::Text(text) => parse_integer(text).map_or_else(|| mismatch("integer", &value), Ok),
            _ => mismatch("integer", &value),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        let found = value.kind_name();
        let integer = i64::from_value(value)?;
        i32::try_from(integer).map_err(|_| FieldError::TypeMismatch { expected: "i32", found })
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        let found = value.kind_name();
        let integer = i64::from_value(value)?;
        u32::try_from(integer).map_err(|_| FieldError::TypeMismatch { expected: "u32", found })
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match &value {
            Value::Null => Err(FieldError::Null),
            Value::Double(number) => Ok(*number),
            Value::Integer(integer) => Ok(*integer as f64),
            Value::Text(text) => parse_double(text).map_or_else(|| mismatch("double", &value), Ok),
            _ => mismatch("double", &value),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match &value {
            Value::Null => Err(FieldError::Null),
            Value::Boolean(boolean) => Ok(*boolean),
            Value::Text(text) => parse_boolean(text).map_or_else(|| mismatch("boolean", &value), Ok),
            _ => mismatch("boolean", &value),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match value {
            Value::Null => Err(FieldError::Null),
            Value::Date(date) => Ok(date),
            Value::DateTime(datetime) | Value::Timestamp(datetime) => Ok(datetime.date()),
            other => mismatch("date", &other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match value {
            Value::Null => Err(FieldError::Null),
            Value::DateTime(datetime) | Value::Timestamp(datetime) => Ok(datetime),
            Value::Date(date) => Ok(date.and_time(NaiveTime::MIN)),
            other => mismatch("datetime", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, FieldError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Implements [`Record`] for a struct from a column table.
///
/// Each entry is `field: index => "Header" as ColumnType`, optionally followed
/// by `using "converter-id"` and `format "chrono-format"`. Field types must
/// implement [`FromValue`].
///
/// ```
/// use sheet_mapper::impl_record;
///
/// #[derive(Debug, Default)]
/// struct Person {
///     name: String,
///     age: i64,
///     born: Option<chrono::NaiveDate>,
/// }
///
/// impl_record!(Person {
///     name: 0 => "Name" as Varchar using "trim",
///     age: 1 => "Age" as Integer,
///     born: 2 => "Date Of Birth" as Date format "%d/%m/%Y",
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($record:ty {
        $( $field:ident : $index:literal => $name:literal as $kind:ident
            $(using $converter:literal)?
            $(format $format:literal)? ),+ $(,)?
    }) => {
        impl $crate::record::Record for $record {
            fn columns() -> ::std::vec::Vec<$crate::schema::ColumnDeclaration> {
                ::std::vec![$(
                    $crate::schema::ColumnDeclaration::new(
                        $name,
                        ::std::stringify!($field),
                        $index,
                        $crate::schema::ColumnType::$kind,
                    )
                    $(.with_converter($converter))?
                    $(.with_format($format))?
                ),+]
            }

            fn set_field(
                &mut self,
                field_id: &str,
                value: $crate::converter::Value,
            ) -> ::std::result::Result<(), $crate::record::FieldError> {
                match field_id {
                    $(::std::stringify!($field) => {
                        self.$field = $crate::record::FromValue::from_value(value)?;
                        Ok(())
                    })+
                    _ => Err($crate::record::FieldError::UnknownField(field_id.to_owned())),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, ColumnType};

    #[derive(Debug, Default, PartialEq)]
    struct Loan {
        borrower: String,
        amount: f64,
        term: i32,
        active: bool,
        issued: Option<NaiveDate>,
    }

    crate::impl_record!(Loan {
        borrower: 0 => "Borrower" as Varchar using "trim",
        amount: 1 => "Amount" as Double using "double",
        term: 2 => "Term" as Integer,
        active: 3 => "Active" as Boolean using "boolean",
        issued: 4 => "Issued On" as Date format "%d/%m/%Y",
    });

    #[test]
    fn macro_declares_columns() {
        let columns = Loan::columns();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].field_id, "borrower");
        assert_eq!(columns[0].converter_id, "trim");
        assert_eq!(columns[2].target_type, ColumnType::Integer);
        assert_eq!(columns[2].converter_id, crate::converter::IDENTITY);
        assert_eq!(columns[4].name, "Issued On");
        assert_eq!(columns[4].format_hint, "%d/%m/%Y");

        let schema = ColumnSchema::for_record::<Loan>().unwrap();
        assert_eq!(schema.len(), 5);
    }

    #[test]
    fn macro_writes_fields() {
        let mut loan = Loan::default();
        loan.set_field("borrower", Value::Text("Ann".to_owned())).unwrap();
        loan.set_field("amount", Value::Double(1500.5)).unwrap();
        loan.set_field("term", Value::Integer(12)).unwrap();
        loan.set_field("active", Value::Boolean(true)).unwrap();
        loan.set_field("issued", Value::Null).unwrap();

        assert_eq!(loan, Loan {
            borrower: "Ann".to_owned(),
            amount: 1500.5,
            term: 12,
            active: true,
            issued: None,
        });
        assert_eq!(
            loan.set_field("missing", Value::Null),
            Err(FieldError::UnknownField("missing".to_owned()))
        );
        assert_eq!(
            loan.set_field("term", Value::Boolean(true)),
            Err(FieldError::TypeMismatch { expected: "integer", found: "boolean" })
        );
    }

    #[test]
    fn from_value_conversions() {
        assert_eq!(String::from_value(Value::Integer(3)).unwrap(), "3");
        assert_eq!(i64::from_value(Value::Text("42".to_owned())).unwrap(), 42);
        assert_eq!(f64::from_value(Value::Integer(2)).unwrap(), 2.0);
        assert!(bool::from_value(Value::Text("yes".to_owned())).unwrap());
        assert_eq!(i32::from_value(Value::Integer(i64::MAX)), Err(FieldError::TypeMismatch {
            expected: "i32",
            found: "integer",
        }));
        assert_eq!(String::from_value(Value::Null), Err(FieldError::Null));
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);

        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(NaiveDateTime::from_value(Value::Date(day)).unwrap(), day.and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn closure_factory() {
        let mut factory = |row: usize| -> Result<Loan> {
            Ok(Loan { term: row as i32, ..Loan::default() })
        };
        assert_eq!(factory.create(7).unwrap().term, 7);
        let record: Loan = DefaultFactory.create(1).unwrap();
        assert_eq!(record, Loan::default());
    }
}
