//! # Converters
//!
//! Pluggable text to typed value transformation. Every column names a
//! converter id; the registry maps ids to factories so a mapper can build one
//! converter instance per column. Type-driven coercions for dates, timestamps
//! and integers live in [`coercion`] and run after the converter.
pub(crate) mod coercion;

pub use coercion::NumericCoercion;

use crate::helpers::reference::index_to_reference;
use crate::schema::{ColumnSchema, SchemaError};
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fmt::Display;

/// Id of the default passthrough converter.
pub const IDENTITY: &str = "identity";
/// Id of the converter trimming surrounding whitespace.
pub const TRIM: &str = "trim";
/// Id of the converter reading yes/no style booleans.
pub const BOOLEAN: &str = "boolean";
/// Id of the converter reading whole numbers.
pub const INTEGER: &str = "integer";
/// Id of the converter reading floating point numbers.
pub const DOUBLE: &str = "double";

/// Typed value produced from one cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absent value (failed date parse, or a dropped field kept as null)
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Short type name used in error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::DateTime(value) | Value::Timestamp(value) => {
                write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f"))
            }
        }
    }
}

/// Row-scoped failure to turn a cell's text into the column's value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub row: usize,
    pub column: usize,
    pub column_name: String,
    pub text: String,
    pub message: String,
}

impl ConversionError {
    /// Excel-style reference of the failing cell.
    pub fn position(&self) -> String {
        index_to_reference(self.row, self.column)
    }
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Convert '{}' for column '{}' at {} failed: {}",
            self.text,
            self.column_name,
            self.position(),
            self.message
        )
    }
}

impl std::error::Error for ConversionError {}

/// Transforms a cell's display text into a typed value.
///
/// Converters must not keep state between calls.
pub trait Converter {
    fn convert(&self, text: &str) -> Result<Value>;
}

impl<F> Converter for F
where
    F: Fn(&str) -> Result<Value>,
{
    fn convert(&self, text: &str) -> Result<Value> {
        self(text)
    }
}

/// Passes the text through as [`Value::Text`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl Converter for Identity {
    fn convert(&self, text: &str) -> Result<Value> {
        Ok(Value::Text(text.to_owned()))
    }
}

/// Trims surrounding whitespace, keeping the result as text.
#[derive(Copy, Clone, Debug, Default)]
pub struct Trim;

impl Converter for Trim {
    fn convert(&self, text: &str) -> Result<Value> {
        Ok(Value::Text(text.trim().to_owned()))
    }
}

/// Reads `true/false`, `yes/no`, `y/n` and `1/0` in any case.
#[derive(Copy, Clone, Debug, Default)]
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn convert(&self, text: &str) -> Result<Value> {
        coercion::parse_boolean(text)
            .map(Value::Boolean)
            .ok_or_else(|| anyhow!("'{text}' is not a boolean"))
    }
}

/// Reads whole numbers, ignoring grouping commas.
#[derive(Copy, Clone, Debug, Default)]
pub struct IntegerConverter;

impl Converter for IntegerConverter {
    fn convert(&self, text: &str) -> Result<Value> {
        coercion::parse_integer(text)
            .map(Value::Integer)
            .ok_or_else(|| anyhow!("'{text}' is not an integer"))
    }
}

/// Reads floating point numbers, ignoring grouping commas.
#[derive(Copy, Clone, Debug, Default)]
pub struct DoubleConverter;

impl Converter for DoubleConverter {
    fn convert(&self, text: &str) -> Result<Value> {
        coercion::parse_double(text)
            .map(Value::Double)
            .ok_or_else(|| anyhow!("'{text}' is not a number"))
    }
}

type ConverterFactory = Box<dyn Fn() -> Box<dyn Converter>>;

/// Converter factories addressed by id.
pub struct ConverterRegistry {
    factories: HashMap<String, ConverterFactory>,
}

impl Default for ConverterRegistry {
    /// Registry holding the built-in converters.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(IDENTITY, || Identity)
            .register(TRIM, || Trim)
            .register(BOOLEAN, || BooleanConverter)
            .register(INTEGER, || IntegerConverter)
            .register(DOUBLE, || DoubleConverter);
        registry
    }
}

impl ConverterRegistry {
    /// Registry without any converter, not even the identity one.
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registers a converter factory, replacing any previous one with the same id.
    pub fn register<C, F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        C: Converter + 'static,
        F: Fn() -> C + 'static,
    {
        self.factories.insert(
            id.to_owned(),
            Box::new(move || Box::new(factory()) as Box<dyn Converter>),
        );
        self
    }

    /// Registers a plain function or closure as converter.
    pub fn register_fn<F>(&mut self, id: &str, convert: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Value> + Clone + 'static,
    {
        self.register(id, move || convert.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Creates a fresh converter instance.
    pub fn instantiate(&self, id: &str) -> Option<Box<dyn Converter>> {
        self.factories.get(id).map(|factory| factory())
    }

    /// One-shot conversion with a freshly instantiated converter.
    pub fn convert(&self, id: &str, text: &str) -> Result<Value> {
        let converter = self
            .instantiate(id)
            .ok_or_else(|| anyhow!("Unknown converter '{id}'"))?;
        converter.convert(text)
    }

    /// Instantiates one converter per schema column, in column order.
    pub(crate) fn bind(&self, schema: &ColumnSchema) -> Result<Vec<Box<dyn Converter>>, SchemaError> {
        schema
            .iter()
            .map(|column| {
                self.instantiate(&column.converter_id)
                    .ok_or_else(|| SchemaError::UnknownConverter {
                        column: column.name.to_owned(),
                        converter: column.converter_id.to_owned(),
                    })
            })
            .collect()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("ConverterRegistry").field("ids", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDeclaration, ColumnType};

    #[test]
    fn builtin_converters() {
        let registry = ConverterRegistry::default();
        assert_eq!(registry.convert(IDENTITY, " Ann ").unwrap(), Value::Text(" Ann ".to_owned()));
        assert_eq!(registry.convert(TRIM, " Ann ").unwrap(), Value::Text("Ann".to_owned()));
        assert_eq!(registry.convert(BOOLEAN, "Yes").unwrap(), Value::Boolean(true));
        assert_eq!(registry.convert(BOOLEAN, "0").unwrap(), Value::Boolean(false));
        assert_eq!(registry.convert(INTEGER, "1,234").unwrap(), Value::Integer(1234));
        assert_eq!(registry.convert(DOUBLE, "2.5").unwrap(), Value::Double(2.5));
        assert!(registry.convert(BOOLEAN, "maybe").is_err());
        assert!(registry.convert(INTEGER, "abc").is_err());
        assert!(registry.convert("missing", "abc").is_err());
    }

    #[test]
    fn register_closure_converter() {
        let mut registry = ConverterRegistry::default();
        registry.register_fn("upper", |text: &str| Ok(Value::Text(text.to_uppercase())));
        assert!(registry.contains("upper"));
        assert_eq!(registry.convert("upper", "zmw").unwrap(), Value::Text("ZMW".to_owned()));
    }

    #[test]
    fn bind_instantiates_per_column() {
        let schema = ColumnSchema::resolve("Row", vec![
            ColumnDeclaration::new("A", "a", 0, ColumnType::Varchar),
            ColumnDeclaration::new("B", "b", 1, ColumnType::Boolean).with_converter(BOOLEAN),
        ]).unwrap();
        let converters = ConverterRegistry::default().bind(&schema).unwrap();
        assert_eq!(converters.len(), 2);
        assert_eq!(converters[1].convert("n").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn bind_rejects_unknown_converter() {
        let schema = ColumnSchema::resolve("Row", vec![
            ColumnDeclaration::new("A", "a", 0, ColumnType::Varchar).with_converter("nope"),
        ]).unwrap();
        let result = ConverterRegistry::default().bind(&schema);
        assert!(matches!(
            result,
            Err(SchemaError::UnknownConverter { ref column, ref converter }) if column == "A" && converter == "nope"
        ));
    }

    #[test]
    fn conversion_error_names_cell() {
        let error = ConversionError {
            row: 2,
            column: 1,
            column_name: "Age".to_owned(),
            text: "x".to_owned(),
            message: "not a number".to_owned(),
        };
        assert_eq!(error.to_string(), "Convert 'x' for column 'Age' at B3 failed: not a number");
    }
}
