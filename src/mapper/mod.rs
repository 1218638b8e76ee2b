//! # Streaming Row Mapper
//!
//! Event-driven state machine turning sheet events into typed records. Row 0
//! is the header row and is checked against the schema; every later row gets
//! a fresh record from the factory, is populated cell by cell and is appended
//! to the output when the row ends. State per event is constant, so sheets of
//! any size can be mapped without buffering them.
pub(crate) mod diagnostics;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};

use crate::converter::coercion::{coerce, Coerced};
use crate::converter::{ConversionError, Converter, ConverterRegistry, NumericCoercion, Value};
use crate::event::SheetHandler;
use crate::record::{DefaultFactory, Record, RecordFactory};
use crate::schema::{ColumnSchema, SchemaError};
use std::sync::Arc;
use thiserror::Error;

/// Row index of the header row.
pub const HEADER_ROW: usize = 0;

/// Structural errors. Each one aborts the whole parse.
#[derive(Error, Debug)]
pub enum MappingError {
    /// The sheet does not have the expected shape
    #[error("Expected column '{expected}' but found '{actual}' (row {row}, column {column})")]
    HeaderMismatch {
        row: usize,
        column: usize,
        expected: String,
        actual: String,
    },

    /// The header row ended without naming a schema column
    #[error("Missing header for column '{expected}' (column {column})")]
    MissingHeader { column: usize, expected: String },

    /// The sheet has more columns than the schema describes
    #[error("Invalid column index {column} found in row {row}, schema has {length} columns")]
    InvalidColumnIndex { row: usize, column: usize, length: usize },

    /// The factory could not produce a record for a row
    #[error("Failed to create record for row {row}: {source}")]
    RecordConstruction {
        row: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Row {row} arrived after row {previous}")]
    RowOutOfOrder { previous: usize, row: usize },

    #[error("Row {row} started before row {open} ended")]
    RowNotEnded { open: usize, row: usize },

    /// A cell or row end names a row other than the open one
    #[error("Event for row {row} while row {open} is open")]
    RowMismatch { open: usize, row: usize },

    #[error("Sheet ended before row {open} ended")]
    SheetEndedInRow { open: usize },

    #[error("Sheet already finished")]
    SheetFinished,
}

/// What happens to a data row when one of its cells fails to convert.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConversionPolicy {
    /// Discard the whole row
    #[default]
    DropRow,
    /// Keep the row with the failed field set to null
    KeepRow,
}

/// Mapper configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MapperOptions {
    /// Compare header cells with column names
    pub validate_headers: bool,
    pub conversion_policy: ConversionPolicy,
    pub numeric_coercion: NumericCoercion,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            validate_headers: true,
            conversion_policy: ConversionPolicy::default(),
            numeric_coercion: NumericCoercion::default(),
        }
    }
}

/// Position of the mapper in the event stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MapperState {
    AwaitingRow,
    InHeaderRow,
    InDataRow,
    Done,
}

/// Record being populated for the current data row.
struct ActiveRow<T> {
    row: usize,
    record: T,
    rejected: bool,
}

/// Streaming mapper from sheet events to records of type `T`.
pub struct RowMapper<T, F = DefaultFactory> {
    schema: Arc<ColumnSchema>,
    converters: Vec<Box<dyn Converter>>,
    factory: F,
    options: MapperOptions,
    state: MapperState,
    current_row: Option<usize>,
    headers_seen: Vec<bool>,
    active: Option<ActiveRow<T>>,
    records: Vec<T>,
    diagnostics: Diagnostics,
}

impl<T: Record + Default> RowMapper<T, DefaultFactory> {
    /// Mapper for `T` with its declared schema, built-in converters and default options.
    pub fn for_record() -> Result<Self, SchemaError> {
        Self::with_factory(DefaultFactory)
    }
}

impl<T: Record, F: RecordFactory<T>> RowMapper<T, F> {
    /// Mapper for `T` with its declared schema and a custom record factory.
    pub fn with_factory(factory: F) -> Result<Self, SchemaError> {
        let schema = ColumnSchema::for_record::<T>()?;
        Self::new(schema, &ConverterRegistry::default(), MapperOptions::default(), factory)
    }

    /// Builds a mapper, instantiating one converter per schema column.
    pub fn new<S>(
        schema: S,
        registry: &ConverterRegistry,
        options: MapperOptions,
        factory: F,
    ) -> Result<Self, SchemaError>
    where
        S: Into<Arc<ColumnSchema>>,
    {
        let schema = schema.into();
        let converters = registry.bind(&schema)?;
        let headers_seen = vec![false; schema.len()];
        Ok(Self {
            schema,
            converters,
            factory,
            options,
            state: MapperState::AwaitingRow,
            current_row: None,
            headers_seen,
            active: None,
            records: Vec::new(),
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn with_options(mut self, options: MapperOptions) -> Self {
        self.options = options;
        self
    }

    /// Rebuilds the converter table from `registry`.
    pub fn bind_converters(&mut self, registry: &ConverterRegistry) -> Result<(), SchemaError> {
        self.converters = registry.bind(&self.schema)?;
        Ok(())
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn state(&self) -> MapperState {
        self.state
    }

    /// Records finalized so far, in row order.
    pub fn read(&self) -> &[T] {
        &self.records
    }

    /// Recoverable problems met so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consumes the mapper, returning its records.
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// Returns the mapper to its initial state so it can map another sheet.
    pub fn reset(&mut self) {
        self.state = MapperState::AwaitingRow;
        self.current_row = None;
        self.headers_seen.fill(false);
        self.active = None;
        self.records.clear();
        self.diagnostics.clear();
    }

    fn ensure_open(&self) -> Result<(), MappingError> {
        match self.state {
            MapperState::Done => Err(MappingError::SheetFinished),
            _ => Ok(()),
        }
    }

    /// Row currently open, if any.
    fn open_row(&self) -> Option<usize> {
        match self.state {
            MapperState::InHeaderRow | MapperState::InDataRow => self.current_row,
            MapperState::AwaitingRow | MapperState::Done => None,
        }
    }

    fn ensure_same_row(&self, row: usize) -> Result<(), MappingError> {
        match self.open_row() {
            Some(open) if open != row => Err(MappingError::RowMismatch { open, row }),
            _ => Ok(()),
        }
    }

    fn header_cell(&mut self, row: usize, column: usize, text: &str) -> Result<(), MappingError> {
        let info = self.schema.get(column).ok_or(MappingError::InvalidColumnIndex {
            row,
            column,
            length: self.schema.len(),
        })?;
        self.headers_seen[column] = true;
        if self.options.validate_headers && !info.matches_header(text) {
            return Err(MappingError::HeaderMismatch {
                row,
                column,
                expected: info.name.to_owned(),
                actual: text.to_owned(),
            });
        }
        Ok(())
    }

    fn data_cell(&mut self, row: usize, column: usize, text: &str) -> Result<(), MappingError> {
        let info = self.schema.get(column).ok_or(MappingError::InvalidColumnIndex {
            row,
            column,
            length: self.schema.len(),
        })?;
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if active.rejected {
            return Ok(());
        }

        let converted = self.converters[column]
            .convert(text)
            .map_err(|error| format!("{error:#}"))
            .map(|value| coerce(info, text, value, self.options.numeric_coercion));
        let value = match converted {
            Ok(Coerced::Ready(value)) => Ok(value),
            Ok(Coerced::Absent(message)) => {
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::InvalidDate,
                    row,
                    column: Some(column),
                    column_name: Some(info.name.to_owned()),
                    message: format!("Failed to parse {} value={} from row={}: {}", info.name, text, row, message),
                });
                Ok(Value::Null)
            }
            Ok(Coerced::Failed(message)) | Err(message) => Err(ConversionError {
                row,
                column,
                column_name: info.name.to_owned(),
                text: text.to_owned(),
                message,
            }),
        };

        let value = match value {
            Ok(value) => value,
            Err(error) => {
                self.diagnostics.push(Diagnostic::from(&error));
                match self.options.conversion_policy {
                    ConversionPolicy::DropRow => {
                        active.rejected = true;
                        return Ok(());
                    }
                    ConversionPolicy::KeepRow => Value::Null,
                }
            }
        };

        if let Err(error) = active.record.set_field(&info.field_id, value) {
            self.diagnostics.push(Diagnostic {
                kind: DiagnosticKind::FieldWrite,
                row,
                column: Some(column),
                column_name: Some(info.name.to_owned()),
                message: format!("{}: {}", info.field_id, error),
            });
        }
        Ok(())
    }

    fn finish_header(&mut self) -> Result<(), MappingError> {
        if !self.options.validate_headers {
            return Ok(());
        }
        match self.headers_seen.iter().position(|seen| !seen) {
            Some(column) => Err(MappingError::MissingHeader {
                column,
                expected: self.schema[column].name.to_owned(),
            }),
            None => Ok(()),
        }
    }
}

impl<T: Record, F: RecordFactory<T>> SheetHandler for RowMapper<T, F> {
    fn start_row(&mut self, row: usize) -> Result<(), MappingError> {
        self.ensure_open()?;
        if let Some(open) = self.open_row() {
            return Err(MappingError::RowNotEnded { open, row });
        }
        if let Some(previous) = self.current_row.filter(|previous| row <= *previous) {
            return Err(MappingError::RowOutOfOrder { previous, row });
        }
        self.current_row = Some(row);

        if row == HEADER_ROW {
            tracing::debug!(row, "Start header row");
            self.headers_seen.fill(false);
            self.state = MapperState::InHeaderRow;
            return Ok(());
        }

        let record = self
            .factory
            .create(row)
            .map_err(|source| MappingError::RecordConstruction { row, source })?;
        self.active = Some(ActiveRow { row, record, rejected: false });
        self.state = MapperState::InDataRow;
        Ok(())
    }

    fn cell(&mut self, row: usize, column: usize, text: &str) -> Result<(), MappingError> {
        self.ensure_open()?;
        self.ensure_same_row(row)?;
        match self.state {
            MapperState::InHeaderRow => self.header_cell(row, column, text),
            MapperState::InDataRow => self.data_cell(row, column, text),
            MapperState::AwaitingRow | MapperState::Done => Ok(()),
        }
    }

    fn end_row(&mut self, row: usize) -> Result<(), MappingError> {
        self.ensure_open()?;
        self.ensure_same_row(row)?;
        match self.state {
            MapperState::InHeaderRow => self.finish_header()?,
            MapperState::InDataRow => {
                if let Some(active) = self.active.take() {
                    if active.rejected {
                        self.diagnostics.push(Diagnostic {
                            kind: DiagnosticKind::RowDropped,
                            row: active.row,
                            column: None,
                            column_name: None,
                            message: format!("Row {} dropped after conversion failure", active.row),
                        });
                    } else {
                        self.records.push(active.record);
                    }
                }
            }
            MapperState::AwaitingRow | MapperState::Done => (),
        }
        self.state = MapperState::AwaitingRow;
        Ok(())
    }

    fn end_sheet(&mut self) -> Result<(), MappingError> {
        self.ensure_open()?;
        if let Some(open) = self.open_row() {
            return Err(MappingError::SheetEndedInRow { open });
        }
        tracing::debug!(
            records = self.records.len(),
            diagnostics = self.diagnostics.len(),
            "Sheet mapped"
        );
        self.state = MapperState::Done;
        Ok(())
    }
}
