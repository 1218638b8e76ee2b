//! # Sheet Mapper
//!
//! Streams spreadsheet rows into strongly typed records.
//!
//! A record type describes its columns (header name, position, target type,
//! converter) and accepts values through an explicit setter, usually generated
//! by [`impl_record!`]. A [`RowMapper`] consumes row and cell events from any
//! source implementing the [`SheetHandler`] protocol: row 0 is checked against
//! the declared headers, every later row becomes one record. Cell text goes
//! through the column's converter and a type coercion keyed on the column's
//! target type.
//!
//! ## Features
//!
//! - **Streaming**: constant state per event, no buffering of the sheet
//! - **Header validation**: case-insensitive, can be disabled
//! - **Pluggable converters**: registry of converter factories addressed by id
//! - **Date handling**: locale-aware date parsing, strict timestamp grammar
//! - **Diagnostics**: recoverable problems are returned with cell positions
//! - **Bundled `.xlsx` source**: [`XlsxSheetSource`] and [`EntityReader`]
//!
//! ## Example
//!
//! ```no_run
//! use sheet_mapper::{impl_record, read_entities};
//!
//! #[derive(Debug, Default)]
//! struct Upload {
//!     account: String,
//!     amount: f64,
//!     opened: Option<chrono::NaiveDate>,
//! }
//!
//! impl_record!(Upload {
//!     account: 0 => "Account" as Varchar using "trim",
//!     amount: 1 => "Amount" as Double using "double",
//!     opened: 2 => "Opened" as Date,
//! });
//!
//! let uploads: Vec<Upload> = read_entities("uploads.xlsx")?;
//! # Ok::<(), sheet_mapper::SheetMapperError>(())
//! ```
pub mod converter;
pub mod error;
pub mod event;
pub(crate) mod helpers;
pub mod mapper;
pub mod reader;
pub mod record;
pub mod schema;
pub mod spreadsheet;

pub use converter::{Converter, ConverterRegistry, NumericCoercion, Value};
pub use error::SheetMapperError;
pub use event::{replay, SheetEvent, SheetHandler};
pub use mapper::{ConversionPolicy, Diagnostic, DiagnosticKind, MapperOptions, MappingError, RowMapper};
pub use reader::{read_entities, EntityReader};
pub use record::{FieldError, FromValue, Record, RecordFactory};
pub use schema::{ColumnDeclaration, ColumnSchema, ColumnType, SchemaError};
pub use spreadsheet::{SheetSelector, XlsxSheetSource};
