//! # Entity Reader
//!
//! Couples the bundled `.xlsx` source with a [`RowMapper`]: open a workbook,
//! pick a sheet, stream it through the mapper and hand back the records.
use crate::converter::ConverterRegistry;
use crate::error::SheetMapperError;
use crate::mapper::{Diagnostics, MapperOptions, RowMapper};
use crate::record::{DefaultFactory, Record, RecordFactory};
use crate::spreadsheet::{SheetSelector, XlsxSheetSource};
use std::io::{Read, Seek};
use std::path::Path;

/// Reads records of type `T` from one worksheet of a workbook.
pub struct EntityReader<T, F = DefaultFactory> {
    mapper: RowMapper<T, F>,
    selector: SheetSelector,
}

impl<T: Record + Default> EntityReader<T, DefaultFactory> {
    /// Reader for `T` with built-in converters, default options and the default sheet.
    pub fn new() -> Result<Self, SheetMapperError> {
        Ok(Self::from_mapper(RowMapper::for_record()?))
    }
}

impl<T: Record, F: RecordFactory<T>> EntityReader<T, F> {
    pub fn with_factory(factory: F) -> Result<Self, SheetMapperError> {
        Ok(Self::from_mapper(RowMapper::with_factory(factory)?))
    }

    /// Reader around an existing mapper, reading the default sheet.
    pub fn from_mapper(mapper: RowMapper<T, F>) -> Self {
        EntityReader {
            mapper,
            selector: SheetSelector::default(),
        }
    }

    pub fn with_options(mut self, options: MapperOptions) -> Self {
        self.mapper = self.mapper.with_options(options);
        self
    }

    /// Resolves column converters against `registry` instead of the built-in one.
    pub fn with_registry(mut self, registry: &ConverterRegistry) -> Result<Self, SheetMapperError> {
        self.mapper.bind_converters(registry)?;
        Ok(self)
    }

    pub fn with_sheet(mut self, selector: SheetSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn sheet(&self) -> &SheetSelector {
        &self.selector
    }

    /// Parses the workbook at `path`, replacing the records of any earlier parse.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&[T], SheetMapperError> {
        let path = path.as_ref();
        tracing::debug!(file = %path.display(), "Reading workbook");
        let mut source = XlsxSheetSource::open(path)?;
        self.parse_source(&mut source)
    }

    /// Parses a workbook held by any seekable reader.
    pub fn parse_reader<RS: Read + Seek>(&mut self, reader: RS) -> Result<&[T], SheetMapperError> {
        let mut source = XlsxSheetSource::from_reader(reader)?;
        self.parse_source(&mut source)
    }

    fn parse_source<RS: Read + Seek>(&mut self, source: &mut XlsxSheetSource<RS>) -> Result<&[T], SheetMapperError> {
        self.mapper.reset();
        let sheet = source.stream_sheet(&self.selector, &mut self.mapper)?;
        tracing::info!(
            sheet = %sheet,
            records = self.mapper.read().len(),
            diagnostics = self.mapper.diagnostics().len(),
            "Parsed sheet"
        );
        Ok(self.mapper.read())
    }

    /// Records of the last parse.
    pub fn read(&self) -> &[T] {
        self.mapper.read()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.mapper.diagnostics()
    }

    pub fn mapper(&self) -> &RowMapper<T, F> {
        &self.mapper
    }

    pub fn into_records(self) -> Vec<T> {
        self.mapper.into_records()
    }
}

/// Reads every record of the default sheet of the workbook at `path`.
pub fn read_entities<T, P>(path: P) -> Result<Vec<T>, SheetMapperError>
where
    T: Record + Default,
    P: AsRef<Path>,
{
    let mut reader = EntityReader::<T>::new()?;
    reader.parse_file(path)?;
    Ok(reader.into_records())
}
