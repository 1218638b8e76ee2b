use thiserror::Error;

pub use crate::helpers::xml::XmlError;

/// Crate-level error.
/// Aggregates the module errors and the errors of the libraries used to read workbooks.
#[derive(Error, Debug)]
pub enum SheetMapperError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] XmlError),

    // Mapping errors
    #[error("{0}")]
    SchemaError(#[from] crate::schema::SchemaError),

    #[error("{0}")]
    MappingError(#[from] crate::mapper::MappingError),

    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetMapperError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SheetMapperError::WithContextError(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::MappingError;

    #[test]
    fn prefix_keeps_message() {
        let result: Result<(), SheetMapperError> = Err(MappingError::SheetFinished.into());
        let error = result.with_prefix("book.xlsx").unwrap_err();
        assert_eq!(error.to_string(), "book.xlsx: Sheet already finished");
    }
}
