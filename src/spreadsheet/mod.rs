//! # Spreadsheet Source
//!
//! Reads `.xlsx` workbooks and turns one worksheet into the row and cell
//! events consumed by a [`SheetHandler`](crate::event::SheetHandler).
pub(crate) mod cell;
pub(crate) mod excel;
pub mod xlsx;

use glob::MatchOptions;
use glob::Pattern;
use std::fs::File;
use std::io::BufReader;
use thiserror::Error;

pub use xlsx::XlsxSheetSource;

/// Errors raised while locating workbook content
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Workbook contains no sheets")]
    EmptyWorkbook,

    #[error("Missing '{0}' in workbook package")]
    MissingPart(String),

    #[error("No sheet matches '{pattern}', available sheets: {available:?}")]
    SheetNotFound { pattern: String, available: Vec<String> },

    #[error("Shared string #{0} does not exist")]
    SharedStringIndex(usize),

    #[error("Invalid sheet pattern '{pattern}': {message}")]
    InvalidSheetPattern { pattern: String, message: String },
}

/// Type alias for buffered file reader
pub type FileReader = BufReader<File>;

const SHEET_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Chooses the worksheet to stream by name. Patterns are case-insensitive
/// globs, so `data*` accepts `Data 2024`.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetSelector {
    pattern: Pattern,
}

impl SheetSelector {
    /// Sheet read when nothing else is configured.
    pub const DEFAULT_SHEET: &'static str = "uploads";

    pub fn new(pattern: &str) -> Result<Self, SpreadsheetError> {
        Pattern::new(pattern)
            .map(|pattern| SheetSelector { pattern })
            .map_err(|error| SpreadsheetError::InvalidSheetPattern {
                pattern: pattern.to_owned(),
                message: error.msg.to_owned(),
            })
    }

    /// Selector matching `name` literally, glob metacharacters included.
    pub fn exact(name: &str) -> Self {
        let pattern = Pattern::new(&Pattern::escape(name)).expect("Escaped sheet pattern");
        SheetSelector { pattern }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn accept(&self, sheet_name: &str) -> bool {
        self.pattern.matches_with(sheet_name, SHEET_MATCH_OPTIONS)
    }
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::exact(Self::DEFAULT_SHEET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selects_uploads() {
        let selector = SheetSelector::default();
        assert_eq!(selector.pattern(), "uploads");
        assert!(selector.accept("uploads"));
        assert!(selector.accept("Uploads"));
        assert!(!selector.accept("uploads2"));
    }

    #[test]
    fn glob_selector() {
        let selector = SheetSelector::new("data*").unwrap();
        assert!(selector.accept("Data 2024"));
        assert!(!selector.accept("Summary"));
        assert!(matches!(
            SheetSelector::new("[data"),
            Err(SpreadsheetError::InvalidSheetPattern { .. })
        ));
    }

    #[test]
    fn exact_selector_escapes() {
        let selector = SheetSelector::exact("Q[1]");
        assert!(selector.accept("q[1]"));
        assert!(!selector.accept("Q1"));
    }
}
