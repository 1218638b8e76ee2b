//! Structured reports of recoverable problems met while mapping a sheet.
use crate::converter::ConversionError;
use crate::helpers::reference::index_to_reference;
use std::fmt::Display;
use std::slice::Iter;

/// Category of a recoverable problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Calendar text could not be read, the field was set to null
    InvalidDate,
    /// Converter or coercion failed for a cell
    Conversion,
    /// The record refused the value, the field was skipped
    FieldWrite,
    /// The row was discarded after a conversion failure
    RowDropped,
}

/// One recoverable problem, located by row and optionally column.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub row: usize,
    pub column: Option<usize>,
    pub column_name: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Cell reference (`B3`) or row label when no column applies.
    pub fn position(&self) -> String {
        match self.column {
            Some(column) => index_to_reference(self.row, column),
            None => format!("row {}", self.row + 1),
        }
    }
}

impl From<&ConversionError> for Diagnostic {
    fn from(error: &ConversionError) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Conversion,
            row: error.row,
            column: Some(error.column),
            column_name: Some(error.column_name.to_owned()),
            message: error.message.to_owned(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column_name {
            Some(name) => write!(f, "{:?} at {} ({}): {}", self.kind, self.position(), name, self.message),
            None => write!(f, "{:?} at {}: {}", self.kind, self.position(), self.message),
        }
    }
}

/// Ordered diagnostics of one parse.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Records a diagnostic and emits it as a tracing event.
    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::FieldWrite => tracing::error!(
                row = diagnostic.row,
                column = diagnostic.column,
                "Failed to set field: {}",
                diagnostic.message
            ),
            _ => tracing::warn!(
                row = diagnostic.row,
                column = diagnostic.column,
                kind = ?diagnostic.kind,
                "{}",
                diagnostic.message
            ),
        }
        self.entries.push(diagnostic);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Diagnostics of one kind, in the order they were raised.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.entries.iter().filter(move |diagnostic| diagnostic.kind == kind)
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
