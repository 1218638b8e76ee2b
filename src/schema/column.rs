use crate::converter::IDENTITY;

/// Target type a sheet column is coerced into before it reaches a record field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ColumnType {
    /// Display text, passed through the column converter untouched
    #[default]
    Varchar,
    /// Boolean values (true/false)
    Boolean,
    /// 64-bit signed integers (covers int and long fields)
    Integer,
    /// Double-precision floating point numbers
    Double,
    /// Calendar date without time component
    Date,
    /// Local date and time, reparsed leniently like a date
    DateTime,
    /// Fixed timestamp in the canonical `YYYY-MM-DD HH:MM:SS[.f]` grammar
    Timestamp,
}

/// Column metadata declared by a record type, before it is validated into a schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDeclaration {
    /// Header text expected in the sheet
    pub name: String,
    /// Record field receiving the value
    pub field_id: String,
    /// Zero-based sheet column
    pub index: usize,
    /// Optional chrono format tried first for calendar columns
    pub format_hint: String,
    pub target_type: ColumnType,
    /// Registry id of the converter applied to the cell text
    pub converter_id: String,
}

impl ColumnDeclaration {
    /// Declares a column with the identity converter and no format hint.
    pub fn new(name: &str, field_id: &str, index: usize, target_type: ColumnType) -> Self {
        Self {
            name: name.to_owned(),
            field_id: field_id.to_owned(),
            index,
            format_hint: String::new(),
            target_type,
            converter_id: IDENTITY.to_owned(),
        }
    }

    pub fn with_converter(mut self, converter_id: &str) -> Self {
        self.converter_id = converter_id.to_owned();
        self
    }

    pub fn with_format(mut self, format_hint: &str) -> Self {
        self.format_hint = format_hint.to_owned();
        self
    }
}

/// One validated schema column. Its `index` always equals its slot in the schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub field_id: String,
    pub index: usize,
    pub format_hint: String,
    pub target_type: ColumnType,
    pub converter_id: String,
}

impl From<ColumnDeclaration> for ColumnInfo {
    fn from(declaration: ColumnDeclaration) -> Self {
        ColumnInfo {
            name: declaration.name,
            field_id: declaration.field_id,
            index: declaration.index,
            format_hint: declaration.format_hint,
            target_type: declaration.target_type,
            converter_id: declaration.converter_id,
        }
    }
}

impl ColumnInfo {
    /// Case-insensitive comparison of a header cell against the column name.
    pub fn matches_header(&self, text: &str) -> bool {
        self.name.to_lowercase() == text.to_lowercase()
    }
}
