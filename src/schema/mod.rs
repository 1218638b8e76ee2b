//! # Column Schema
//!
//! Ordered, index-addressable description of which sheet column feeds which
//! record field. A schema is resolved once from the column declarations of a
//! record type and is read-only afterwards.
pub(crate) mod column;

pub use column::{ColumnDeclaration, ColumnInfo, ColumnType};

use crate::record::Record;
use std::ops::Index;
use std::slice::Iter;
use thiserror::Error;

/// Errors raised while resolving a schema. All of them abort before any row is read.
#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    /// The record type declares no mapped columns
    #[error("Record type '{0}' does not declare any columns")]
    NoColumnsDeclared(String),

    /// Column indices are not a dense `0..n` permutation
    #[error("Column index {index} is {problem} (fields: {fields:?})")]
    DuplicateOrMissingIndex {
        index: usize,
        problem: IndexProblem,
        fields: Vec<String>,
    },

    /// A column names a converter the registry does not provide
    #[error("Column '{column}' uses unknown converter '{converter}'")]
    UnknownConverter { column: String, converter: String },
}

/// Why an index slot is invalid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexProblem {
    Duplicate,
    Missing,
}

impl std::fmt::Display for IndexProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexProblem::Duplicate => write!(f, "declared more than once"),
            IndexProblem::Missing => write!(f, "not declared"),
        }
    }
}

/// Validated, dense column schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    columns: Vec<ColumnInfo>,
}

impl ColumnSchema {
    /// Builds a schema from declarations, rejecting empty, colliding or sparse indices.
    ///
    /// `owner` names the record type in error messages.
    pub fn resolve<I>(owner: &str, declarations: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = ColumnDeclaration>,
    {
        let declarations: Vec<ColumnDeclaration> = declarations.into_iter().collect();
        if declarations.is_empty() {
            return Err(SchemaError::NoColumnsDeclared(owner.to_owned()));
        }

        let length = declarations.iter().map(|column| column.index).max().unwrap_or(0) + 1;
        let mut slots: Vec<Option<ColumnInfo>> = vec![None; length];
        for declaration in declarations {
            let index = declaration.index;
            if let Some(existing) = &slots[index] {
                return Err(SchemaError::DuplicateOrMissingIndex {
                    index,
                    problem: IndexProblem::Duplicate,
                    fields: vec![existing.field_id.to_owned(), declaration.field_id],
                });
            }
            slots[index] = Some(ColumnInfo::from(declaration));
        }

        let columns = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or(SchemaError::DuplicateOrMissingIndex {
                    index,
                    problem: IndexProblem::Missing,
                    fields: Vec::new(),
                })
            })
            .collect::<Result<Vec<ColumnInfo>, SchemaError>>()?;
        Ok(ColumnSchema { columns })
    }

    /// Resolves the schema declared by a record type.
    pub fn for_record<T: Record>() -> Result<Self, SchemaError> {
        Self::resolve(std::any::type_name::<T>(), T::columns())
    }

    /// Number of columns, always `max(index) + 1`.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column at a sheet position, `None` beyond the schema.
    pub fn get(&self, index: usize) -> Option<&ColumnInfo> {
        self.columns.get(index)
    }

    pub fn iter(&self) -> Iter<'_, ColumnInfo> {
        self.columns.iter()
    }
}

impl Index<usize> for ColumnSchema {
    type Output = ColumnInfo;

    fn index(&self, index: usize) -> &Self::Output {
        &self.columns[index]
    }
}

impl<'a> IntoIterator for &'a ColumnSchema {
    type Item = &'a ColumnInfo;
    type IntoIter = Iter<'a, ColumnInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
