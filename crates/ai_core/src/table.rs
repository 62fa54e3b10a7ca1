//! In-memory tabular data
//!
//! A `Table` is a list of equally long named columns. Cells are loosely typed
//! because uploads mix numeric ratios, category codes and free text.

use crate::errors::{PipelineError, Result};
use std::collections::HashSet;
use std::fmt;

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Empty,
}

impl Value {
    /// Type a raw textual cell: blank is empty, anything `f64` accepts is a
    /// number, the rest is trimmed text. `NaN` and infinities are missing.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Value::number(n),
            Err(_) => Value::Text(trimmed.to_string()),
        }
    }

    /// Numeric cell; non-finite values are stored as missing
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Value::Number(n)
        } else {
            Value::Empty
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Label used when this cell is a category value.
    ///
    /// Integral numbers drop their fractional part (`9.0` -> `9`) and empty
    /// cells become `nan`, so indicator names read `Grade_9`, `Gender_F`.
    pub fn category_label(&self) -> String {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Value::Number(n) => format!("{}", n),
            Value::Text(s) => s.clone(),
            Value::Empty => "nan".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Empty => Ok(()),
        }
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a numeric column
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(name, values.into_iter().map(Value::Number).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column-major table with a fixed row count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table from a header and row-major records.
    ///
    /// Fails with a parse error on duplicate headers or ragged rows.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if headers.is_empty() {
            return Err(PipelineError::Parse("missing header row".to_string()));
        }

        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(PipelineError::Parse(format!(
                    "duplicate column name '{}'",
                    header
                )));
            }
        }

        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        let row_count = rows.len();
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PipelineError::Parse(format!(
                    "row {}: expected {} fields, got {}",
                    row_idx + 1,
                    columns.len(),
                    row.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Ok(Self {
            columns,
            rows: row_count,
        })
    }

    /// Build a table from whole columns; all must have the same length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(PipelineError::Schema(format!(
                "column '{}' already exists",
                column.name
            )));
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(PipelineError::Schema(format!(
                "column '{}' has {} values, table has {} rows",
                column.name,
                column.len(),
                self.rows
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove and return a column, keeping the order of the others
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Read a column as numbers; empty or textual cells are a schema error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let column = self
            .column(name)
            .ok_or_else(|| PipelineError::Schema(format!("missing required column '{}'", name)))?;

        column
            .values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                value.as_f64().filter(|n| n.is_finite()).ok_or_else(|| {
                    PipelineError::Schema(format!(
                        "column '{}' row {}: expected a number, got '{}'",
                        name, row, value
                    ))
                })
            })
            .collect()
    }
}
