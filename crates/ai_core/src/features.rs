//! Feature schema for the absenteeism model
//!
//! Holds the fixed column names of the upload, the category vocabulary that
//! pins the one-hot column set at training time, and the dense feature
//! matrix handed to the trainer and the explainer.

use crate::errors::{PipelineError, Result};
use crate::table::{Table, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Attendance ratio in [0, 1]
pub const ATTENDANCE_COLUMN: &str = "Attendance_Percentage";
/// Derived binary label
pub const LABEL_COLUMN: &str = "CA_Status";
/// Optional row identifier
pub const ID_COLUMN: &str = "Student_ID";
/// Columns that are one-hot encoded
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["Grade", "Gender", "Meal_Code"];
/// A student at or below this attendance ratio is chronically absent
pub const ABSENCE_THRESHOLD: f64 = 0.9;
/// Suffix of the indicator that catches values unseen at fit time
pub const UNKNOWN_SUFFIX: &str = "__unknown";

/// Columns of a processed table that never become model features.
///
/// The attendance ratio is excluded because the label is a threshold on it.
pub const NON_FEATURE_COLUMNS: [&str; 3] = [LABEL_COLUMN, ID_COLUMN, ATTENDANCE_COLUMN];

/// Observed values of one categorical column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryGroup {
    pub column: String,
    /// Category labels in encoding order
    pub values: Vec<String>,
}

impl CategoryGroup {
    pub fn indicator_name(&self, label: &str) -> String {
        format!("{}_{}", self.column, label)
    }

    pub fn unknown_indicator(&self) -> String {
        format!("{}{}", self.column, UNKNOWN_SUFFIX)
    }

    /// Indicator columns in order: one per known value, then the unknown bucket
    pub fn indicator_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.iter().map(|v| self.indicator_name(v)).collect();
        names.push(self.unknown_indicator());
        names
    }

    /// Position of a label among the indicators; unseen labels map to the
    /// unknown bucket (the last position).
    pub fn slot(&self, label: &str) -> usize {
        self.values
            .iter()
            .position(|v| v == label)
            .unwrap_or(self.values.len())
    }
}

/// Category vocabulary captured when a model is trained
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryVocabulary {
    pub groups: Vec<CategoryGroup>,
}

impl CategoryVocabulary {
    /// Capture the distinct values of `columns` in `table`.
    ///
    /// Numbers sort numerically ahead of text, text sorts lexicographically,
    /// empty cells (`nan`) come last.
    pub fn fit(table: &Table, columns: &[&str]) -> Result<Self> {
        let mut groups = Vec::with_capacity(columns.len());

        for &name in columns {
            let column = table.column(name).ok_or_else(|| {
                PipelineError::Schema(format!("missing required column '{}'", name))
            })?;

            let mut distinct: BTreeMap<String, &Value> = BTreeMap::new();
            for value in &column.values {
                distinct.entry(value.category_label()).or_insert(value);
            }

            let mut labelled: Vec<(String, &Value)> = distinct.into_iter().collect();
            labelled.sort_by(|(la, va), (lb, vb)| compare_categories(la, va, lb, vb));

            let group = CategoryGroup {
                column: name.to_string(),
                values: labelled.into_iter().map(|(label, _)| label).collect(),
            };

            let unknown = group.unknown_indicator();
            if group.values.iter().any(|v| group.indicator_name(v) == unknown) {
                return Err(PipelineError::Schema(format!(
                    "column '{}' holds a value that collides with its unknown bucket",
                    name
                )));
            }

            groups.push(group);
        }

        Ok(Self { groups })
    }

    pub fn group(&self, column: &str) -> Option<&CategoryGroup> {
        self.groups.iter().find(|g| g.column == column)
    }

    /// Total number of indicator columns, unknown buckets included
    pub fn indicator_count(&self) -> usize {
        self.groups.iter().map(|g| g.values.len() + 1).sum()
    }
}

fn compare_categories(la: &str, va: &Value, lb: &str, vb: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::Text(_) => 1,
            Value::Empty => 2,
        }
    }
    match (va, vb) {
        (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
        _ => rank(va).cmp(&rank(vb)).then_with(|| la.cmp(lb)),
    }
}

/// Dense row-major feature matrix with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Collect every column of a processed table except [`NON_FEATURE_COLUMNS`].
    ///
    /// Empty and non-finite cells become NaN (routed as missing by the
    /// trees); text cells are a schema error.
    pub fn from_table(table: &Table) -> Result<Self> {
        let feature_columns: Vec<_> = table
            .columns()
            .iter()
            .filter(|c| !NON_FEATURE_COLUMNS.contains(&c.name.as_str()))
            .collect();

        let names: Vec<String> = feature_columns.iter().map(|c| c.name.clone()).collect();
        let mut rows = vec![Vec::with_capacity(names.len()); table.len()];

        for column in feature_columns {
            for (row_idx, value) in column.values.iter().enumerate() {
                let number = match value {
                    Value::Number(n) if n.is_finite() => *n,
                    Value::Number(_) | Value::Empty => f64::NAN,
                    Value::Text(text) => {
                        return Err(PipelineError::Schema(format!(
                            "feature column '{}' row {}: expected a number, got '{}'",
                            column.name, row_idx, text
                        )))
                    }
                };
                rows[row_idx].push(number);
            }
        }

        Ok(Self { names, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.names.len()
    }

    /// Reorder columns to `expected`. The column sets must be identical.
    pub fn aligned_to(&self, expected: &[String]) -> Result<FeatureMatrix> {
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(self.names.len());
        for (idx, name) in self.names.iter().enumerate() {
            if positions.insert(name.as_str(), idx).is_some() {
                return Err(PipelineError::Compatibility(format!(
                    "duplicate feature column '{}'",
                    name
                )));
            }
        }

        let missing: Vec<&str> = expected
            .iter()
            .filter(|name| !positions.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        let unexpected: Vec<&str> = self
            .names
            .iter()
            .filter(|name| !expected.contains(name))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(PipelineError::Compatibility(format!(
                "missing columns {:?}, unexpected columns {:?}",
                missing, unexpected
            )));
        }

        let order: Vec<usize> = expected.iter().map(|name| positions[name.as_str()]).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| order.iter().map(|&idx| row[idx]).collect())
            .collect();

        Ok(FeatureMatrix {
            names: expected.to_vec(),
            rows,
        })
    }

    /// Copy out a subset of rows
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            names: self.names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}
