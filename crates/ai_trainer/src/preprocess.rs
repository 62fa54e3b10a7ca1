//! Label derivation and one-hot encoding
//!
//! Turns a raw upload into the processed table the trainer consumes:
//! the binary `CA_Status` label, a `Student_ID` for every row and one
//! indicator column per category value (plus an unknown bucket) for
//! `Grade`, `Gender` and `Meal_Code`.

use absence_ai_core::{
    CategoryVocabulary, Column, PipelineError, Result, Table, ABSENCE_THRESHOLD,
    ATTENDANCE_COLUMN, CATEGORICAL_COLUMNS, ID_COLUMN, LABEL_COLUMN,
};
use tracing::{debug, warn};

/// Output of the preprocessor
#[derive(Debug, Clone)]
pub struct ProcessedTable {
    /// Remaining original columns, then `CA_Status`, `Student_ID` and the
    /// indicator columns
    pub table: Table,
    /// Vocabulary the indicators were built from
    pub vocabulary: CategoryVocabulary,
    /// `CA_Status` per row
    pub labels: Vec<u8>,
}

impl ProcessedTable {
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    pub fn negatives(&self) -> usize {
        self.labels.len() - self.positives()
    }
}

/// 1 when the attendance ratio is at or below the threshold
pub fn absence_label(attendance: f64) -> u8 {
    u8::from(attendance <= ABSENCE_THRESHOLD)
}

/// Fit a vocabulary on `table` and encode it.
///
/// Each categorical group gets one indicator per distinct value plus a
/// trailing `<Column>__unknown` indicator, so a group has one more column
/// than it has distinct values.
pub fn preprocess(table: &Table) -> Result<ProcessedTable> {
    let vocabulary = CategoryVocabulary::fit(table, &CATEGORICAL_COLUMNS)?;
    preprocess_with(table, &vocabulary)
}

/// Encode `table` with a pinned vocabulary; unseen values land in the
/// unknown bucket of their column
pub fn preprocess_with(table: &Table, vocabulary: &CategoryVocabulary) -> Result<ProcessedTable> {
    let attendance = table.numeric_column(ATTENDANCE_COLUMN)?;
    let labels: Vec<u8> = attendance.iter().map(|&a| absence_label(a)).collect();

    for group in &vocabulary.groups {
        if !table.has_column(&group.column) {
            return Err(PipelineError::Schema(format!(
                "missing required column '{}'",
                group.column
            )));
        }
    }

    let categorical: Vec<&str> = vocabulary.groups.iter().map(|g| g.column.as_str()).collect();
    let mut processed = Table::default();
    for column in table.columns() {
        if categorical.contains(&column.name.as_str()) || column.name == LABEL_COLUMN {
            continue;
        }
        processed.push_column(column.clone())?;
    }

    if table.has_column(LABEL_COLUMN) {
        warn!("Input already has a '{}' column; it is recomputed", LABEL_COLUMN);
    }
    processed.push_column(Column::numeric(
        LABEL_COLUMN,
        labels.iter().map(|&l| f64::from(l)),
    ))?;

    if !table.has_column(ID_COLUMN) {
        processed.push_column(Column::numeric(ID_COLUMN, (0..table.len()).map(|i| i as f64)))?;
    }

    for group in &vocabulary.groups {
        let values = table
            .column(&group.column)
            .map(|c| c.values.as_slice())
            .unwrap_or_default();

        let slots: Vec<usize> = values.iter().map(|v| group.slot(&v.category_label())).collect();
        let unknown = slots.iter().filter(|&&s| s == group.values.len()).count();
        if unknown > 0 {
            warn!(
                "{} rows of '{}' hold values not seen at training time",
                unknown, group.column
            );
        }

        for (slot, name) in group.indicator_names().into_iter().enumerate() {
            let indicator = slots.iter().map(|&s| if s == slot { 1.0 } else { 0.0 });
            processed.push_column(Column::numeric(name, indicator))?;
        }
    }

    debug!(
        "Preprocessed {} rows into {} columns ({} indicators)",
        processed.len(),
        processed.width(),
        vocabulary.indicator_count()
    );

    Ok(ProcessedTable {
        table: processed,
        vocabulary: vocabulary.clone(),
        labels,
    })
}
