//! Integration tests for the deterministic trainer
//!
//! Ensures identical models are produced across multiple runs and that
//! both upload formats load.

use absence_ai_core::{HyperParams, PipelineError, TrainingConfig, Value};
use absence_ai_trainer::{load_path, preprocess, GbdtTrainer};
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Create a synthetic upload for testing
fn create_synthetic_upload() -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;

    writeln!(file, "Student_ID,Attendance_Percentage,Grade,Gender,Meal_Code,Age")?;
    for i in 0..60 {
        let meal = ["Free", "Reduced", "Paid"][i % 3];
        let attendance = match (meal, i % 5) {
            ("Free", 0..=2) => 0.81,
            ("Reduced", 0) => 0.88,
            _ => 0.96,
        };
        let gender = if i % 2 == 0 { "F" } else { "M" };
        writeln!(
            file,
            "S{:03},{},{},{},{},{}",
            i,
            attendance,
            9 + i % 4,
            gender,
            meal,
            13 + i % 5
        )?;
    }

    file.flush()?;
    Ok(file)
}

fn params() -> HyperParams {
    HyperParams {
        n_estimators: 8,
        max_depth: 3,
        ..HyperParams::default()
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let file = create_synthetic_upload()?;
    let processed = preprocess(&load_path(file.path())?)?;

    let trainer1 = GbdtTrainer::new(params(), TrainingConfig::default());
    let model1 = trainer1.fit(&processed)?.model;

    let trainer2 = GbdtTrainer::new(params(), TrainingConfig::default());
    let model2 = trainer2.fit(&processed)?.model;

    assert_eq!(
        model1.trees.len(),
        model2.trees.len(),
        "Number of trees should be identical"
    );

    for (i, (tree1, tree2)) in model1.trees.iter().zip(model2.trees.iter()).enumerate() {
        assert_eq!(
            tree1.nodes.len(),
            tree2.nodes.len(),
            "Tree {} should have same number of nodes",
            i
        );
        for (j, (node1, node2)) in tree1.nodes.iter().zip(tree2.nodes.iter()).enumerate() {
            assert_eq!(node1, node2, "Tree {} node {} should match", i, j);
        }
    }

    assert_eq!(
        model1.structure_hash()?,
        model2.structure_hash()?,
        "Model hashes should be identical"
    );

    Ok(())
}

#[test]
fn test_canonical_json_determinism() -> Result<()> {
    let file = create_synthetic_upload()?;
    let processed = preprocess(&load_path(file.path())?)?;
    let model = GbdtTrainer::new(params(), TrainingConfig::default())
        .fit(&processed)?
        .model;

    let json1 = model.to_canonical_json()?;
    let json2 = model.to_canonical_json()?;
    assert_eq!(json1, json2, "Canonical JSON should be identical");

    let restored: absence_ai_core::Model = serde_json::from_str(&json1)?;
    assert_eq!(restored, model);

    Ok(())
}

#[test]
fn test_seed_changes_split() -> Result<()> {
    let file = create_synthetic_upload()?;
    let processed = preprocess(&load_path(file.path())?)?;

    let other_seed = TrainingConfig {
        seed: 7,
        ..TrainingConfig::default()
    };
    let a = GbdtTrainer::new(params(), TrainingConfig::default()).fit(&processed)?;
    let b = GbdtTrainer::new(params(), other_seed).fit(&processed)?;

    assert_eq!(a.split.holdout.len(), 12);
    assert_eq!(b.split.holdout.len(), 12);
    assert_ne!(a.split, b.split);

    Ok(())
}

#[test]
fn test_spreadsheet_upload() -> Result<()> {
    let table = load_path(fixture("students.xlsx"))?;

    assert_eq!(
        table.column_names(),
        vec!["Student_ID", "Attendance_Percentage", "Grade", "Gender", "Meal_Code"]
    );
    assert_eq!(table.len(), 4);
    assert_eq!(
        table.column("Attendance_Percentage").map(|c| c.values[1].clone()),
        Some(Value::Number(0.82))
    );

    let processed = preprocess(&table)?;
    assert_eq!(processed.labels, vec![0, 1, 1, 0]);
    assert!(processed.table.has_column("Grade_9"));
    assert!(processed.table.has_column("Meal_Code_Reduced"));

    Ok(())
}

#[test]
fn test_missing_file_is_parse_error() {
    let err = load_path("/nonexistent/upload.csv").unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));
}
