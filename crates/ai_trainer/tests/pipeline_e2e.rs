//! End-to-end pipeline tests over a realistic upload

use absence_ai_core::{
    ConfigManager, HyperParamUpdate, Model, PipelineConfig, PipelineError, TrainingConfig,
};
use absence_ai_trainer::{explain_upload, render_text, Pipeline, CHART_TITLE};
use anyhow::Result;
use std::path::Path;

/// 100 students, 15 of them at or below 90% attendance
fn district_upload() -> String {
    let mut csv = String::from("Student_ID,Attendance_Percentage,Grade,Gender,Meal_Code\n");
    let meals = ["Free", "Reduced", "Paid"];
    for i in 0..100 {
        let attendance = if i < 15 {
            0.70 + (i as f64) * 0.01
        } else {
            0.91 + ((i % 9) as f64) * 0.01
        };
        let meal = if i < 15 { meals[i % 2] } else { meals[i % 3] };
        let gender = if i % 2 == 0 { "F" } else { "M" };
        csv.push_str(&format!(
            "{},{:.2},{},{},{}\n",
            1000 + i,
            attendance,
            6 + i % 7,
            gender,
            meal
        ));
    }
    csv
}

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        training: TrainingConfig {
            model_path: dir.join("model.json"),
            chart_path: dir.join("shap_top10.svg"),
            ..TrainingConfig::default()
        },
        ..PipelineConfig::default()
    }
}

#[test]
fn test_ranks_exactly_ten_features() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let report = Pipeline::new(config_in(dir.path())).run(district_upload().as_bytes(), "district.csv")?;

    assert_eq!(report.rows, 100);
    assert_eq!(report.positives, 15);
    assert!((report.scale_pos_weight - 85.0 / 15.0).abs() < 1e-12);
    assert_eq!(report.model.num_features(), 15);

    assert_eq!(report.ranking.len(), 10);
    assert!(report.ranking.iter().all(|a| a.score >= 0.0));
    assert!(report
        .ranking
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));

    let text = render_text(&report.ranking);
    assert!(text.starts_with(CHART_TITLE));
    assert_eq!(text.lines().count(), 11);

    Ok(())
}

#[test]
fn test_model_file_reloads() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path());
    let report = Pipeline::new(config.clone()).run(district_upload().as_bytes(), "district.csv")?;

    assert!(config.training.model_path.exists());
    assert!(config.training.chart_path.exists());

    let loaded = Model::load_json(&config.training.model_path)?;
    assert_eq!(loaded, report.model);
    assert_eq!(loaded.metadata.train_rows, 80);
    assert_eq!(loaded.metadata.holdout_rows, 20);
    assert!(loaded.metadata.metrics.contains_key("recall"));

    // Reloaded model explains the same upload identically
    let ranking = explain_upload(&loaded, district_upload().as_bytes(), "district.csv", 10)?;
    assert_eq!(ranking, report.ranking);

    Ok(())
}

#[test]
fn test_rerun_is_reproducible() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pipeline = Pipeline::new(config_in(dir.path()));

    let first = pipeline.run(district_upload().as_bytes(), "district.csv")?;
    let second = pipeline.run(district_upload().as_bytes(), "district.csv")?;

    assert_eq!(first.model.metadata.model_hash, second.model.metadata.model_hash);
    assert_eq!(first.ranking, second.ranking);
    Ok(())
}

#[test]
fn test_failure_leaves_model_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path());
    let pipeline = Pipeline::new(config.clone());
    pipeline.run(district_upload().as_bytes(), "district.csv")?;
    let before = std::fs::read(&config.training.model_path)?;

    // Schema failure
    let no_attendance = "Grade,Gender,Meal_Code\n9,F,Free\n10,M,Paid\n";
    let err = pipeline
        .run(no_attendance.as_bytes(), "bad.csv")
        .unwrap_err();
    assert!(matches!(err, PipelineError::Schema(_)));

    // Arithmetic failure: nobody at or below the threshold
    let all_present = "Attendance_Percentage,Grade,Gender,Meal_Code\n0.95,9,F,Free\n0.97,10,M,Paid\n";
    let err = pipeline
        .run(all_present.as_bytes(), "fine.csv")
        .unwrap_err();
    assert!(matches!(err, PipelineError::Arithmetic(_)));

    // Parse failure
    let err = pipeline.run("not a workbook".as_bytes(), "upload.xlsx").unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));

    assert_eq!(std::fs::read(&config.training.model_path)?, before);
    Ok(())
}

#[test]
fn test_mismatched_columns_are_incompatible() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let report = Pipeline::new(config_in(dir.path())).run(district_upload().as_bytes(), "district.csv")?;

    let with_extra = "Attendance_Percentage,Grade,Gender,Meal_Code,Bus_Route\n0.8,6,F,Free,4\n";
    let err = explain_upload(&report.model, with_extra.as_bytes(), "extra.csv", 10).unwrap_err();
    assert!(matches!(err, PipelineError::Compatibility(_)));

    Ok(())
}

#[test]
fn test_config_update_feeds_next_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let manager = ConfigManager::new(dir.path().join("config.yaml"));
    manager.init_default()?;
    manager.write(&HyperParamUpdate {
        learning_rate: Some(0.2),
        n_estimators: Some(20),
        ..HyperParamUpdate::default()
    })?;

    let mut config = manager.read()?;
    assert_eq!(config.xgboost.learning_rate, 0.2);
    config.training = config_in(dir.path()).training;

    let report = Pipeline::new(config).run(district_upload().as_bytes(), "district.csv")?;
    assert_eq!(report.model.params.learning_rate, 0.2);
    assert!(report.model.num_trees() <= 20);

    Ok(())
}
