//! Hyperparameter configuration backed by a YAML file
//!
//! The file carries a `models.xgboost` section with the classifier's
//! hyperparameters and an optional `training` section. Writes merge into
//! `models.xgboost` only and leave every other key as it was.

use crate::errors::{PipelineError, Result};
use crate::serde_canon::write_atomic;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// `HyperParams` keys that are omitted from the file when unset
const OPTIONAL_KEYS: &[&str] = &["early_stopping_rounds"];

/// Positive-class weight: a fixed ratio or derived from the labels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScalePosWeight {
    /// Negatives / positives of the training labels
    #[default]
    Auto,
    Ratio(f64),
}

impl fmt::Display for ScalePosWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalePosWeight::Auto => write!(f, "auto"),
            ScalePosWeight::Ratio(r) => write!(f, "{}", r),
        }
    }
}

impl std::str::FromStr for ScalePosWeight {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(ScalePosWeight::Auto);
        }
        trimmed
            .parse::<f64>()
            .map(ScalePosWeight::Ratio)
            .map_err(|_| format!("expected \"auto\" or a number, got '{}'", s))
    }
}

impl Serialize for ScalePosWeight {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScalePosWeight::Auto => serializer.serialize_str("auto"),
            ScalePosWeight::Ratio(r) => serializer.serialize_f64(*r),
        }
    }
}

impl<'de> Deserialize<'de> for ScalePosWeight {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(ScalePosWeight::Ratio(n)),
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

fn default_n_estimators() -> usize {
    100
}

fn default_min_child_weight() -> f64 {
    1.0
}

fn default_reg_lambda() -> f64 {
    1.0
}

/// Hyperparameters of the boosted-tree classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Shrinkage applied to every leaf
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Positive-class weight
    pub scale_pos_weight: ScalePosWeight,
    /// Number of boosting rounds
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Minimum hessian sum in a child
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights
    #[serde(default = "default_reg_lambda")]
    pub reg_lambda: f64,
    /// Minimum gain to keep a split
    #[serde(default)]
    pub gamma: f64,
    /// Stop after this many rounds without held-out improvement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stopping_rounds: Option<usize>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_depth: 6,
            scale_pos_weight: ScalePosWeight::Auto,
            n_estimators: default_n_estimators(),
            min_child_weight: default_min_child_weight(),
            reg_lambda: default_reg_lambda(),
            gamma: 0.0,
            early_stopping_rounds: None,
        }
    }
}

impl HyperParams {
    /// Check ranges; the first violation is reported
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| -> Result<()> { Err(PipelineError::Config(msg)) };

        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return bad(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        if !(1..=16).contains(&self.max_depth) {
            return bad(format!("max_depth must be in 1..=16, got {}", self.max_depth));
        }
        if let ScalePosWeight::Ratio(r) = self.scale_pos_weight {
            if !(r.is_finite() && r > 0.0) {
                return bad(format!("scale_pos_weight must be \"auto\" or > 0, got {}", r));
            }
        }
        if self.n_estimators == 0 {
            return bad("n_estimators must be at least 1".to_string());
        }
        if !(self.min_child_weight >= 0.0) {
            return bad(format!(
                "min_child_weight must be >= 0, got {}",
                self.min_child_weight
            ));
        }
        if !(self.reg_lambda >= 0.0) {
            return bad(format!("reg_lambda must be >= 0, got {}", self.reg_lambda));
        }
        if !(self.gamma >= 0.0) {
            return bad(format!("gamma must be >= 0, got {}", self.gamma));
        }
        if self.early_stopping_rounds == Some(0) {
            return bad("early_stopping_rounds must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Partial update merged into `models.xgboost`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HyperParamUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_pos_weight: Option<ScalePosWeight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_estimators: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_child_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg_lambda: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stopping_rounds: Option<usize>,
}

impl HyperParamUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run settings outside the classifier itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed of the train/held-out partition
    pub seed: u64,
    /// Fixed location of the model artifact
    pub model_path: PathBuf,
    /// Where the attribution chart is written
    pub chart_path: PathBuf,
    /// Number of features in the attribution ranking
    pub top_k: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            model_path: PathBuf::from("model.json"),
            chart_path: PathBuf::from("shap_top10.svg"),
            top_k: 10,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.top_k == 0 {
            return Err(PipelineError::Config("top_k must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Snapshot of the persisted configuration used for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub xgboost: HyperParams,
    pub training: TrainingConfig,
}

/// Reads and writes the YAML config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the persisted configuration
    pub fn read(&self) -> Result<PipelineConfig> {
        let document = self.load_document()?;
        let config = Self::parse(&document)?;
        debug!("Configuration read from {}", self.path.display());
        Ok(config)
    }

    /// Merge `update` into `models.xgboost` and write the file back.
    ///
    /// The merged result is validated before anything is written, so a
    /// rejected update leaves the file untouched.
    pub fn write(&self, update: &HyperParamUpdate) -> Result<PipelineConfig> {
        let updates = serde_yaml::to_value(update)
            .map_err(|e| PipelineError::Config(format!("Failed to encode update: {}", e)))?;
        self.merge_and_store(updates, &[])
    }

    /// Persist a complete set of hyperparameters (explicit save).
    ///
    /// Unset optional parameters are removed from the file so that a later
    /// `read` returns exactly `params`.
    pub fn save(&self, params: &HyperParams) -> Result<()> {
        params.validate()?;
        let values = serde_yaml::to_value(params)
            .map_err(|e| PipelineError::Config(format!("Failed to encode parameters: {}", e)))?;
        let cleared: Vec<&str> = OPTIONAL_KEYS
            .iter()
            .copied()
            .filter(|key| values.get(*key).is_none())
            .collect();
        self.merge_and_store(values, &cleared)?;
        Ok(())
    }

    /// Create the config file with default values. Refuses to overwrite.
    pub fn init_default(&self) -> Result<()> {
        if self.path.exists() {
            return Err(PipelineError::Config(format!(
                "{} already exists",
                self.path.display()
            )));
        }
        let defaults = PipelineConfig::default();
        let mut models = Mapping::new();
        models.insert(Value::from("xgboost"), Self::to_yaml(&defaults.xgboost)?);
        let mut root = Mapping::new();
        root.insert(Value::from("models"), Value::Mapping(models));
        root.insert(Value::from("training"), Self::to_yaml(&defaults.training)?);

        self.store(&Value::Mapping(root))?;
        info!("Default configuration written to {}", self.path.display());
        Ok(())
    }

    fn merge_and_store(&self, updates: Value, cleared: &[&str]) -> Result<PipelineConfig> {
        let mut document = self.load_document()?;

        let section = document
            .get_mut("models")
            .and_then(|models| models.get_mut("xgboost"))
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| self.malformed("missing 'models.xgboost' section"))?;

        for key in cleared {
            section.remove(*key);
        }
        if let Value::Mapping(entries) = updates {
            for (key, value) in entries {
                section.insert(key, value);
            }
        }

        let merged = Self::parse(&document)?;
        self.store(&document)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(merged)
    }

    fn load_document(&self) -> Result<Value> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&content).map_err(|e| self.malformed(&e.to_string()))
    }

    fn parse(document: &Value) -> Result<PipelineConfig> {
        let section = document
            .get("models")
            .and_then(|models| models.get("xgboost"))
            .ok_or_else(|| PipelineError::Config("missing 'models.xgboost' section".to_string()))?;

        let xgboost: HyperParams = serde_yaml::from_value(section.clone())
            .map_err(|e| PipelineError::Config(format!("invalid 'models.xgboost': {}", e)))?;
        xgboost.validate()?;

        let training = match document.get("training") {
            Some(value) if !value.is_null() => serde_yaml::from_value(value.clone())
                .map_err(|e| PipelineError::Config(format!("invalid 'training': {}", e)))?,
            _ => TrainingConfig::default(),
        };
        training.validate()?;

        Ok(PipelineConfig { xgboost, training })
    }

    fn store(&self, document: &Value) -> Result<()> {
        let content = serde_yaml::to_string(document)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }

    fn to_yaml<T: Serialize>(value: &T) -> Result<Value> {
        serde_yaml::to_value(value)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))
    }

    fn malformed(&self, detail: &str) -> PipelineError {
        PipelineError::Config(format!(
            "Malformed config file {}: {}",
            self.path.display(),
            detail
        ))
    }
}
