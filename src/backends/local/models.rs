// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Filesystem model store and the built-in `linear` model class.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::StepError;
use crate::traits::{Model, ModelArtifact, ModelClass, ModelStore};

const METADATA_SUFFIX: &str = ".meta.json";

/// Model store rooted at a local directory.
///
/// Relative model paths resolve against the root, absolute ones are used as
/// given. A `<model>.meta.json` file next to the artifact, when present,
/// becomes the artifact's extra metadata.
#[derive(Debug, Clone)]
pub struct LocalModelStore {
    root: PathBuf,
}

impl LocalModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, suffix: &str) -> PathBuf {
        let path = Path::new(suffix);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl ModelStore for LocalModelStore {
    async fn get_model(&self, suffix: &str) -> Result<ModelArtifact, StepError> {
        let local_path = self.resolve(suffix);
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| StepError::ModelLoad {
                path: local_path.display().to_string(),
                message: e.to_string(),
            })?;
        if !metadata.is_file() {
            return Err(StepError::ModelLoad {
                path: local_path.display().to_string(),
                message: "not a file".to_string(),
            });
        }

        let mut sidecar = local_path.clone().into_os_string();
        sidecar.push(METADATA_SUFFIX);
        let extra_metadata = match tokio::fs::read(PathBuf::from(sidecar)).await {
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).map_err(|e| {
                StepError::ModelLoad {
                    path: local_path.display().to_string(),
                    message: format!("invalid metadata: {}", e),
                }
            })?,
            Err(_) => Map::new(),
        };

        Ok(ModelArtifact {
            local_path,
            extra_metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LinearWeights {
    weights: Vec<f64>,
    #[serde(default)]
    bias: f64,
}

/// Dot product plus bias over numeric input rows.
///
/// With a `threshold` the model classifies: each row scores 1 when
/// `bias + w.x >= threshold`, 0 otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    weights: Vec<f64>,
    bias: f64,
    threshold: Option<f64>,
}

impl LinearModel {
    pub fn new(weights: Vec<f64>, bias: f64, threshold: Option<f64>) -> Self {
        Self {
            weights,
            bias,
            threshold,
        }
    }

    fn score(&self, row: &Value) -> Result<f64, StepError> {
        let features = row
            .as_array()
            .ok_or_else(|| StepError::BadRequest("each input must be an array".to_string()))?;
        if features.len() != self.weights.len() {
            return Err(StepError::BadRequest(format!(
                "expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        features
            .iter()
            .zip(&self.weights)
            .try_fold(self.bias, |acc, (feature, weight)| {
                feature
                    .as_f64()
                    .map(|x| acc + x * weight)
                    .ok_or_else(|| StepError::BadRequest("features must be numbers".to_string()))
            })
    }
}

impl Model for LinearModel {
    fn predict(&self, inputs: &[Value]) -> Result<Vec<Value>, StepError> {
        inputs
            .iter()
            .map(|row| {
                let score = self.score(row)?;
                Ok(match self.threshold {
                    Some(t) if score >= t => json!(1),
                    Some(_) => json!(0),
                    None => json!(score),
                })
            })
            .collect()
    }

    /// Per-feature contributions `w_i * x_i` for each row.
    fn explain(&self, inputs: &[Value]) -> Result<Value, StepError> {
        let rows = inputs
            .iter()
            .map(|row| {
                self.score(row)?;
                let contributions: Vec<f64> = row
                    .as_array()
                    .map(|features| {
                        features
                            .iter()
                            .zip(&self.weights)
                            .map(|(x, w)| x.as_f64().unwrap_or_default() * w)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({ "bias": self.bias, "contributions": contributions }))
            })
            .collect::<Result<Vec<_>, StepError>>()?;
        Ok(Value::Array(rows))
    }
}

/// Loads `{"weights": [...], "bias": b}` JSON artifacts.
///
/// Step option `threshold` turns the regressor into a binary classifier.
pub struct LinearModelClass;

#[async_trait]
impl ModelClass for LinearModelClass {
    async fn load(
        &self,
        artifact: &ModelArtifact,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn Model>, StepError> {
        let path = artifact.local_path.display().to_string();
        let bytes = tokio::fs::read(&artifact.local_path)
            .await
            .map_err(|e| StepError::ModelLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let parsed: LinearWeights =
            serde_json::from_slice(&bytes).map_err(|e| StepError::ModelLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if parsed.weights.is_empty() {
            return Err(StepError::ModelLoad {
                path,
                message: "weights must not be empty".to_string(),
            });
        }
        let threshold = options.get("threshold").and_then(Value::as_f64);
        Ok(Arc::new(LinearModel::new(
            parsed.weights,
            parsed.bias,
            threshold,
        )))
    }
}
