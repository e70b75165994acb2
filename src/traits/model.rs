// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::StepError;

/// Where a model artifact landed locally, plus whatever the store knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub local_path: PathBuf,
    pub extra_metadata: Map<String, Value>,
}

/// The model object store the engine loads artifacts from.
///
/// Called once per model step, during `init`.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get_model(&self, suffix: &str) -> Result<ModelArtifact, StepError>;
}

/// A loaded model.
pub trait Model: Send + Sync {
    /// One output per input row.
    fn predict(&self, inputs: &[Value]) -> Result<Vec<Value>, StepError>;

    fn explain(&self, _inputs: &[Value]) -> Result<Value, StepError> {
        Err(StepError::Unsupported("explain".to_string()))
    }
}

/// Turns an artifact into a [`Model`]; registered by class name.
#[async_trait]
pub trait ModelClass: Send + Sync {
    async fn load(
        &self,
        artifact: &ModelArtifact,
        options: &Map<String, Value>,
    ) -> Result<Arc<dyn Model>, StepError>;
}
