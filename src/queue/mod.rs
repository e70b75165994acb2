// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Queue backends for queue steps.
//!
//! Both backends implement [`QueueBackend`] and are interchangeable: a queue
//! step picks one with `transport: memory` (the default) or `transport: file`.

pub mod file;
mod log;
pub mod memory;

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::errors::QueueError;
use crate::event::Event;
use crate::graph::{QueueSpec, QueueTransport};
use crate::traits::QueueBackend;

pub use file::FileQueue;
pub use log::partition_for;
pub use memory::MemoryQueue;

/// Open the backend a queue step asks for. Relative file paths resolve
/// against `base_dir`.
pub async fn open_queue(
    name: &str,
    spec: &QueueSpec,
    base_dir: &Path,
) -> Result<Arc<dyn QueueBackend>, QueueError> {
    match spec.transport {
        QueueTransport::Memory => Ok(Arc::new(MemoryQueue::new(name, spec.partitions))),
        QueueTransport::File => {
            let path = spec.path.as_ref().ok_or_else(|| QueueError::Publish {
                queue: name.to_string(),
                message: "file transport needs a path".to_string(),
            })?;
            let dir = if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            };
            Ok(Arc::new(FileQueue::open(name, dir, spec.partitions).await?))
        }
    }
}

/// Partition key of `event`: the configured body field when present,
/// the correlation id otherwise.
pub fn partition_key(spec: &QueueSpec, event: &Event) -> String {
    spec.partition_key
        .as_deref()
        .and_then(|field| event.body.get(field))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| event.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partition_key_prefers_body_field() {
        let spec = QueueSpec {
            partition_key: Some("customer".to_string()),
            ..QueueSpec::default()
        };
        let event = Event::new("/", json!({"customer": "c-9"}));
        assert_eq!(partition_key(&spec, &event), "c-9");

        let numeric = Event::new("/", json!({"customer": 42}));
        assert_eq!(partition_key(&spec, &numeric), "42");

        let missing = Event::new("/", json!({}));
        assert_eq!(partition_key(&spec, &missing), missing.id);
    }

    #[tokio::test]
    async fn file_transport_resolves_relative_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = QueueSpec {
            transport: QueueTransport::File,
            path: Some("spool".into()),
            ..QueueSpec::default()
        };
        let queue = open_queue("q", &spec, dir.path()).await.unwrap();
        queue
            .publish("k", &Event::new("/", json!(1)))
            .await
            .unwrap();
        assert!(dir.path().join("spool").join("records.jsonl").exists());
    }
}
