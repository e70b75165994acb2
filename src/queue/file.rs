// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Durable queue backed by two append-only files in one directory.
//!
//! `records.jsonl` holds one JSON line per published record with the event
//! bytes base64 encoded. `committed.jsonl` holds one acked offset per line.
//! Reopening the directory redelivers every record that was never committed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};

use super::log::{PartitionLog, Record};
use crate::errors::QueueError;
use crate::event::Event;
use crate::observability::messages::queue::QueueRecovered;
use crate::observability::messages::StructuredLog;
use crate::traits::{Ack, Delivery, QueueBackend};

const RECORDS_FILE: &str = "records.jsonl";
const COMMITTED_FILE: &str = "committed.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    offset: u64,
    partition: usize,
    key: String,
    data: String,
}

#[derive(Debug)]
struct FileState {
    log: PartitionLog,
    records: File,
    committed: File,
}

#[derive(Debug)]
pub struct FileQueue {
    name: String,
    state: Mutex<FileState>,
    notify: Notify,
    closed: AtomicBool,
}

impl FileQueue {
    /// Open or create the queue directory, recovering uncommitted records.
    pub async fn open(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        partitions: usize,
    ) -> Result<Self, QueueError> {
        let name = name.into();
        let dir = dir.into();
        let io_err = |e: std::io::Error| QueueError::Consume {
            queue: name.clone(),
            message: format!("{}: {}", dir.display(), e),
        };

        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;

        let stored = read_records(&name, &dir.join(RECORDS_FILE)).await?;
        let committed = read_committed(&name, &dir.join(COMMITTED_FILE)).await?;

        let mut log = PartitionLog::new(partitions);
        let total = stored.len();
        for record in stored {
            if committed.contains(&record.offset) {
                log.skip(record.offset);
            } else {
                log.push(record);
            }
        }

        QueueRecovered {
            queue: &name,
            records: total,
            pending: log.pending(),
        }
        .log();

        let records = open_append(&dir.join(RECORDS_FILE)).await.map_err(io_err)?;
        let committed = open_append(&dir.join(COMMITTED_FILE)).await.map_err(io_err)?;

        Ok(Self {
            name,
            state: Mutex::new(FileState {
                log,
                records,
                committed,
            }),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn publish_err(&self, message: impl std::fmt::Display) -> QueueError {
        QueueError::Publish {
            queue: self.name.clone(),
            message: message.to_string(),
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn read_lines(queue: &str, path: &Path) -> Result<Vec<String>, QueueError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(QueueError::Consume {
            queue: queue.to_string(),
            message: format!("{}: {}", path.display(), e),
        }),
    }
}

async fn read_records(queue: &str, path: &Path) -> Result<Vec<Record>, QueueError> {
    let codec_err = |message: String| QueueError::Codec {
        queue: queue.to_string(),
        message,
    };
    let mut records = Vec::new();
    for line in read_lines(queue, path).await? {
        let stored: StoredRecord =
            serde_json::from_str(&line).map_err(|e| codec_err(e.to_string()))?;
        let bytes = STANDARD
            .decode(stored.data.as_bytes())
            .map_err(|e| codec_err(e.to_string()))?;
        let event = Event::from_bytes(&bytes).map_err(|e| codec_err(e.to_string()))?;
        records.push(Record {
            offset: stored.offset,
            partition: stored.partition,
            key: stored.key,
            attempt: 0,
            event,
        });
    }
    records.sort_by_key(|r| r.offset);
    Ok(records)
}

async fn read_committed(queue: &str, path: &Path) -> Result<HashSet<u64>, QueueError> {
    read_lines(queue, path)
        .await?
        .iter()
        .map(|line| {
            line.trim().parse::<u64>().map_err(|e| QueueError::Codec {
                queue: queue.to_string(),
                message: format!("bad committed offset '{}': {}", line, e),
            })
        })
        .collect()
}

#[async_trait]
impl QueueBackend for FileQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, key: &str, event: &Event) -> Result<Ack, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed(self.name.clone()));
        }
        let bytes = event.to_bytes().map_err(|e| QueueError::Codec {
            queue: self.name.clone(),
            message: e.to_string(),
        })?;

        let ack = {
            let mut state = self.state.lock().await;
            let ack = state.log.assign(key);
            let stored = StoredRecord {
                offset: ack.offset,
                partition: ack.partition,
                key: key.to_string(),
                data: STANDARD.encode(&bytes),
            };
            let mut line = serde_json::to_vec(&stored).map_err(|e| self.publish_err(e))?;
            line.push(b'\n');
            state
                .records
                .write_all(&line)
                .await
                .map_err(|e| self.publish_err(e))?;
            state.records.flush().await.map_err(|e| self.publish_err(e))?;

            state.log.push(Record {
                offset: ack.offset,
                partition: ack.partition,
                key: key.to_string(),
                attempt: 0,
                event: event.clone(),
            });
            ack
        };
        self.notify.notify_one();
        Ok(ack)
    }

    async fn consume(&self) -> Result<Delivery, QueueError> {
        loop {
            if let Some(delivery) = self.try_consume().await? {
                return Ok(delivery);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(QueueError::Closed(self.name.clone()));
            }
            self.notify.notified().await;
        }
    }

    async fn try_consume(&self) -> Result<Option<Delivery>, QueueError> {
        Ok(self.state.lock().await.log.take())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            state.log.ack(&self.name, delivery)?;
            let line = format!("{}\n", delivery.offset);
            let commit_err = |e: std::io::Error| QueueError::Consume {
                queue: self.name.clone(),
                message: format!("failed to commit offset {}: {}", delivery.offset, e),
            };
            state
                .committed
                .write_all(line.as_bytes())
                .await
                .map_err(commit_err)?;
            state.committed.flush().await.map_err(commit_err)?;
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().await.log.nack(&self.name, delivery)?;
        self.notify.notify_one();
        Ok(())
    }

    async fn pending(&self) -> usize {
        self.state.lock().await.log.pending()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}
