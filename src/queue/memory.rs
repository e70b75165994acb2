// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};

use super::log::{PartitionLog, Record};
use crate::errors::QueueError;
use crate::event::Event;
use crate::traits::{Ack, Delivery, QueueBackend};

/// Channel-style queue living in process memory.
///
/// Events are cloned in and out, so producer and consumer never share one.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    log: Mutex<PartitionLog>,
    notify: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, partitions: usize) -> Self {
        Self {
            name: name.into(),
            log: Mutex::new(PartitionLog::new(partitions)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, key: &str, event: &Event) -> Result<Ack, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed(self.name.clone()));
        }
        let ack = {
            let mut log = self.log.lock().await;
            let ack = log.assign(key);
            log.push(Record {
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
        Ok(self.log.lock().await.take())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.log.lock().await.ack(&self.name, delivery)?;
        self.notify.notify_one();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.log.lock().await.nack(&self.name, delivery)?;
        self.notify.notify_one();
        Ok(())
    }

    async fn pending(&self) -> usize {
        self.log.lock().await.pending()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}
