// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::QueueError;
use crate::event::Event;

/// Broker acknowledgement of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub partition: usize,
    pub offset: u64,
}

/// One record handed to a consumer. Must be acked, or nacked for redelivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub key: String,
    pub partition: usize,
    pub offset: u64,
    /// How many times this record has been delivered, starting at 1
    pub attempt: u32,
    pub event: Event,
}

/// Append-only partitioned log used by queue steps.
///
/// Delivery is at-least-once and FIFO per partition key: a record is
/// redelivered until acked, and records sharing a key land in the same
/// partition.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, key: &str, event: &Event) -> Result<Ack, QueueError>;

    /// Wait for the next record.
    async fn consume(&self) -> Result<Delivery, QueueError>;

    /// Next record if one is ready, without waiting.
    async fn try_consume(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Put the record back at the head of its partition.
    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Records published and not yet acked.
    async fn pending(&self) -> usize;

    /// Refuse further publishes and wake any waiting consumer.
    async fn close(&self);
}
