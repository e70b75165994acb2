// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for queue publishing, consuming and redelivery.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// An event was appended to a queue partition.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct EventPublished<'a> {
    pub queue: &'a str,
    pub id: &'a str,
    pub partition: usize,
    pub offset: u64,
}

impl Display for EventPublished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Event {} published to '{}' partition {} at offset {}",
            self.id, self.queue, self.partition, self.offset
        )
    }
}

impl StructuredLog for EventPublished<'_> {
    fn log(&self) {
        tracing::debug!(
            queue = self.queue,
            id = self.id,
            partition = self.partition,
            offset = self.offset,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("event_published", span_name = name, queue = self.queue)
    }
}

/// A publish attempt failed and will be retried.
///
/// # Log Level
/// `warn!` - Recoverable problem
pub struct PublishRetry<'a> {
    pub queue: &'a str,
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a dyn std::error::Error,
}

impl Display for PublishRetry<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Publish to '{}' failed on attempt {}, retrying in {:?}: {}",
            self.queue, self.attempt, self.delay, self.error
        )
    }
}

impl StructuredLog for PublishRetry<'_> {
    fn log(&self) {
        tracing::warn!(
            queue = self.queue,
            attempt = self.attempt,
            delay_ms = self.delay.as_millis() as u64,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("publish_retry", span_name = name, queue = self.queue)
    }
}

/// Processing a delivered record failed and it goes back on the queue.
///
/// # Log Level
/// `warn!` - Recoverable problem
pub struct DeliveryRetry<'a> {
    pub queue: &'a str,
    pub offset: u64,
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a dyn std::error::Error,
}

impl Display for DeliveryRetry<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Record {} of '{}' failed on delivery {}, redelivering in {:?}: {}",
            self.offset, self.queue, self.attempt, self.delay, self.error
        )
    }
}

impl StructuredLog for DeliveryRetry<'_> {
    fn log(&self) {
        tracing::warn!(
            queue = self.queue,
            offset = self.offset,
            attempt = self.attempt,
            delay_ms = self.delay.as_millis() as u64,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "delivery_retry",
            span_name = name,
            queue = self.queue,
            offset = self.offset,
        )
    }
}

/// A record exhausted its retries and was committed without success.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct DeliveryAbandoned<'a> {
    pub queue: &'a str,
    pub offset: u64,
    pub attempts: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for DeliveryAbandoned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Record {} of '{}' abandoned after {} attempt(s): {}",
            self.offset, self.queue, self.attempts, self.error
        )
    }
}

impl StructuredLog for DeliveryAbandoned<'_> {
    fn log(&self) {
        tracing::error!(
            queue = self.queue,
            offset = self.offset,
            attempts = self.attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "delivery_abandoned",
            span_name = name,
            queue = self.queue,
            offset = self.offset,
        )
    }
}

/// A file-backed queue reopened its log.
///
/// # Log Level
/// `info!` - Important operational event
pub struct QueueRecovered<'a> {
    pub queue: &'a str,
    pub records: usize,
    pub pending: usize,
}

impl Display for QueueRecovered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Queue '{}' recovered {} record(s), {} pending",
            self.queue, self.records, self.pending
        )
    }
}

impl StructuredLog for QueueRecovered<'_> {
    fn log(&self) {
        tracing::info!(
            queue = self.queue,
            records = self.records,
            pending = self.pending,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("queue_recovered", span_name = name, queue = self.queue)
    }
}

/// A background consumer started or stopped.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct ConsumerStateChanged<'a> {
    pub queue: &'a str,
    pub running: bool,
}

impl Display for ConsumerStateChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let state = if self.running { "started" } else { "stopped" };
        write!(f, "Consumer for '{}' {}", self.queue, state)
    }
}

impl StructuredLog for ConsumerStateChanged<'_> {
    fn log(&self) {
        tracing::debug!(queue = self.queue, running = self.running, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("consumer", span_name = name, queue = self.queue)
    }
}
