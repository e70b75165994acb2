// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! * `engine` - graph lifecycle and request handling
//! * `step` - step init and per-event failures
//! * `queue` - publishing, consuming and redelivery
//! * `remote` - outbound calls and retries
//! * `validation` - graph build and config loading

use tracing::Span;

pub mod engine;
pub mod queue;
pub mod remote;
pub mod step;
pub mod validation;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog: std::fmt::Display {
    /// Emit the message at its level with its fields attached.
    fn log(&self);

    /// A span carrying the message's fields, for work that follows it.
    fn span(&self, name: &str) -> Span;
}
