// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structured logging for the serving graph.
//!
//! Every diagnostic the engine emits is a message struct with a `Display`
//! impl and a [`messages::StructuredLog`] impl, so log text lives in one place
//! and the same event always carries the same fields.
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - graph lifecycle and request handling
//! * `messages::step` - step init and per-event failures
//! * `messages::queue` - publishing, consuming and redelivery
//! * `messages::remote` - outbound calls and retries
//! * `messages::validation` - graph build and config loading
//!
//! # Usage
//!
//! ```rust
//! use serving_graph::observability::messages::{step::StepInitCompleted, StructuredLog};
//! use std::time::Duration;
//!
//! StepInitCompleted {
//!     step: "model1",
//!     duration: Duration::from_millis(12),
//! }
//! .log();
//! ```

pub mod messages;
