// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Handler backends for task steps.
//!
//! ## Local Backend
//! In-process handlers and model serving:
//! - **Built-ins**: `identity`, `augment`
//! - **Model serving**: V2 protocol handler over any registered model class,
//!   with the `linear` class built in
//! - **Registry**: [`local::HandlerRegistry`] resolves the handler names used
//!   in graph definitions
//!
//! ## Stub Backend (Test-Only)
//! Handlers that fail, panic, sleep, count or record, for executor tests.
//!
//! # Examples
//!
//! ```rust
//! use serving_graph::backends::local::HandlerRegistry;
//! use serving_graph::traits::{BodyFn, Handler};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut registry = HandlerRegistry::with_builtins();
//! registry.register_fn("double", |_ctx| {
//!     Ok(Arc::new(BodyFn::new("double", |body| {
//!         Ok(json!(body.as_i64().unwrap_or_default() * 2))
//!     })) as Arc<dyn Handler>)
//! });
//! assert!(registry.has_handler("double"));
//! ```

pub mod local;
#[cfg(test)]
pub mod stub;
