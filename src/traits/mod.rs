// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod handler;
pub mod model;
pub mod queue;

pub use handler::{BodyFn, FnFactory, Handler, HandlerFactory, HandlerOutput, InitContext};
pub use model::{Model, ModelArtifact, ModelClass, ModelStore};
pub use queue::{Ack, Delivery, QueueBackend};
