// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod factory;
pub mod handlers;
pub mod model_server;
pub mod models;

pub use factory::HandlerRegistry;
pub use handlers::{AugmentHandler, IdentityHandler};
pub use model_server::{ModelHandle, ModelServer};
pub use models::{LinearModel, LinearModelClass, LocalModelStore};
