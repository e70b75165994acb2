// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod build;
mod config;
mod execution;
mod step;

pub use build::BuildError;
pub use config::{ConfigError, ValidationError};
pub use execution::ExecutionError;
pub use step::{QueueError, RemoteError, StepError};
