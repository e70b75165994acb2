// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod runtime;
pub(crate) mod validation;

#[cfg(test)]
mod integration_tests;
pub mod consts;

pub use loader::{
    config_dir, load_and_validate_config, load_and_validate_config_with, load_config,
    ChildFunctionConfig, ExecutorOptions, GraphConfig, ModelStoreConfig,
};
pub use runtime::RuntimeBuilder;
pub use validation::{validate_graph, GraphLayout};
