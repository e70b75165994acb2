// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outbound calls for remote steps: the HTTP invoker and its retry policy.

pub mod invoker;
pub mod retry;

pub use invoker::{invoke_with_retry, HttpInvoker, Invoker, RemoteTarget};
pub use retry::RetryPolicy;
