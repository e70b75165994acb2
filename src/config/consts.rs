// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Path prefix in front of the model name: `/v2/models/{name}/{action}`
pub const DEFAULT_ROUTING_PREFIX: &str = "v2/models";
/// Name of the root router step created for router topology graphs
pub const DEFAULT_ROUTER_NAME: &str = "router";
/// Reserved header carrying the correlation id across remote hops
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
/// Action used when the path carries none
pub const DEFAULT_ACTION: &str = "infer";

/// Attempts made for a remote call or queue publish, first attempt included
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Per-call timeout for remote invocations
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;
/// Partitions of a queue when none are configured
pub const DEFAULT_QUEUE_PARTITIONS: usize = 1;
