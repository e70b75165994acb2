// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;      // registered handlers and model classes
pub mod config;        // graph definitions + runtime builder
pub mod engine;        // step arena, resolvers, queue consumers
pub mod errors;        // error handling
pub mod event;
pub mod graph;         // builder and frozen graph
pub mod observability;
pub mod queue;         // in-memory and file-backed logs
pub mod remote;        // outbound calls with retry
pub mod server;        // entry point + HTTP adapter
pub mod simulation;
pub mod traits;        // unified abstractions
