// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use serving_graph::backends::local::HandlerRegistry;
use serving_graph::config::{config_dir, load_and_validate_config, RuntimeBuilder};
use serving_graph::event::{Event, Response};
use serving_graph::graph::Graph;
use serving_graph::server::{http, GraphServer, ServeOptions};
use serving_graph::simulation::LocalSimulation;

#[derive(Parser)]
#[command(name = "serving-graph", version, about = "Serve and simulate serving graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a graph over HTTP
    Serve {
        /// Graph definition (.yaml, .yml or .toml)
        config: PathBuf,
        #[arg(long, env = "SERVING_GRAPH_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        /// Run child functions in-process instead of calling their urls
        #[arg(long)]
        local: bool,
    },
    /// Send one event through a graph and print the response
    Invoke {
        config: PathBuf,
        /// Request path, e.g. /v2/models/model1/infer
        path: String,
        /// JSON body; anything that does not parse is sent as a string
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        method: Option<String>,
        /// Use the local simulation harness
        #[arg(long)]
        local: bool,
    },
    /// Check a graph definition and report every problem found
    Validate { config: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            config,
            addr,
            local,
        } => serve(&config, addr, local).await,
        Commands::Invoke {
            config,
            path,
            body,
            method,
            local,
        } => invoke(&config, path, body, method, local).await,
        Commands::Validate { config } => validate(&config),
    }
}

fn load_graph(config: &Path) -> anyhow::Result<Graph> {
    RuntimeBuilder::from_path(config, HandlerRegistry::with_builtins())
        .with_context(|| format!("failed to build graph from {}", config.display()))
}

fn serve_options(config: &Path, local: bool) -> ServeOptions {
    ServeOptions {
        all_functions_local: local,
        base_dir: Some(config_dir(config).to_path_buf()),
        invoker: None,
    }
}

async fn serve(config: &Path, addr: SocketAddr, local: bool) -> anyhow::Result<ExitCode> {
    let graph = load_graph(config)?;
    let server = GraphServer::start(graph, serve_options(config, local)).await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Listening on {}", addr);

    http::serve(Arc::new(server), listener, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(ExitCode::SUCCESS)
}

async fn invoke(
    config: &Path,
    path: String,
    body: Option<String>,
    method: Option<String>,
    local: bool,
) -> anyhow::Result<ExitCode> {
    let body = match body {
        Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        None => Value::Null,
    };
    let mut event = Event::new(path, body);
    if let Some(method) = method {
        event = event.with_method(method);
    }

    let graph = load_graph(config)?;
    let response = if local {
        let sim = LocalSimulation::with_options(graph, serve_options(config, true)).await?;
        sim.run(event).await
    } else {
        let server = GraphServer::start(graph, serve_options(config, false)).await?;
        let response = server.invoke(event).await;
        server.shutdown().await;
        response
    };
    print_response(&response)?;

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn validate(config: &Path) -> anyhow::Result<ExitCode> {
    match load_and_validate_config(config) {
        Ok(cfg) => {
            println!("{}: valid ({} steps)", cfg.name, cfg.step_count());
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            println!("{}: {}", config.display(), error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_response(response: &Response) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
