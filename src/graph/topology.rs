// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// How a graph resolves an incoming event.
///
/// * `Router` - the model name in the path selects one route, no DAG walk
/// * `Flow` - the DAG is walked from a synthetic start node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Router,
    Flow,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Router => "router",
            Topology::Flow => "flow",
        }
    }
}

/// Position of a request path relative to the routing prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePath {
    /// Model or route name, `None` when the path stops at the prefix
    pub key: Option<String>,
    /// Remaining segments joined with `/`, `None` when absent
    pub action: Option<String>,
}

/// Split `/{prefix}/{key}/{action...}` into its key and action.
///
/// Paths that do not start with the prefix are read as `/{key}/{action...}`.
///
/// ```
/// use serving_graph::graph::parse_route_path;
///
/// let route = parse_route_path("/v2/models/model1/infer", "v2/models");
/// assert_eq!(route.key.as_deref(), Some("model1"));
/// assert_eq!(route.action.as_deref(), Some("infer"));
/// ```
pub fn parse_route_path(path: &str, prefix: &str) -> RoutePath {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let prefix_segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();

    let rest = if segments.starts_with(&prefix_segments) {
        &segments[prefix_segments.len()..]
    } else {
        &segments[..]
    };

    RoutePath {
        key: rest.first().map(|s| s.to_string()),
        action: if rest.len() > 1 {
            Some(rest[1..].join("/"))
        } else {
            None
        },
    }
}
