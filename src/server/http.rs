// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! axum adapter: every request, whatever its path, becomes an [`Event`] for
//! the graph and every [`Response`] becomes a JSON reply.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response as HttpResponse},
    Json, Router,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::consts::CORRELATION_ID_HEADER;
use crate::event::{Event, Response};
use crate::server::GraphServer;

/// Router sending every path to `server`.
pub fn router(server: Arc<GraphServer>) -> Router {
    Router::new().fallback(handle).with_state(server)
}

/// Serve `server` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    server: Arc<GraphServer>,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn handle(
    State(server): State<Arc<GraphServer>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let event = to_event(&method, &uri, &headers, &body);
    into_http(server.invoke(event).await)
}

/// Build the event for one HTTP request.
///
/// JSON bodies are parsed, anything else is kept as a string and an empty body
/// is null. The correlation header, when present, becomes the event id.
pub fn to_event(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Event {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    };

    let mut event = Event::new(uri.path(), body).with_method(method.as_str());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            event = event.with_header(name.as_str(), value);
        }
    }
    if let Some(id) = event.headers.get(CORRELATION_ID_HEADER).cloned() {
        event = event.with_id(id);
    }
    event
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut reply = (status, Json(response.body)).into_response();
    if let Ok(id) = HeaderValue::from_str(&response.id) {
        reply.headers_mut().insert(CORRELATION_ID_HEADER, id);
    }
    reply
}
