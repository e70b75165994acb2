// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Consumer side of queue steps.
//!
//! A delivered event walks the successors of its queue step. Success acks the
//! record; a failure nacks it for redelivery until the retry policy runs out,
//! after which the failure is routed like a request failure and the record is
//! acked so the partition moves on.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::runtime::{select_result, GraphRuntime};
use crate::errors::{ExecutionError, QueueError, StepError};
use crate::observability::messages::queue::{
    ConsumerStateChanged, DeliveryAbandoned, DeliveryRetry,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{Delivery, QueueBackend};

const CONSUMER_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Run the successors of `queue` for one delivery and settle it.
///
/// The outbox of a fire-and-forget remote step makes its call instead.
pub(crate) async fn process_delivery(
    runtime: &GraphRuntime,
    queue: &str,
    backend: &dyn QueueBackend,
    delivery: Delivery,
    cancel: &CancellationToken,
) -> Result<(), QueueError> {
    let (result, policy) = match runtime.outbox(queue) {
        Some(outbox) => {
            let result = outbox
                .deliver(&delivery.event, cancel)
                .await
                .map_err(|error| (queue.to_string(), error, delivery.event.clone()));
            (result, outbox.retry().clone())
        }
        None => {
            let Some(spec) = runtime.graph().step(queue) else {
                return backend.ack(&delivery).await;
            };
            let terminals = runtime
                .walk_all(&spec.to, delivery.event.clone(), cancel, None)
                .await;
            (select_result(terminals).map(|_| ()), runtime.graph().retry_for(spec))
        }
    };
    let (step, error, event) = match result {
        Ok(()) => return backend.ack(&delivery).await,
        Err(failure) => failure,
    };

    if delivery.attempt < policy.attempts() && is_retryable(&error) && !cancel.is_cancelled() {
        let delay = policy.delay_for(delivery.attempt);
        DeliveryRetry {
            queue,
            offset: delivery.offset,
            attempt: delivery.attempt,
            delay,
            error: &error,
        }
        .log();
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        return backend.nack(&delivery).await;
    }

    DeliveryAbandoned {
        queue,
        offset: delivery.offset,
        attempts: delivery.attempt,
        error: &error,
    }
    .log();
    // failures of the error stream's own consumers are not fed back into it
    if runtime.graph().error_stream() != Some(queue) {
        let error = ExecutionError::from_step(&step, error);
        runtime.route_failure(&step, &error, &event).await;
    }
    backend.ack(&delivery).await
}

/// Remote endpoints that answered with an error status get the same answer
/// on redelivery.
fn is_retryable(error: &StepError) -> bool {
    match error {
        StepError::Remote(error) => error.is_retryable(),
        _ => true,
    }
}

/// Process every ready record of every queue, including the queues of local
/// child functions, until nothing is left.
pub(crate) fn drain(runtime: &GraphRuntime) -> BoxFuture<'_, Result<(), QueueError>> {
    async move {
        let cancel = CancellationToken::new();
        loop {
            let mut progressed = false;
            for (name, backend) in runtime.queues() {
                while let Some(delivery) = backend.try_consume().await? {
                    progressed = true;
                    process_delivery(runtime, name, backend.as_ref(), delivery, &cancel).await?;
                }
            }
            for child in runtime.children() {
                drain(child).await?;
            }
            if !progressed {
                return Ok(());
            }
        }
    }
    .boxed()
}

/// Start one background consumer per queue. They stop when the runtime's
/// shutdown token is cancelled or their queue is closed.
pub(crate) fn spawn_consumers(runtime: &Arc<GraphRuntime>) -> Vec<JoinHandle<()>> {
    let mut handles: Vec<JoinHandle<()>> = runtime
        .queues()
        .iter()
        .map(|(name, backend)| {
            tokio::spawn(consume_loop(
                runtime.clone(),
                name.clone(),
                backend.clone(),
            ))
        })
        .collect();
    for child in runtime.children() {
        handles.extend(spawn_consumers(child));
    }
    handles
}

async fn consume_loop(runtime: Arc<GraphRuntime>, queue: String, backend: Arc<dyn QueueBackend>) {
    let shutdown = runtime.shutdown_token().clone();
    ConsumerStateChanged {
        queue: &queue,
        running: true,
    }
    .log();

    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = backend.consume() => match next {
                Ok(delivery) => delivery,
                Err(QueueError::Closed(_)) => break,
                Err(error) => {
                    tracing::warn!(queue = %queue, error = %error, "Queue '{}' consume failed: {}", queue, error);
                    tokio::time::sleep(CONSUMER_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        if let Err(error) =
            process_delivery(&runtime, &queue, backend.as_ref(), delivery, &shutdown).await
        {
            tracing::warn!(queue = %queue, error = %error, "Queue '{}' settle failed: {}", queue, error);
        }
    }

    ConsumerStateChanged {
        queue: &queue,
        running: false,
    }
    .log();
}
