//! SSE feed of the thinking stripped from in-flight chat requests.

use axum::{body::Body, extract::State, response::Response};
use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, MissedTickBehavior};

use crate::proxy::state::AppState;
use crate::proxy::thinking_bus::ThinkingEvent;

pub async fn handle_thinking_stream(State(state): State<AppState>) -> Response {
    let mut rx = state.thinking_bus.subscribe();
    tracing::debug!(
        "[Thinking] Subscriber attached ({} active)",
        state.thinking_bus.subscriber_count()
    );

    let stream = async_stream::stream! {
        let mut keepalive = tokio::time::interval(Duration::from_secs(
            crate::constants::THINKING_KEEPALIVE_SECS,
        ));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick fires immediately; swallow it.
        keepalive.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => {
                        if let Ok(payload) = serde_json::to_string(&event) {
                            yield Ok::<Bytes, String>(Bytes::from(format!("data: {}\n\n", payload)));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // The subscriber fell behind; oldest fragments were
                        // dropped from its queue.
                        let marker = ThinkingEvent::Drop { skipped };
                        if let Ok(payload) = serde_json::to_string(&marker) {
                            yield Ok(Bytes::from(format!("data: {}\n\n", payload)));
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = keepalive.tick() => {
                    yield Ok(Bytes::from(": ping\n\n"));
                }
            }
        }
    };

    // Dropping the body drops the receiver, which unregisters the
    // subscriber; no explicit cleanup needed on disconnect.
    Response::builder()
        .header("Content-Type", "text/event-stream; charset=utf-8")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
