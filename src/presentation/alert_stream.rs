// Live alert streaming over SSE
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::warn;

use crate::application::alert_engine::AlertSubscriber;
use crate::domain::alert::AlertEvent;
use crate::presentation::app_state::AppState;

const STREAM_BUFFER: usize = 64;

/// Bridges the engine's subscriber registry onto an mpsc channel feeding one
/// SSE connection.
struct ChannelSubscriber {
    tx: mpsc::Sender<AlertEvent>,
}

#[async_trait]
impl AlertSubscriber for ChannelSubscriber {
    async fn deliver(&self, event: AlertEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("alert stream client is gone"))
    }
}

/// Stream every alert event to the client. The subscription guard lives
/// inside the stream, so a disconnect drops it and deregisters the
/// subscriber.
pub async fn stream_alerts(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
    let subscription = state
        .alert_engine
        .subscribe(Arc::new(ChannelSubscriber { tx }));

    let stream = async_stream::stream! {
        let _subscription = subscription;
        while let Some(event) = rx.recv().await {
            match Event::default().event("alert").json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!(error = %e, "failed to encode alert event"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
