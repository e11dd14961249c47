use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::models::event::OrderEvent;
use crate::state::AppState;

/// Pushes every committed order transition to the client as a JSON text
/// frame. Frames from the client are only read to notice it leaving.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let events = state.order_events_tx.subscribe();
    ws.on_upgrade(move |socket| stream_order_events(socket, events))
}

async fn stream_order_events(socket: WebSocket, events: broadcast::Receiver<OrderEvent>) {
    let (sink, mut incoming) = socket.split();
    info!("order event subscriber connected");

    let forward = event_frames(events).map(Ok::<_, axum::Error>).forward(sink);
    let client_gone = async { while let Some(Ok(_)) = incoming.next().await {} };

    tokio::select! {
        result = forward => {
            if let Err(err) = result {
                debug!(error = %err, "order event subscriber write failed");
            }
        }
        _ = client_gone => {}
    }

    info!("order event subscriber disconnected");
}

/// Frames for each event received. A lagging receiver skips what it missed;
/// the stream ends when the channel closes.
pub fn event_frames(events: broadcast::Receiver<OrderEvent>) -> impl Stream<Item = Message> {
    futures::stream::unfold(events, |mut events| async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => return Some((Message::Text(json), events)),
                    Err(err) => warn!(order_id = event.order_id, error = %err, "order event not serializable"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "order event subscriber lagging; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
