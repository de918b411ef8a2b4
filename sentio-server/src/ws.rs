//! Websocket voice classification: binary audio clip in, label text out

use crate::http::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

/// Reply sent when a clip cannot be classified
pub const ERROR_REPLY: &str = "error";

pub async fn websocket_handler(ws: WebSocketUpgrade, State(service): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: AppState) {
    info!("voice websocket connected");
    let (mut sender, mut receiver) = socket.split();

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        match message {
            Message::Binary(data) => {
                let reply = classify_clip(&service, Bytes::from(data)).await;
                if sender.send(Message::Text(reply)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => debug!("ignoring non-binary websocket message"),
        }
    }

    info!("voice websocket closed");
}

/// Label for one encoded clip, or `error`
pub async fn classify_clip(service: &AppState, clip: Bytes) -> String {
    let predictor = service.predictor().clone();
    match tokio::task::spawn_blocking(move || predictor.predict_upload(clip, None)).await {
        Ok(Ok(observation)) if !observation.is_degraded() => observation.label().to_string(),
        Ok(Ok(observation)) => {
            warn!(error = observation.error().unwrap_or_default(), "websocket clip degraded");
            ERROR_REPLY.to_string()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "websocket clip rejected");
            ERROR_REPLY.to_string()
        }
        Err(e) => {
            warn!(error = %e, "websocket classification task failed");
            ERROR_REPLY.to_string()
        }
    }
}
