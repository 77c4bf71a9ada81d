//! WebSocket transport: axum upgrade endpoint and a tungstenite client.
//!
//! Every text frame carries one envelope. Binary frames are decoded as UTF-8
//! (lossy); ping, pong and close frames never reach the codec.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{future, SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tracing::info;

use super::connection::{Connection, ConnectionOptions, FrameSink, Services};
use super::TransportKind;
use crate::server::AppState;
use crate::{AppError, Result};

/// Handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

/// Run one upgraded server-side socket to completion.
pub async fn serve_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();

    let sink: FrameSink = Box::pin(
        sender
            .sink_map_err(|err| AppError::Transport(format!("websocket send failed: {err}")))
            .with(|text: String| future::ready(Ok::<_, AppError>(Message::Text(text.into())))),
    );
    let frames = receiver.filter_map(|message| future::ready(server_frame(message)));

    let (connection, driver) = Connection::new(
        TransportKind::WebSocket,
        sink,
        state.services(),
        state.connection_options(),
    );
    info!(connection_id = %connection.id(), "websocket client connected");
    driver.run(frames).await;
}

/// Connect to a WebSocket endpoint as a client and spawn the connection driver.
///
/// The remote side is a full peer: it may call methods registered on
/// `services.dispatcher` and answer requests issued with
/// [`Connection::request`].
///
/// # Errors
///
/// Returns `AppError::Transport` if the handshake fails.
pub async fn connect(
    url: &str,
    services: Services,
    options: ConnectionOptions,
) -> Result<(Arc<Connection>, JoinHandle<()>)> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|err| AppError::Transport(format!("websocket connect to {url} failed: {err}")))?;
    let (sender, receiver) = stream.split();

    let sink: FrameSink = Box::pin(
        sender
            .sink_map_err(|err| AppError::Transport(format!("websocket send failed: {err}")))
            .with(|text: String| {
                future::ready(Ok::<_, AppError>(tungstenite::Message::Text(text.into())))
            }),
    );
    let frames = receiver.filter_map(|message| future::ready(client_frame(message)));

    let (connection, driver) = Connection::new(TransportKind::WebSocket, sink, services, options);
    info!(connection_id = %connection.id(), url, "websocket connected");
    let handle = driver.spawn(frames);
    Ok((connection, handle))
}

fn server_frame(message: std::result::Result<Message, axum::Error>) -> Option<Result<String>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
        Err(err) => Some(Err(AppError::Transport(format!(
            "websocket receive failed: {err}"
        )))),
    }
}

fn client_frame(
    message: std::result::Result<tungstenite::Message, tungstenite::Error>,
) -> Option<Result<String>> {
    match message {
        Ok(tungstenite::Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(tungstenite::Message::Binary(bytes)) => {
            Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
        }
        Ok(_) => None,
        Err(err) => Some(Err(AppError::Transport(format!(
            "websocket receive failed: {err}"
        )))),
    }
}
