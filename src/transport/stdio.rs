//! Newline-delimited JSON over byte streams.
//!
//! [`open_io`] wraps any `AsyncRead`/`AsyncWrite` pair: process stdio, child
//! pipes, or an in-memory `tokio::io::duplex` in tests. [`serve_stdio`] binds
//! it to this process's stdin/stdout for direct invocation by an MCP client.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::info;

use super::connection::{Connection, ConnectionOptions, FrameSink, Services};
use super::TransportKind;
use crate::protocol::framing::{FrameDecoder, LineCodec};
use crate::server::AppState;
use crate::{AppError, Result};

/// Open a duplex connection over `reader`/`writer` and spawn its driver.
///
/// The returned handle completes after teardown.
#[must_use]
pub fn open_io<R, W>(
    reader: R,
    writer: W,
    services: Services,
    options: ConnectionOptions,
) -> (Arc<Connection>, JoinHandle<()>)
where
    R: AsyncRead + Send + 'static,
    W: AsyncWrite + Send + 'static,
{
    let frames = FramedRead::new(reader, FrameDecoder::with_max_length(options.max_line_bytes))
        .map(|item| item.and_then(|frame| frame));
    let sink: FrameSink = Box::pin(FramedWrite::new(
        writer,
        LineCodec::with_max_length(options.max_line_bytes),
    ));

    let (connection, driver) = Connection::new(TransportKind::Stdio, sink, services, options);
    let handle = driver.spawn(frames);
    (connection, handle)
}

/// Serve one connection over stdin/stdout until the peer closes stdin or the
/// server shuts down.
///
/// # Errors
///
/// Returns `AppError::Transport` if the connection task panics.
pub async fn serve_stdio(state: Arc<AppState>) -> Result<()> {
    let (connection, mut handle) = open_io(
        tokio::io::stdin(),
        tokio::io::stdout(),
        state.services(),
        state.connection_options(),
    );

    info!(connection_id = %connection.id(), "starting stdio transport");

    tokio::select! {
        () = state.shutdown.cancelled() => connection.close(),
        result = &mut handle => {
            result.map_err(|err| {
                AppError::Transport(format!("stdio connection task failed: {err}"))
            })?;
            info!("stdio transport closed by peer");
            return Ok(());
        }
    }

    handle
        .await
        .map_err(|err| AppError::Transport(format!("stdio connection task failed: {err}")))?;

    info!("stdio transport shut down");
    Ok(())
}
