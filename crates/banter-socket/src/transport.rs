//! Transport seam between the connection manager and the wire.
//!
//! A [`Connector`] opens one socket and hands back a [`SocketChannel`]: an
//! outbound frame queue and an inbound event stream that always ends with
//! exactly one [`TransportEvent::Closed`]. The production connector runs a
//! pump task over `tokio-tungstenite`; tests script the channel directly.

use async_trait::async_trait;
use banter_core::ConnectionError;
use banter_core::close::{ABNORMAL_CLOSURE, NO_STATUS, NORMAL_CLOSURE};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frame queued by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Close handshake with the given code.
    Close(u16),
}

/// Event observed on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame from the server.
    Text(String),
    /// The socket is gone. Always the final event.
    Closed {
        /// Close code, or 1006 when the transport dropped without one.
        code: u16,
    },
}

/// Both directions of one open socket.
#[derive(Debug)]
pub struct SocketChannel {
    /// Frames to write.
    pub outbound: mpsc::Sender<OutboundFrame>,
    /// Frames read, terminated by `Closed`.
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens sockets.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to `url`. `buffer` sizes both frame queues.
    async fn connect(&self, url: &Url, buffer: usize) -> Result<SocketChannel, ConnectionError>;
}

/// `tokio-tungstenite` connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url, buffer: usize) -> Result<SocketChannel, ConnectionError> {
        let (ws, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| ConnectionError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        debug!(%url, "socket handshake complete");

        let (out_tx, out_rx) = mpsc::channel(buffer.max(1));
        let (in_tx, in_rx) = mpsc::channel(buffer.max(1));
        drop(tokio::spawn(pump(ws, out_rx, in_tx)));

        Ok(SocketChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Shuttle frames between the queues and the socket until either side ends.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    inbound: mpsc::Sender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let code = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break ABNORMAL_CLOSURE;
                    }
                }
                Some(OutboundFrame::Close(code)) => {
                    send_close(&mut ws_tx, code).await;
                    break code;
                }
                // Manager dropped its sender: close politely.
                None => {
                    send_close(&mut ws_tx, NORMAL_CLOSURE).await;
                    break NORMAL_CLOSURE;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportEvent::Text(text.as_str().to_owned())).await.is_err() {
                        send_close(&mut ws_tx, NORMAL_CLOSURE).await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if inbound.send(TransportEvent::Text(text)).await.is_err() {
                            send_close(&mut ws_tx, NORMAL_CLOSURE).await;
                            return;
                        }
                    }
                    Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or(NO_STATUS, |f| u16::from(f.code));
                }
                // Protocol-level ping/pong is answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "socket read failed");
                    break ABNORMAL_CLOSURE;
                }
                None => break ABNORMAL_CLOSURE,
            },
        }
    };

    let _ = inbound.send(TransportEvent::Closed { code }).await;
}

async fn send_close(ws_tx: &mut futures::stream::SplitSink<WsStream, Message>, code: u16) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    };
    if ws_tx.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }
    let _ = ws_tx.close().await;
}
