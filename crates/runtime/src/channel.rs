//! Message channel abstraction.
//!
//! A [`MessageChannel`] is one end of a full-duplex, message-framed
//! connection: text frames in, text frames out, with an idempotent close.
//! The proxy uses two per session - one to the controlling client and one to
//! the browser engine - and treats every frame as opaque.
//!
//! [`WsChannel`] is the WebSocket implementation. It splits the stream into
//! a reader task and a writer task so that `send`, `receive`, and `close`
//! can be called from different tasks without holding a lock across I/O, and
//! so that closing the channel wakes a receive that is blocked waiting for
//! the next frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex as ParkingLotMutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as TokioMutex, Notify, mpsc};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{WebSocketStream, connect_async};

use crate::error::{Error, Result};

/// One end of a full-duplex, message-framed connection.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Sends one text frame to the peer.
    async fn send(&self, payload: &str) -> Result<()>;

    /// Receives the next text frame.
    ///
    /// Blocks until a frame arrives, the peer closes, the channel is closed
    /// locally, or the connection faults. A closed channel reports
    /// [`Error::ChannelClosed`]; an undecodable peer reports
    /// [`Error::ProtocolViolation`] once, then `ChannelClosed`.
    async fn receive(&self) -> Result<String>;

    /// Closes the channel.
    ///
    /// Idempotent: the second call is a no-op. A graceful close notification
    /// is attempted, but the underlying transport is released either way.
    async fn close(&self);
}

/// Opens the engine-side channel for a freshly provisioned engine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn MessageChannel>>;
}

enum Outbound {
    Text(String),
    Close,
}

/// WebSocket-backed [`MessageChannel`].
pub struct WsChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: TokioMutex<mpsc::UnboundedReceiver<String>>,
    closed: AtomicBool,
    /// Wakes a receive parked on the inbound queue.
    close_notify: Notify,
    /// Stops the reader task, releasing its half of the transport without
    /// waiting for the peer's side of the close handshake.
    reader_stop: Notify,
    /// Set by the reader when the stream dies with a decode failure; taken
    /// by the first receive that observes end-of-stream.
    fault: ParkingLotMutex<Option<Error>>,
}

impl std::fmt::Debug for WsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsChannel")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl WsChannel {
    /// Dials a WebSocket endpoint and wraps it in a channel.
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|err| Error::ConnectionFailed(format!("{url}: {err}")))?;
        Ok(Self::from_stream(stream))
    }

    /// Wraps an already-established WebSocket stream.
    ///
    /// Generic over the transport so tests can drive the channel with
    /// in-memory duplex pipes.
    pub fn from_stream<S>(stream: WebSocketStream<S>) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let channel = Arc::new(Self {
            outbound: outbound_tx,
            inbound: TokioMutex::new(inbound_rx),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            reader_stop: Notify::new(),
            fault: ParkingLotMutex::new(None),
        });

        // Writer task owns the sink. Breaking out of the loop drops the
        // sink, which releases the transport even when the close
        // notification itself could not be written.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.flush().await;
                        break;
                    }
                }
            }
        });

        // Reader task pumps inbound frames. Dropping inbound_tx on exit
        // surfaces end-of-stream to a blocked receive; a local close stops
        // the pump without waiting for the peer.
        let reader = Arc::clone(&channel);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader.reader_stop.notified() => break,
                    frame = source.next() => frame,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary/ping/pong are not part of the exchange.
                    Some(Ok(other)) => {
                        tracing::trace!(kind = ?message_kind(&other), "ignoring non-text frame");
                    }
                    Some(Err(err)) => {
                        if let Some(violation) = classify_stream_error(err) {
                            *reader.fault.lock() = Some(violation);
                        }
                        break;
                    }
                }
            }
        });

        channel
    }

    /// Returns true once the channel has been closed locally.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn send(&self, payload: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        self.outbound
            .send(Outbound::Text(payload.to_string()))
            .map_err(|_| Error::ChannelClosed)
    }

    async fn receive(&self) -> Result<String> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.close_notify.notified() => Err(Error::ChannelClosed),
            frame = inbound.recv() => match frame {
                Some(text) => Ok(text),
                None => Err(self.fault.lock().take().unwrap_or(Error::ChannelClosed)),
            },
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_notify.notify_one();
        self.reader_stop.notify_one();
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Production [`EngineConnector`]: dials the endpoint over WebSocket.
#[derive(Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl EngineConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn MessageChannel>> {
        let channel = WsChannel::connect(url).await?;
        Ok(channel)
    }
}

/// Distinguishes a normal connection teardown from a decode failure.
fn classify_stream_error(err: tungstenite::Error) -> Option<Error> {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => None,
        // Peer went away without a close handshake; still a normal end.
        tungstenite::Error::Io(_) => None,
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => None,
        other => Some(Error::ProtocolViolation(other.to_string())),
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
