use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex as TokioMutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use bidi::Router as SessionRouter;
use bidi_runtime::{Error, MessageChannel};

/// The running acceptor: owns the listening socket and the serve task.
pub struct ProxyServer {
	local_addr: SocketAddr,
	router: Arc<SessionRouter>,
	shutdown_tx: watch::Sender<bool>,
	task: JoinHandle<()>,
}

impl std::fmt::Debug for ProxyServer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProxyServer")
			.field("local_addr", &self.local_addr)
			.finish_non_exhaustive()
	}
}

#[derive(Clone)]
struct AppState {
	router: Arc<SessionRouter>,
}

/// Binds the listen address and starts accepting clients.
///
/// Returns as soon as the listener is bound; a bind failure surfaces here.
pub async fn start(host: &str, port: u16, router: Arc<SessionRouter>) -> Result<ProxyServer> {
	let addr: SocketAddr = format!("{host}:{port}")
		.parse()
		.with_context(|| format!("Invalid host/port combination: {host}:{port}"))?;

	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind proxy server to {addr}"))?;
	let local_addr = listener.local_addr().context("Reading bound address")?;

	info!(target = "bidi", %local_addr, "proxy listening");

	let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

	let app = Router::new().route("/", get(upgrade)).with_state(AppState {
		router: Arc::clone(&router),
	});

	let task = tokio::spawn(async move {
		let shutdown = async move {
			let _ = shutdown_rx.changed().await;
		};
		if let Err(err) = axum::serve(listener, app.into_make_service())
			.with_graceful_shutdown(shutdown)
			.await
		{
			error!(target = "bidi", error = %err, "proxy server error");
		}
	});

	Ok(ProxyServer {
		local_addr,
		router,
		shutdown_tx,
		task,
	})
}

impl ProxyServer {
	/// The address the listener actually bound (resolves port 0).
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Stops accepting new connections and tears down every registered
	/// session, waiting at most `deadline` for the drain to finish.
	pub async fn stop(self, deadline: Duration) -> Result<()> {
		let ProxyServer {
			router,
			shutdown_tx,
			mut task,
			..
		} = self;

		info!(target = "bidi", "stopping proxy");
		let _ = shutdown_tx.send(true);

		let drained = tokio::time::timeout(deadline, async {
			router.close_all().await;
			let _ = (&mut task).await;
		})
		.await;

		if drained.is_err() {
			warn!(
				target = "bidi",
				"shutdown deadline elapsed before all connections drained"
			);
			task.abort();
		} else {
			info!(target = "bidi", "proxy stopped");
		}

		Ok(())
	}
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_client_socket(socket, state.router))
}

async fn handle_client_socket(socket: WebSocket, router: Arc<SessionRouter>) {
	let client: Arc<dyn MessageChannel> = ClientChannel::from_socket(socket);

	let Some(id) = router.on_connect(Arc::clone(&client)).await else {
		return;
	};
	info!(target = "bidi", client = %id, "client connected");

	// All client-side reads happen on this task, so forwarding a frame is
	// synchronous with its receipt and client->engine order is preserved.
	loop {
		match client.receive().await {
			Ok(frame) => router.on_client_message(id, &frame).await,
			Err(err) => {
				if !err.is_closed() {
					warn!(target = "bidi", client = %id, error = %err, "client websocket error");
				}
				break;
			}
		}
	}

	router.on_client_disconnect(id).await;
	client.close().await;
	info!(target = "bidi", client = %id, "client disconnected");
}

enum Outbound {
	Text(String),
	Close,
}

/// Client-side [`MessageChannel`] over an upgraded axum WebSocket.
///
/// Same shape as the engine-side channel: a reader task pumps inbound text
/// frames into a queue, a writer task owns the sink, and a local close wakes
/// any receive parked on the queue.
struct ClientChannel {
	outbound: mpsc::UnboundedSender<Outbound>,
	inbound: TokioMutex<mpsc::UnboundedReceiver<String>>,
	closed: AtomicBool,
	/// Wakes a receive parked on the inbound queue.
	close_notify: Notify,
	/// Stops the reader task so the socket is released without waiting for
	/// the peer's side of the close handshake.
	reader_stop: Notify,
}

impl ClientChannel {
	fn from_socket(socket: WebSocket) -> Arc<Self> {
		let (mut sink, mut source) = socket.split();
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

		let channel = Arc::new(Self {
			outbound: outbound_tx,
			inbound: TokioMutex::new(inbound_rx),
			closed: AtomicBool::new(false),
			close_notify: Notify::new(),
			reader_stop: Notify::new(),
		});

		// Writer task; dropping the sink on exit releases the socket even
		// when the close notification cannot be delivered.
		tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				match frame {
					Outbound::Text(text) => {
						if sink.send(Message::Text(text.into())).await.is_err() {
							break;
						}
					}
					Outbound::Close => {
						let _ = sink.send(Message::Close(None)).await;
						break;
					}
				}
			}
		});

		let reader = Arc::clone(&channel);
		tokio::spawn(async move {
			loop {
				let frame = tokio::select! {
					_ = reader.reader_stop.notified() => break,
					frame = source.next() => frame,
				};
				match frame {
					Some(Ok(Message::Text(text))) => {
						if inbound_tx.send(text.as_str().to_owned()).is_err() {
							break;
						}
					}
					Some(Ok(Message::Close(_))) | None => break,
					// Binary frames are not part of the exchange; axum
					// answers ping/pong on its own.
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						debug!(target = "bidi", error = %err, "client websocket read error");
						break;
					}
				}
			}
		});

		channel
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

#[async_trait]
impl MessageChannel for ClientChannel {
	async fn send(&self, payload: &str) -> bidi_runtime::Result<()> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}
		self.outbound
			.send(Outbound::Text(payload.to_string()))
			.map_err(|_| Error::ChannelClosed)
	}

	async fn receive(&self) -> bidi_runtime::Result<String> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}
		let mut inbound = self.inbound.lock().await;
		tokio::select! {
			_ = self.close_notify.notified() => Err(Error::ChannelClosed),
			frame = inbound.recv() => frame.ok_or(Error::ChannelClosed),
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
