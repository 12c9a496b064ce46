//! The session router.
//!
//! The acceptor feeds the router three events: a new client connected, a
//! client sent a frame, a client went away. The router owns the registry of
//! live sessions, provisions one browser engine per connected client, and
//! forwards frames without ever looking inside them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use bidi_protocol::ErrorFrame;
use bidi_runtime::{EngineConnector, EngineLauncher, LaunchOptions, MessageChannel};

use crate::ClientId;
use crate::session::{Lifecycle, Session, run_relay};

/// Configuration applied uniformly to every provisioned engine.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub headless: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { headless: true }
    }
}

/// Routes frames between connected clients and their dedicated engines.
pub struct Router {
    sessions: DashMap<ClientId, Arc<Session>>,
    launcher: Arc<dyn EngineLauncher>,
    connector: Arc<dyn EngineConnector>,
    config: RouterConfig,
    next_id: AtomicU64,
}

impl Router {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        connector: Arc<dyn EngineConnector>,
        config: RouterConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            launcher,
            connector,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Handles a newly accepted client connection.
    ///
    /// Provisions an engine and opens its protocol connection. On success
    /// the session is registered, its relay task is spawned, and the new
    /// identifier is returned; the call never waits for the relay itself.
    /// On failure the client gets a single structured error frame, its
    /// channel is closed, and nothing is registered.
    pub async fn on_connect(&self, client: Arc<dyn MessageChannel>) -> Option<ClientId> {
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        info!(client = %id, "launching browser");

        let options = LaunchOptions {
            headless: self.config.headless,
            ..Default::default()
        };

        let engine = match self.launcher.launch(&options).await {
            Ok(engine) => engine,
            Err(err) => {
                warn!(client = %id, error = %err, "browser launch failed");
                refuse(client, &err).await;
                return None;
            }
        };

        let engine_channel = match self.connector.connect(&engine.websocket_url).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!(client = %id, error = %err, "engine connection failed");
                engine.process.close().await;
                refuse(client, &err).await;
                return None;
            }
        };

        debug!(client = %id, url = %engine.websocket_url, "engine connection established");

        let (session, stop_rx) = Session::new(id, client, engine_channel, engine.process);
        self.sessions.insert(id, Arc::clone(&session));

        tokio::spawn(run_relay(session, stop_rx));

        Some(id)
    }

    /// Forwards one client frame to the session's engine.
    ///
    /// A frame that arrives after teardown finds no session and is dropped
    /// silently. A forwarding failure is logged but never triggers teardown
    /// from this path; the relay observes the same fault and the disconnect
    /// path drives teardown, so two racing paths never fight over it.
    pub async fn on_client_message(&self, id: ClientId, payload: &str) {
        let Some(session) = self.sessions.get(&id).map(|entry| Arc::clone(entry.value())) else {
            debug!(client = %id, "message for unknown session");
            return;
        };

        if session.lifecycle() == Lifecycle::Closed {
            return;
        }

        if let Err(err) = session.engine().send(payload).await {
            warn!(client = %id, error = %err, "failed to forward frame to engine");
        }
    }

    /// Handles a client disconnect: takes the session out of the registry
    /// and tears it down. The removal is atomic, so racing disconnects tear
    /// down at most once.
    pub async fn on_client_disconnect(&self, id: ClientId) {
        let Some((_, session)) = self.sessions.remove(&id) else {
            return;
        };

        debug!(client = %id, "client disconnected");
        session.close().await;
    }

    /// Tears down every registered session. Used at process shutdown.
    ///
    /// Best effort: one slow or failing session never blocks the others.
    /// Sessions registered while the drain is in flight stay registered and
    /// are closed by their own disconnect path; the teardown guard rules
    /// out a double release either way.
    pub async fn close_all(&self) {
        let ids: Vec<ClientId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        if !ids.is_empty() {
            info!(sessions = ids.len(), "closing all sessions");
        }

        for id in ids {
            let Some((_, session)) = self.sessions.remove(&id) else {
                continue;
            };
            session.close().await;
            // Shutdown is the detecting path here, so the client side is
            // closed by this loop rather than inside teardown.
            session.client().close().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self, id: ClientId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }
}

/// Reports a provisioning failure to the client and closes the connection.
///
/// The error detail is surfaced exactly once; a client that already went
/// away simply misses it.
async fn refuse(client: Arc<dyn MessageChannel>, err: &bidi_runtime::Error) {
    let frame = ErrorFrame::session_not_created(err.to_string());
    if let Err(send_err) = client.send(&frame.to_wire()).await {
        debug!(error = %send_err, "client went away before the error frame");
    }
    client.close().await;
}
