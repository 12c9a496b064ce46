//! A session pairs one client connection with one browser engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use bidi_runtime::{MessageChannel, ProcessHandle};

use crate::ClientId;

/// Session lifecycle. Transitions are monotonic: `Active -> Closing ->
/// Closed`, with no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Active,
            1 => Lifecycle::Closing,
            _ => Lifecycle::Closed,
        }
    }
}

/// One client paired with its dedicated browser engine.
///
/// The session owns both channels and the engine process handle
/// exclusively; no other component closes them directly.
pub struct Session {
    id: ClientId,
    client: Arc<dyn MessageChannel>,
    engine: Arc<dyn MessageChannel>,
    process: Arc<dyn ProcessHandle>,
    state: AtomicU8,
    stop_tx: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(
        id: ClientId,
        client: Arc<dyn MessageChannel>,
        engine: Arc<dyn MessageChannel>,
        process: Arc<dyn ProcessHandle>,
    ) -> (Arc<Self>, watch::Receiver<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let session = Arc::new(Self {
            id,
            client,
            engine,
            process,
            state: AtomicU8::new(Lifecycle::Active as u8),
            stop_tx,
        });
        (session, stop_rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn client(&self) -> &Arc<dyn MessageChannel> {
        &self.client
    }

    pub(crate) fn engine(&self) -> &Arc<dyn MessageChannel> {
        &self.engine
    }

    /// Marks the session as on its way down without releasing anything.
    fn mark_closing(&self) {
        let _ = self.state.compare_exchange(
            Lifecycle::Active as u8,
            Lifecycle::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Tears the session down: stop the relay, close the engine channel,
    /// terminate the engine process.
    ///
    /// The transition to `Closed` is a single atomic swap, so the release
    /// sequence runs at most once no matter how many paths race here; later
    /// callers return without error. The client channel is closed by
    /// whichever path detected the fault, never here.
    pub async fn close(&self) {
        let previous = self.state.swap(Lifecycle::Closed as u8, Ordering::AcqRel);
        if Lifecycle::from_u8(previous) == Lifecycle::Closed {
            return;
        }

        debug!(client = %self.id, "closing session");

        // Stop the relay before releasing what it reads from. The signal
        // fires exactly once per session; the guard above rules out a
        // second send.
        let _ = self.stop_tx.send(true);

        self.engine.close().await;
        self.process.close().await;

        debug!(client = %self.id, "session closed");
    }
}

/// Relay loop: engine -> client, until stopped or either side ends.
///
/// Runs as its own task, spawned at session creation. The loop blocks
/// indefinitely waiting for the next engine frame; only the stop signal, an
/// engine-side close/error, or a client-side send failure ends it. The
/// `biased` select makes a delivered stop signal win over a concurrently
/// closed engine channel, so teardown-driven exits do not masquerade as
/// engine faults.
pub(crate) async fn run_relay(session: Arc<Session>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            received = session.engine.receive() => match received {
                Ok(frame) => {
                    if let Err(err) = session.client.send(&frame).await {
                        // Teardown is driven by the disconnect path.
                        debug!(client = %session.id, error = %err, "client send failed, relay exiting");
                        return;
                    }
                }
                Err(err) => {
                    // The engine side ended; the session cannot continue.
                    if session.lifecycle() == Lifecycle::Active {
                        if err.is_closed() {
                            debug!(client = %session.id, "engine connection closed");
                        } else {
                            warn!(client = %session.id, error = %err, "engine connection failed");
                        }
                    }
                    session.mark_closing();
                    session.client.close().await;
                    return;
                }
            }
        }
    }
}
