//! In-memory fakes for exercising the router without sockets or processes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as TokioMutex, Notify, mpsc};

use bidi_runtime::{
    EngineConnector, EngineLauncher, Error, LaunchOptions, LaunchedEngine, MessageChannel,
    ProcessHandle, Result,
};

/// One end of an in-memory duplex channel.
pub struct FakeChannel {
    outbound: TokioMutex<Option<mpsc::UnboundedSender<String>>>,
    inbound: TokioMutex<mpsc::UnboundedReceiver<String>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl FakeChannel {
    /// Creates a connected pair; frames sent on one end arrive on the other.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self::from_parts(b_tx, a_rx)),
            Arc::new(Self::from_parts(a_tx, b_rx)),
        )
    }

    fn from_parts(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            outbound: TokioMutex::new(Some(outbound)),
            inbound: TokioMutex::new(inbound),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits (bounded) until this end has been closed.
    pub async fn wait_closed(&self) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !self.is_closed() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("channel was not closed in time");
    }

    /// Sends a frame, panicking if the channel is unusable.
    pub async fn send_raw(&self, payload: &str) {
        MessageChannel::send(self, payload)
            .await
            .expect("fake channel closed");
    }

    /// Receives the next frame, panicking on timeout or closure.
    pub async fn recv_timeout(&self) -> String {
        tokio::time::timeout(Duration::from_secs(1), MessageChannel::receive(self))
            .await
            .expect("timed out waiting for a frame")
            .expect("channel closed while waiting for a frame")
    }

    /// Receives until the channel reports an error, panicking on timeout.
    pub async fn recv_err(&self) -> Error {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Err(err) = MessageChannel::receive(self).await {
                    return err;
                }
            }
        })
        .await
        .expect("timed out waiting for channel closure")
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    async fn send(&self, payload: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        match self.outbound.lock().await.as_ref() {
            Some(tx) => tx
                .send(payload.to_string())
                .map_err(|_| Error::ChannelClosed),
            None => Err(Error::ChannelClosed),
        }
    }

    async fn receive(&self) -> Result<String> {
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
        // Dropping the sender surfaces end-of-stream on the peer.
        self.outbound.lock().await.take();
    }
}

/// Process handle that counts how many times it was released.
#[derive(Default)]
pub struct FakeProcess {
    closes: AtomicUsize,
}

impl FakeProcess {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Launcher yielding pre-staged engines, or a fixed failure.
pub struct FakeLauncher {
    engines: TokioMutex<VecDeque<LaunchedEngine>>,
    failure: Option<String>,
    seen: TokioMutex<Vec<LaunchOptions>>,
}

impl FakeLauncher {
    pub fn new(engines: VecDeque<LaunchedEngine>) -> Arc<Self> {
        Arc::new(Self {
            engines: TokioMutex::new(engines),
            failure: None,
            seen: TokioMutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            engines: TokioMutex::new(VecDeque::new()),
            failure: Some(message.to_string()),
            seen: TokioMutex::new(Vec::new()),
        })
    }

    /// Options recorded from every launch attempt, in order.
    pub async fn seen_options(&self) -> Vec<LaunchOptions> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<LaunchedEngine> {
        self.seen.lock().await.push(options.clone());
        if let Some(message) = &self.failure {
            return Err(Error::LaunchFailed(message.clone()));
        }
        self.engines
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::LaunchFailed("no engine staged".to_string()))
    }
}

/// Connector handing out pre-staged engine channels.
pub struct FakeConnector {
    channels: TokioMutex<VecDeque<Arc<dyn MessageChannel>>>,
}

impl FakeConnector {
    pub fn new(channels: VecDeque<Arc<dyn MessageChannel>>) -> Arc<Self> {
        Arc::new(Self {
            channels: TokioMutex::new(channels),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(VecDeque::new())
    }
}

#[async_trait]
impl EngineConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn MessageChannel>> {
        self.channels
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::ConnectionFailed("no channel staged".to_string()))
    }
}

/// The test-facing handles for one staged engine.
pub struct StagedEngine {
    /// The end handed to the router as the engine channel.
    pub channel: Arc<FakeChannel>,
    /// The end the test drives, standing in for the browser.
    pub peer: Arc<FakeChannel>,
    pub process: Arc<FakeProcess>,
}

/// Everything the router needs to accept `count` connections.
pub struct Staged {
    pub launcher: Arc<FakeLauncher>,
    pub connector: Arc<FakeConnector>,
    pub engines: Vec<StagedEngine>,
}

/// Stages `count` fake engines for launch, in order.
pub fn stage(count: usize) -> Staged {
    let mut launches = VecDeque::new();
    let mut channels: VecDeque<Arc<dyn MessageChannel>> = VecDeque::new();
    let mut engines = Vec::new();

    for i in 0..count {
        let (channel, peer) = FakeChannel::pair();
        let process = FakeProcess::new();
        launches.push_back(LaunchedEngine {
            websocket_url: format!("ws://127.0.0.1:9515/session/{i}"),
            process: process.clone(),
        });
        channels.push_back(channel.clone());
        engines.push(StagedEngine {
            channel,
            peer,
            process,
        });
    }

    Staged {
        launcher: FakeLauncher::new(launches),
        connector: FakeConnector::new(channels),
        engines,
    }
}
