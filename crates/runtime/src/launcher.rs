//! Browser engine lifecycle.
//!
//! Provisioning runs in four steps: spawn chromedriver on a free port, poll
//! its status endpoint until it is ready, create a WebDriver session with
//! the BiDi capability, and hand back the session's WebSocket endpoint
//! together with a handle that owns the driver process. A failure at any
//! step kills the child before the error is returned; a half-launched
//! engine never escapes this module.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use bidi_protocol::{ChromeOptions, NewSessionRequest, NewSessionResponse, StatusResponse};

use crate::error::{Error, Result};
use crate::paths;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_WAIT: Duration = Duration::from_millis(500);

/// Options applied to every engine launch.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Explicit browser binary; falls back to the `BIDI_CHROME` override,
    /// then the driver's own discovery.
    pub binary: Option<PathBuf>,
    /// Extra browser arguments appended to the defaults.
    pub args: Vec<String>,
}

/// A provisioned engine: its BiDi endpoint and the process that backs it.
pub struct LaunchedEngine {
    pub websocket_url: String,
    pub process: Arc<dyn ProcessHandle>,
}

impl std::fmt::Debug for LaunchedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedEngine")
            .field("websocket_url", &self.websocket_url)
            .finish_non_exhaustive()
    }
}

/// Starts a browser engine process and exposes its protocol endpoint.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<LaunchedEngine>;
}

/// Handle used to terminate a provisioned engine process.
///
/// `close` is idempotent and tolerates a process that already exited.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    async fn close(&self);
}

/// Production [`ProcessHandle`] wrapping the chromedriver child process.
pub struct EngineProcess {
    child: TokioMutex<Option<Child>>,
}

impl EngineProcess {
    pub fn new(child: Child) -> Self {
        Self {
            child: TokioMutex::new(Some(child)),
        }
    }
}

#[async_trait]
impl ProcessHandle for EngineProcess {
    async fn close(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        // Killing an already-exited process reports an error we can ignore.
        if let Err(err) = child.kill().await {
            debug!(error = %err, "engine process already gone");
        }

        if tokio::time::timeout(KILL_WAIT, child.wait()).await.is_err() {
            warn!("timed out waiting for engine process to exit");
        }
    }
}

/// Production [`EngineLauncher`] backed by chromedriver.
#[derive(Debug, Default)]
pub struct ChromedriverLauncher {
    /// Explicit driver path; resolved via [`paths::find_chromedriver`] when
    /// absent.
    pub driver: Option<PathBuf>,
}

#[async_trait]
impl EngineLauncher for ChromedriverLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<LaunchedEngine> {
        let driver = match &self.driver {
            Some(path) => path.clone(),
            None => paths::find_chromedriver()?,
        };

        let port = free_port()?;
        debug!(driver = %driver.display(), port, "spawning chromedriver");

        let mut child = Command::new(&driver)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::LaunchFailed(format!("spawning {}: {err}", driver.display())))?;

        let http = reqwest::Client::new();

        if let Err(err) = wait_until_ready(&http, port, &mut child).await {
            let _ = child.kill().await;
            return Err(err);
        }

        let session = match new_session(&http, port, options).await {
            Ok(session) => session,
            Err(err) => {
                let _ = child.kill().await;
                return Err(err);
            }
        };

        let websocket_url = match session.value.capabilities.web_socket_url {
            Some(url) => url,
            None => {
                let _ = child.kill().await;
                return Err(Error::LaunchFailed(
                    "driver did not report a BiDi endpoint".to_string(),
                ));
            }
        };

        debug!(
            session = %session.value.session_id,
            url = %websocket_url,
            "browser session created"
        );

        Ok(LaunchedEngine {
            websocket_url,
            process: Arc::new(EngineProcess::new(child)),
        })
    }
}

async fn wait_until_ready(http: &reqwest::Client, port: u16, child: &mut Child) -> Result<()> {
    let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;

    loop {
        if let Ok(Some(status)) = child.try_wait() {
            return Err(Error::LaunchFailed(format!(
                "chromedriver exited during startup with {status}"
            )));
        }

        if let Ok(response) = http
            .get(format!("http://127.0.0.1:{port}/status"))
            .send()
            .await
        {
            if let Ok(status) = response.json::<StatusResponse>().await {
                if status.value.ready {
                    return Ok(());
                }
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(Error::LaunchFailed(format!(
                "chromedriver did not become ready within {}s",
                STARTUP_TIMEOUT.as_secs()
            )));
        }

        tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
    }
}

async fn new_session(
    http: &reqwest::Client,
    port: u16,
    options: &LaunchOptions,
) -> Result<NewSessionResponse> {
    let mut args = vec![
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(options.args.iter().cloned());

    let binary = options
        .binary
        .clone()
        .or_else(paths::chrome_override)
        .map(|path| path.display().to_string());

    let request = NewSessionRequest::bidi_chrome(ChromeOptions { args, binary });

    let response = http
        .post(format!("http://127.0.0.1:{port}/session"))
        .json(&request)
        .send()
        .await
        .map_err(|err| Error::LaunchFailed(format!("session request failed: {err}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| Error::LaunchFailed(format!("reading session response: {err}")))?;

    if !status.is_success() {
        return Err(Error::LaunchFailed(format!(
            "driver refused session ({status}): {body}"
        )));
    }

    serde_json::from_str(&body)
        .map_err(|err| Error::LaunchFailed(format!("unexpected session response: {err}")))
}

fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
