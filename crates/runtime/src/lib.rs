//! BiDi proxy runtime - channel transport and engine lifecycle.
//!
//! This crate provides the low-level infrastructure the session router is
//! built on:
//!
//! - **Channel**: the message-framed, full-duplex connection abstraction
//!   used identically for the client-side and engine-side links
//! - **Launcher**: provisioning a browser engine process and its BiDi
//!   protocol endpoint
//! - **Paths**: locating chromedriver and browser binaries
//!
//! The router itself lives in `bidi-core` and consumes only the traits
//! defined here, so it can be exercised against in-memory fakes.

pub mod channel;
pub mod error;
pub mod launcher;
pub mod paths;

// Re-export key types at crate root
pub use channel::{EngineConnector, MessageChannel, WsChannel, WsConnector};
pub use error::{Error, Result};
pub use launcher::{
    ChromedriverLauncher, EngineLauncher, EngineProcess, LaunchOptions, LaunchedEngine,
    ProcessHandle,
};
