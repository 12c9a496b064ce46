//! Wire types for the BiDi proxy.
//!
//! This crate contains the serde-serializable types that cross process
//! boundaries: the error frame sent to a client when a session cannot be
//! established, and the WebDriver "new session" shapes the launcher uses to
//! bootstrap a browser. These types represent the "protocol layer" - the
//! shapes of data as they appear on the wire.
//!
//! BiDi frames themselves are never modeled here; the proxy relays them as
//! opaque text.

pub mod error_frame;
pub mod webdriver;

pub use error_frame::*;
pub use webdriver::*;
