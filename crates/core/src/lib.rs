//! BiDi proxy session router.
//!
//! One controlling client drives one isolated browser engine. The router
//! accepts connection events from the acceptor, provisions an engine per
//! client, and relays protocol frames between the two sides until either
//! side disconnects or fails:
//!
//! - [`Router`]: session registry plus the connect/message/disconnect
//!   dispatch surface
//! - [`Session`]: one client/engine pairing - the relay task and the
//!   guarded teardown sequence
//!
//! The router is transport-agnostic: it consumes the channel, launcher, and
//! connector traits from `bidi-runtime`, so the whole thing can be exercised
//! against in-memory fakes.

use std::fmt;

pub mod router;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use router::{Router, RouterConfig};
pub use session::{Lifecycle, Session};

/// Identifier assigned to each accepted client connection.
///
/// Monotonically increasing for the process lifetime; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
