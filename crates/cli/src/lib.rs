//! BiDi proxy CLI: the connection acceptor and process-level controls.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod server;
