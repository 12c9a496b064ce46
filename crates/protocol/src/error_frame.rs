//! The single structured error frame a client sees when its session cannot
//! be established.

use serde::{Deserialize, Serialize};

/// JSON-RPC style error code reported when the browser engine could not be
/// provisioned for a connection.
pub const SESSION_NOT_CREATED: i64 = -32000;

/// Error frame emitted to a client before its connection is closed.
///
/// Shape on the wire: `{"error":{"code":-32000,"message":"..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: ErrorDetail,
}

/// Body of an [`ErrorFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i64,
    pub message: String,
}

impl ErrorFrame {
    /// Creates a session-not-created frame with the given message.
    pub fn session_not_created(message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: SESSION_NOT_CREATED,
                message: message.into(),
            },
        }
    }

    /// Serializes the frame to its wire representation.
    pub fn to_wire(&self) -> String {
        // ErrorFrame contains only string/integer fields; serialization
        // cannot fail.
        serde_json::to_string(self).expect("error frame serialization")
    }
}
