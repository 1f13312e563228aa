//! Authentication on the live channel.
//!
//! Protocol flow:
//!   1. Client opens `ws://host:port/ws/connect?token=<credential>`
//!   2. Server validates the token before accepting any frame
//!   3. Rejected: the socket is closed with [`CLOSE_POLICY_VIOLATION`]
//!   4. Accepted: the server sends a `connected` frame and normal traffic begins

use crate::error::ProtocolError;

/// Query parameter carrying the credential.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Default path of the channel endpoint.
pub const CHANNEL_PATH: &str = "/ws/connect";

/// WebSocket close code sent when the credential is rejected.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Check that a credential can be offered to the server at all.
pub fn validate_credential(credential: &str) -> Result<(), ProtocolError> {
    if credential.trim().is_empty() {
        return Err(ProtocolError::EmptyCredential);
    }
    Ok(())
}
