//! Typed bodies for the wire exchanges the core defines itself.
//!
//! Application commands carry their own body types; these are only the ones
//! the login handshake and the generic error reply need.

use serde::{Deserialize, Serialize};

/// Body of a `login.signin` request: an opaque bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub token: String,
}

/// Body of a successful login response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Gateway-assigned channel id for this connection.
    pub channel_id: String,
}

/// Generic error body used by [`Context::resp_with_error`].
///
/// [`Context::resp_with_error`]: crate::context::Context::resp_with_error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
