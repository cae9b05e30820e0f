//! plume-client: the client-side transport session for the plume gateway
//! fabric.
//!
//! Provides the connect/handshake state machine with heartbeat keep-alive
//! and idempotent shutdown, the pluggable dial-and-handshake capability, and
//! the WebSocket/TCP framed-connection variants.

pub mod client;
pub mod conn;
pub mod dialer;

pub use client::{Client, ClientOptions};
pub use dialer::{Dialer, DialerContext, Handshake, LoginDialer};
