//! plume-server: the gateway side of the plume fabric.
//!
//! A WebSocket listener that admits connections through a pluggable
//! [`Acceptor`], tracks them in a [`ChannelRegistry`], feeds inbound
//! payloads to a [`MessageListener`], and delivers routed packets back out
//! through a [`LocalDispatcher`].

pub mod config;
pub mod dispatch;
pub mod hooks;
pub mod logging;
pub mod login;
pub mod registry;
pub mod server;
pub mod transport;

pub use config::GatewayConfig;
pub use dispatch::LocalDispatcher;
pub use hooks::{Acceptor, Agent, MessageListener, Meta, StateListener};
pub use login::LoginAcceptor;
pub use registry::{ChannelAgent, ChannelRegistry};
pub use server::GatewayServer;
