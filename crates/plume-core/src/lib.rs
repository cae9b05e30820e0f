//! plume-core: routing core of the plume instant-messaging gateway fabric.
//!
//! Provides the logic packet shape and codec, location/session model, the
//! per-packet request context with its cooperative handler chain, the
//! dispatcher capability consumed by the context, framed-connection traits,
//! and HMAC bearer tokens for the login handshake.

pub mod bodies;
pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod location;
pub mod packet;
pub mod session;
pub mod token;

// Re-export commonly used items at crate root.
pub use codec::{marshal, unmarshal, PacketDecoder};
pub use context::{Context, HandlerFunc};
pub use dispatcher::Dispatcher;
pub use error::{PlumeError, PlumeResult};
pub use frame::{Conn, Frame, FrameReader, FrameWriter, OpCode};
pub use location::Location;
pub use packet::{Flag, Header, Packet, Status, COMMAND_LOGIN_SIGN_IN, META_DEST_SERVER};
pub use session::{Session, TAG_AUTO_GENERATED};
