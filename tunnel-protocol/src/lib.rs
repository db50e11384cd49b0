//! Wire message types and the framing codec shared by the tunnel relay
//! (`tunnel-server`) and the backend agent library (`tunnel-agent`).
//!
//! This crate plays the role of the "generic RPC framework" the routing
//! core treats as an external dependency: it owns the byte layout, and
//! nothing above it needs to know how a [`Message`] made it onto the
//! wire.

pub mod codec;
pub mod device;
pub mod error;
pub mod message;
pub mod tunnel;

pub use codec::{decode_envelope, encode_envelope, read_message, write_message, MAX_FRAME_LEN};
pub use device::DeviceId;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Code, Message};
pub use tunnel::{NamedService, TunnelEnvelope, TunnelWhoAmI};
