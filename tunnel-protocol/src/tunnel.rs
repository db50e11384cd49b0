use crate::device::DeviceId;
use crate::message::Message;
use serde::{Deserialize, Serialize};

/// A service a backend hosts, announced in a `TunnelWhoAmI` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedService {
    pub service_id: u16,
    pub name: String,
}

impl NamedService {
    pub fn new(service_id: u16, name: impl Into<String>) -> Self {
        Self {
            service_id,
            name: name.into(),
        }
    }
}

/// Content of a `TunnelWhoAmI` message: the full set of services a
/// backend hosts, sent once immediately after connect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelWhoAmI {
    pub services: Vec<NamedService>,
}

/// `{device_id, inner_message}` — the only carrier used between proxy
/// and backend once past handshake. Its serialized form replaces the
/// `content` of a message whose `code` is `Tunnel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelEnvelope {
    pub device_id: DeviceId,
    pub inner: Message,
}

impl TunnelEnvelope {
    pub fn new(device_id: DeviceId, inner: Message) -> Self {
        Self { device_id, inner }
    }
}
