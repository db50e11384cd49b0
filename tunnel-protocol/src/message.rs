use serde::{Deserialize, Serialize};

/// Message codes. `Request`/`Response`/`Tunnel`/`TunnelWhoAmI` carry the
/// routing semantics the routing core cares about; `Heartbeat`/
/// `HeartbeatAck` and `Profile` are the framework-internal codes every
/// handler passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Code {
    Request = 0,
    Response = 1,
    Tunnel = 2,
    TunnelWhoAmI = 3,
    Heartbeat = 4,
    HeartbeatAck = 5,
    Profile = 6,
}

impl Code {
    pub fn from_u8(byte: u8) -> Option<Code> {
        Some(match byte {
            0 => Code::Request,
            1 => Code::Response,
            2 => Code::Tunnel,
            3 => Code::TunnelWhoAmI,
            4 => Code::Heartbeat,
            5 => Code::HeartbeatAck,
            6 => Code::Profile,
            _ => return None,
        })
    }
}

/// One framed message: a 1-byte code, a 1-byte agent tag, a 2-byte
/// service id, and opaque length-prefixed content (see §6 of the spec
/// for the wire layout this mirrors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub code: Code,
    /// Tag identifying which backend an incoming response/tunnel came
    /// from. Only meaningful on the device-facing wire; zero otherwise.
    pub agent: u8,
    pub service: u16,
    pub content: Vec<u8>,
}

impl Message {
    pub fn new(code: Code, service: u16, content: Vec<u8>) -> Self {
        Self {
            code,
            agent: 0,
            service,
            content,
        }
    }

    pub fn request(service: u16, content: Vec<u8>) -> Self {
        Self::new(Code::Request, service, content)
    }

    pub fn response(service: u16, content: Vec<u8>) -> Self {
        Self::new(Code::Response, service, content)
    }
}
