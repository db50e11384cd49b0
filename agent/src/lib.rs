//! Backend-side library: dials a tunnel proxy's backend listener,
//! announces the services this process hosts, and demultiplexes
//! tunnelled messages into per-device virtual endpoints.

pub mod connect;
pub mod error;
pub mod sink;
pub mod system;
pub mod tunnel_client;

pub use error::{AgentError, AgentResult};
pub use sink::{AgentSink, AgentSinkHandle, Dispatcher};
pub use system::System;
pub use tunnel_client::{TunnelClient, TunnelClientHandle};
