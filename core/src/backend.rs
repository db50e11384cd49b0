use crate::error::{CoreError, CoreResult};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tunnel_protocol::{Message, NamedService};

/// A connected backend, as seen from the routing core: its assigned
/// `agent_id` (§3, §4.4), the services it announced in its
/// `TunnelWhoAmI`, and a channel to its outbound pipeline.
pub struct Backend {
    agent_id: u8,
    outbound: UnboundedSender<Message>,
    services: Mutex<Vec<NamedService>>,
}

pub type BackendHandle = Arc<Backend>;

impl Backend {
    pub fn new(agent_id: u8, outbound: UnboundedSender<Message>) -> BackendHandle {
        Arc::new(Self {
            agent_id,
            outbound,
            services: Mutex::new(Vec::new()),
        })
    }

    pub fn agent_id(&self) -> u8 {
        self.agent_id
    }

    pub fn set_services(&self, services: Vec<NamedService>) {
        *self.services.lock().expect("backend services lock poisoned") = services;
    }

    pub fn services(&self) -> Vec<NamedService> {
        self.services.lock().expect("backend services lock poisoned").clone()
    }

    /// Queue `message` on this backend's outbound pipeline.
    pub fn send_message(&self, message: Message) -> CoreResult<()> {
        self.outbound.send(message).map_err(|_| CoreError::SendFailed)
    }
}
