use crate::error::{AgentError, AgentResult};
use crate::sink::{AgentSink, AgentSinkHandle};
use crate::system::System;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tunnel_protocol::{decode_envelope, encode_envelope, Code, DeviceId, Message, TunnelEnvelope, TunnelWhoAmI};

/// Counterpart to the proxy's `TunnelServer` handler (§4.5): one per
/// connection to a proxy's backend listener. Announces this agent's
/// services on activation and demultiplexes inbound `Tunnel` frames
/// into per-device [`AgentSink`]s.
pub struct TunnelClient {
    name: String,
    system: Arc<dyn System>,
    outbound: UnboundedSender<Message>,
    agents: DashMap<DeviceId, AgentSinkHandle>,
}

pub type TunnelClientHandle = Arc<TunnelClient>;

impl TunnelClient {
    pub fn new(name: String, system: Arc<dyn System>, outbound: UnboundedSender<Message>) -> TunnelClientHandle {
        Arc::new(Self {
            name,
            system,
            outbound,
            agents: DashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn system(&self) -> &Arc<dyn System> {
        &self.system
    }

    /// Send this agent's `TunnelWhoAmI` and register with the host
    /// system. Must be called once the underlying connection is up,
    /// before any inbound messages are processed.
    pub async fn activate(self: &Arc<Self>) -> AgentResult<()> {
        let who_am_i = TunnelWhoAmI {
            services: self.system.agent_services(),
        };
        let content = encode_envelope(&who_am_i)?;
        self.outbound
            .send(Message::new(Code::TunnelWhoAmI, 0, content))
            .map_err(|_| AgentError::SendFailed)?;

        self.system.add_tunnel(self.name.clone(), self.clone()).await;
        Ok(())
    }

    /// Tear down every sink this tunnel observed and unregister from
    /// the host system. Called once the connection drops.
    pub async fn deactivate(self: &Arc<Self>) {
        for entry in self.agents.iter() {
            entry.value().close();
        }
        self.system.remove_tunnel(self.name.clone(), self.clone()).await;
    }

    /// Get or lazily create (or resurrect) the sink for `device_id`,
    /// firing `System::bind_agent` exactly when a sink transitions
    /// from absent or closed into bound.
    pub async fn agent_or_create(self: &Arc<Self>, device_id: &DeviceId) -> AgentResult<AgentSinkHandle> {
        if let Some(existing) = self.agents.get(device_id) {
            let existing = existing.value().clone();
            if !existing.is_closed() {
                return Ok(existing);
            }
            self.system.bind_agent(existing.clone()).await?;
            existing.reopen();
            return Ok(existing);
        }

        let sink = AgentSink::new(device_id.clone(), Arc::downgrade(self));
        self.system.bind_agent(sink.clone()).await?;
        self.agents.insert(device_id.clone(), sink.clone());
        Ok(sink)
    }

    /// Wrap `message` for `device_id` in a `Tunnel` envelope and push
    /// it onto this connection's outbound queue. Used by `AgentSink`.
    pub(crate) fn send_message(&self, device_id: &DeviceId, message: Message) -> AgentResult<()> {
        let envelope = TunnelEnvelope::new(device_id.clone(), message);
        let content = encode_envelope(&envelope)?;
        self.outbound
            .send(Message::new(Code::Tunnel, 0, content))
            .map_err(|_| AgentError::SendFailed)
    }

    /// Message-received policy (§4.5). Non-`Tunnel` codes pass
    /// through. A `Tunnel` frame is decoded and handed to the
    /// addressed device's sink without blocking this call.
    pub async fn message_received(self: &Arc<Self>, message: Message) -> AgentResult<Option<Message>> {
        if message.code != Code::Tunnel {
            return Ok(Some(message));
        }

        let envelope: TunnelEnvelope = decode_envelope(&message.content)?;
        let sink = self.agent_or_create(&envelope.device_id).await?;
        sink.deliver(envelope.inner);
        Ok(None)
    }
}
