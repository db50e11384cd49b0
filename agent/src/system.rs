use crate::error::AgentResult;
use crate::sink::AgentSinkHandle;
use crate::tunnel_client::TunnelClientHandle;
use async_trait::async_trait;
use tunnel_protocol::NamedService;

/// The host embedding `tunnel-agent` (§6's agent-side mirror of
/// `ProxyHooks`). Every method has a default no-op body except
/// [`System::agent_services`], which a real host must override —
/// an agent with no announced services has nothing to offer a proxy.
#[async_trait]
pub trait System: Send + Sync {
    async fn register(&self) {}

    async fn unregister(&self) {}

    /// A device-facing sink was created or resurrected. Returning
    /// `Err` fails the tunnel-client's dispatch for that device.
    async fn bind_agent(&self, _agent: AgentSinkHandle) -> AgentResult<()> {
        Ok(())
    }

    async fn unbind_agent(&self, _agent: AgentSinkHandle) {}

    /// The services this agent hosts, announced via `TunnelWhoAmI` on
    /// every (re)connect.
    fn agent_services(&self) -> Vec<NamedService>;

    async fn add_tunnel(&self, _name: String, _tunnel: TunnelClientHandle) {}

    async fn remove_tunnel(&self, _name: String, _tunnel: TunnelClientHandle) {}
}
