use crate::backend::BackendHandle;
use crate::client::ClientHandle;
use crate::error::CoreResult;
use async_trait::async_trait;
use tunnel_protocol::NamedService;

/// User-facing callback contract (§6) for the host embedding the
/// proxy. Every method has a default no-op body so a host only
/// overrides the ones it cares about. Callbacks are always invoked
/// outside the registry lock (§4.7), so they may freely call back into
/// [`crate::ProxyRegistry`].
#[async_trait]
pub trait ProxyHooks: Send + Sync {
    /// Called once at startup.
    async fn register(&self) {}

    async fn unregister(&self) {}

    /// A backend completed its `TunnelWhoAmI` handshake and announced
    /// `services`. Returning `Err` closes the backend's pipeline
    /// (error kind 4).
    async fn bind_services(&self, _backend: BackendHandle, _services: Vec<NamedService>) -> CoreResult<()> {
        Ok(())
    }

    /// A backend is about to disconnect.
    async fn unbind_services(&self, _backend: BackendHandle) {}

    /// A device completed its handshake and was installed into the
    /// registry. Returning `Err` fails the frontend pipeline before it
    /// reaches `Active` (error kind 5).
    async fn add_client(&self, _client: ClientHandle) -> CoreResult<()> {
        Ok(())
    }

    /// A device's session is tearing down. Fired exactly once per
    /// `add_client`, including for the client an eviction replaced.
    async fn remove_client(&self, _client: ClientHandle) {}
}
