//! The default [`ProxyHooks`] implementation this binary installs.
//! Nothing in this repo needs bespoke host behavior, so it just logs
//! each callback at the severity the event deserves — a host embedding
//! `tunnel-core` as a library would replace this with its own.

use async_trait::async_trait;
use tracing::info;
use tunnel_core::{BackendHandle, ClientHandle, CoreResult, ProxyHooks};
use tunnel_protocol::NamedService;

pub struct LoggingHooks;

#[async_trait]
impl ProxyHooks for LoggingHooks {
    async fn register(&self) {
        info!("proxy registered");
    }

    async fn unregister(&self) {
        info!("proxy unregistered");
    }

    async fn bind_services(&self, backend: BackendHandle, services: Vec<NamedService>) -> CoreResult<()> {
        info!(agent_id = backend.agent_id(), count = services.len(), "backend announced services");
        backend.set_services(services);
        Ok(())
    }

    async fn unbind_services(&self, backend: BackendHandle) {
        info!(agent_id = backend.agent_id(), "backend disconnected");
    }

    async fn add_client(&self, client: ClientHandle) -> CoreResult<()> {
        info!(device = %client.device_id(), "device connected");
        Ok(())
    }

    async fn remove_client(&self, client: ClientHandle) {
        info!(device = %client.device_id(), "device disconnected");
    }
}
