use crate::backend::BackendHandle;
use dashmap::DashMap;

/// Per-device forwarding table (§4.2): `service_id -> backend` and its
/// inverse projection `agent_id -> backend`, used to route a `Request`
/// forward and a `Response`/`Tunnel` backward respectively.
///
/// Lives inside each [`crate::Client`] — one table per frontend
/// connection — guarded by its own lock (here, `DashMap`'s internal
/// per-shard `RwLock`) rather than the process-wide registry lock,
/// since it is only ever touched by that device's own traffic plus
/// whichever backend is currently bound to it.
#[derive(Default)]
pub struct TransProxyTable {
    servers: DashMap<u16, BackendHandle>,
    tunnels: DashMap<u8, BackendHandle>,
}

impl TransProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `service_id` to `backend`. Last bind wins (P6); the
    /// `agent_id -> backend` projection is updated atomically with it.
    pub fn bind(&self, service_id: u16, backend: BackendHandle) {
        let agent_id = backend.agent_id();
        self.servers.insert(service_id, backend.clone());
        self.tunnels.insert(agent_id, backend);
    }

    /// Unbind `service_id`. A no-op if it was never bound. The
    /// `tunnels` entry is untouched — it is retired only when the
    /// backend itself disconnects, via [`Self::retire`].
    pub fn unbind(&self, service_id: u16) {
        self.servers.remove(&service_id);
    }

    pub fn bound_server(&self, service_id: u16) -> Option<BackendHandle> {
        self.servers.get(&service_id).map(|entry| entry.value().clone())
    }

    pub fn bound_tunnel(&self, agent_id: u8) -> Option<BackendHandle> {
        self.tunnels.get(&agent_id).map(|entry| entry.value().clone())
    }

    /// Retire the tunnel entry for a backend that has disconnected.
    pub fn retire(&self, agent_id: u8) {
        self.tunnels.remove(&agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backend;
    use tokio::sync::mpsc::unbounded_channel;

    fn backend(agent_id: u8) -> BackendHandle {
        let (tx, _rx) = unbounded_channel();
        Backend::new(agent_id, tx)
    }

    #[test]
    fn last_bind_wins() {
        let table = TransProxyTable::new();
        let b1 = backend(1);
        let b2 = backend(2);

        table.bind(0, b1.clone());
        table.bind(0, b2.clone());

        let bound = table.bound_server(0).unwrap();
        assert_eq!(bound.agent_id(), b2.agent_id());
        assert_eq!(table.bound_tunnel(1).unwrap().agent_id(), 1);
        assert_eq!(table.bound_tunnel(2).unwrap().agent_id(), 2);
    }

    #[test]
    fn unbind_unknown_is_a_no_op() {
        let table = TransProxyTable::new();
        table.unbind(99);
        assert!(table.bound_server(99).is_none());
    }

    #[test]
    fn unbind_only_removes_the_forward_entry() {
        let table = TransProxyTable::new();
        let b1 = backend(5);
        table.bind(3, b1);
        table.unbind(3);
        assert!(table.bound_server(3).is_none());
        assert!(table.bound_tunnel(5).is_some());
    }

    #[test]
    fn retire_removes_the_tunnel_entry() {
        let table = TransProxyTable::new();
        let b1 = backend(7);
        table.bind(4, b1);
        table.retire(7);
        assert!(table.bound_tunnel(7).is_none());
        // forward mapping is untouched by retire; the caller is
        // responsible for unbinding services separately.
        assert!(table.bound_server(4).is_some());
    }
}
