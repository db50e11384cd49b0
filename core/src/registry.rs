use crate::allocator::AgentIdAllocator;
use crate::client::ClientHandle;
use crate::error::CoreResult;
use crate::hooks::ProxyHooks;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tunnel_protocol::DeviceId;

/// Process-wide registry (§4.7): `device_id -> Client` plus the
/// agent-id pool. Guarded by `DashMap`'s sharded readers-writer locks
/// for the clients map, and a plain mutex for the allocator (whose
/// operations are non-blocking and O(1) amortized).
pub struct ProxyRegistry {
    clients: DashMap<DeviceId, ClientHandle>,
    allocator: Mutex<AgentIdAllocator>,
}

impl ProxyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: DashMap::new(),
            allocator: Mutex::new(AgentIdAllocator::new()),
        })
    }

    pub fn lookup(&self, device_id: &DeviceId) -> Option<ClientHandle> {
        self.clients.get(device_id).map(|entry| entry.value().clone())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn allocate_agent_id(&self) -> CoreResult<u8> {
        self.allocator.lock().expect("allocator lock poisoned").allocate()
    }

    pub fn release_agent_id(&self, id: u8) {
        self.allocator.lock().expect("allocator lock poisoned").release(id);
    }

    /// Install `client`, evicting whatever was previously registered
    /// for the same device id (invariant 1). Runs the full
    /// `add_client`/exactly-once-`remove_client` sequence against
    /// `hooks`: the evicted session (if any) is closed and its
    /// `remove_client` callback fires before the new session's
    /// `add_client` is called, and both happen outside the registry
    /// lock to avoid reentrancy deadlocks (§4.7).
    pub async fn add_client(
        self: &Arc<Self>,
        hooks: &dyn ProxyHooks,
        client: ClientHandle,
    ) -> CoreResult<()> {
        let evicted = self.clients.insert(client.device_id().clone(), client.clone());

        if let Some(evicted) = evicted {
            if !evicted.is(&client) {
                evicted.close();
                hooks.remove_client(evicted).await;
            }
        }

        hooks.add_client(client).await
    }

    /// Remove `device_id`'s entry iff it still refers to exactly
    /// `client` (eviction-safe compare-and-remove, invariant 1 / P5),
    /// then fire `remove_client` if it was actually removed here.
    pub async fn remove_client(&self, hooks: &dyn ProxyHooks, client: ClientHandle) {
        let removed = self
            .clients
            .remove_if(client.device_id(), |_, v| v.is(&client))
            .is_some();

        if removed {
            hooks.remove_client(client).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Client;
    use tokio::sync::mpsc::unbounded_channel;

    struct NoopHooks;
    #[async_trait::async_trait]
    impl ProxyHooks for NoopHooks {}

    fn client(device: &str) -> ClientHandle {
        let (tx, _rx) = unbounded_channel();
        Client::new(DeviceId::new(device), tx)
    }

    #[tokio::test]
    async fn at_most_one_client_per_device() {
        let registry = ProxyRegistry::new();
        let hooks = NoopHooks;
        let c1 = client("device-a");
        registry.add_client(&hooks, c1.clone()).await.unwrap();
        assert_eq!(registry.client_count(), 1);

        let c2 = client("device-a");
        registry.add_client(&hooks, c2.clone()).await.unwrap();
        assert_eq!(registry.client_count(), 1);

        let looked_up = registry.lookup(&DeviceId::new("device-a")).unwrap();
        assert!(looked_up.is(&c2));
        assert!(c1.is_closed(), "evicted session should be closed");
        assert!(!c2.is_closed());
    }

    #[tokio::test]
    async fn closing_the_evicted_session_does_not_remove_the_new_one() {
        let registry = ProxyRegistry::new();
        let hooks = NoopHooks;
        let c1 = client("device-a");
        registry.add_client(&hooks, c1.clone()).await.unwrap();
        let c2 = client("device-a");
        registry.add_client(&hooks, c2.clone()).await.unwrap();

        // #5 in the spec's scenario list: closing the evicted session
        // afterwards must not disturb the live one's registry entry.
        registry.remove_client(&hooks, c1).await;
        assert!(registry.lookup(&DeviceId::new("device-a")).unwrap().is(&c2));
    }

    #[tokio::test]
    async fn remove_client_is_a_no_op_for_a_non_matching_session() {
        let registry = ProxyRegistry::new();
        let hooks = NoopHooks;
        let live = client("device-a");
        registry.add_client(&hooks, live.clone()).await.unwrap();

        let stale = client("device-a");
        registry.remove_client(&hooks, stale).await;
        assert!(registry.lookup(&DeviceId::new("device-a")).unwrap().is(&live));
    }

    #[tokio::test]
    async fn remove_client_callback_fires_exactly_once_per_add() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingHooks {
            removes: AtomicUsize,
        }
        #[async_trait::async_trait]
        impl ProxyHooks for CountingHooks {
            async fn remove_client(&self, _client: ClientHandle) {
                self.removes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let registry = ProxyRegistry::new();
        let hooks = CountingHooks { removes: AtomicUsize::new(0) };

        let c1 = client("device-a");
        registry.add_client(&hooks, c1.clone()).await.unwrap();
        let c2 = client("device-a"); // evicts c1 -> one remove_client call
        registry.add_client(&hooks, c2.clone()).await.unwrap();
        assert_eq!(hooks.removes.load(Ordering::SeqCst), 1);

        registry.remove_client(&hooks, c2).await; // removes c2 -> a second call
        assert_eq!(hooks.removes.load(Ordering::SeqCst), 2);

        registry.remove_client(&hooks, c1).await; // c1 already gone, no-op
        assert_eq!(hooks.removes.load(Ordering::SeqCst), 2);
    }
}
