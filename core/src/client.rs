use crate::backend::BackendHandle;
use crate::error::{CoreError, CoreResult};
use crate::transproxy::TransProxyTable;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tunnel_protocol::{DeviceId, Message};

/// A request dispatcher a host installs on a device's session via
/// [`Client::add_service`]. Invoked for messages the routing core has
/// no bound backend for (invariant 5); returns `true` once it has
/// consumed the message.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, message: &Message) -> bool;
}

/// One frontend connection's state (§4.1): the device identity, its
/// per-device forwarding table (§4.2), and whatever request
/// dispatchers the host installed.
pub struct Client {
    device_id: DeviceId,
    outbound: UnboundedSender<Message>,
    transproxy: TransProxyTable,
    dispatchers: Mutex<Vec<Arc<dyn Dispatcher>>>,
    closed: CancellationToken,
}

pub type ClientHandle = Arc<Client>;

impl Client {
    pub fn new(device_id: DeviceId, outbound: UnboundedSender<Message>) -> ClientHandle {
        Arc::new(Self {
            device_id,
            outbound,
            transproxy: TransProxyTable::new(),
            dispatchers: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn transproxy(&self) -> &TransProxyTable {
        &self.transproxy
    }

    /// `true` if `self` and `other` are the exact same session (used
    /// for the eviction-safe compare-and-remove in invariant 1 / P5).
    pub fn is(&self, other: &ClientHandle) -> bool {
        std::ptr::eq(self, other.as_ref())
    }

    pub fn send_message(&self, message: Message) -> CoreResult<()> {
        self.outbound.send(message).map_err(|_| CoreError::SendFailed)
    }

    pub fn add_service(&self, dispatcher: Arc<dyn Dispatcher>) {
        self.dispatchers
            .lock()
            .expect("dispatcher list lock poisoned")
            .push(dispatcher);
    }

    pub fn remove_service(&self, dispatcher: &Arc<dyn Dispatcher>) {
        self.dispatchers
            .lock()
            .expect("dispatcher list lock poisoned")
            .retain(|d| !Arc::ptr_eq(d, dispatcher));
    }

    /// Run `message` (for which the routing core found no bound
    /// backend) through the registered dispatchers in installation
    /// order, stopping at the first one that consumes it.
    pub fn dispatch_unbound(&self, message: &Message) {
        let dispatchers = self
            .dispatchers
            .lock()
            .expect("dispatcher list lock poisoned")
            .clone();
        for dispatcher in dispatchers {
            if dispatcher.dispatch(message) {
                return;
            }
        }
        tracing::debug!(device = %self.device_id, service = message.service, "no dispatcher claimed message");
    }

    pub fn transproxy_bind(&self, service_id: u16, backend: BackendHandle) {
        self.transproxy.bind(service_id, backend);
    }

    pub fn transproxy_unbind(&self, service_id: u16) {
        self.transproxy.unbind(service_id);
    }

    /// Idempotently signal this session's connection task to tear
    /// down. Cancels in-flight sends and drives the `Inactive ->
    /// Unregistered` transition chain.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}
