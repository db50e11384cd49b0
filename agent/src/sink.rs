use crate::error::{AgentError, AgentResult};
use crate::tunnel_client::TunnelClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tunnel_protocol::{DeviceId, Message};

/// A request dispatcher a host installs on an [`AgentSink`] via
/// [`AgentSink::add_service`]. Returns `true` once it has consumed the
/// message.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, message: &Message) -> bool;
}

/// A virtual endpoint representing one device, as observed by a single
/// `TunnelClient` (§4.6). Created lazily on the first inbound message
/// for that device-id; deliveries for the same device-id are drained
/// in arrival order by one background task, so concurrent `Tunnel`
/// frames for this device never reorder even though the tunnel
/// client's own read loop never blocks on dispatch.
pub struct AgentSink {
    device_id: DeviceId,
    owner: Weak<TunnelClient>,
    inbound: UnboundedSender<Message>,
    dispatchers: Mutex<Vec<Arc<dyn Dispatcher>>>,
    closed: AtomicBool,
}

pub type AgentSinkHandle = Arc<AgentSink>;

impl AgentSink {
    pub(crate) fn new(device_id: DeviceId, owner: Weak<TunnelClient>) -> AgentSinkHandle {
        let (inbound_tx, mut inbound_rx) = unbounded_channel::<Message>();

        let sink = Arc::new(Self {
            device_id,
            owner,
            inbound: inbound_tx,
            dispatchers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let dispatch_sink = sink.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                dispatch_sink.run_dispatchers(&message);
            }
        });

        sink
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
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

    fn run_dispatchers(&self, message: &Message) {
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
        tracing::debug!(device = %self.device_id, "no dispatcher claimed tunnelled message");
    }

    /// Queue an inbound message for this sink's dispatch task. Never
    /// blocks the caller (the tunnel client's read loop).
    pub(crate) fn deliver(&self, message: Message) {
        if self.inbound.send(message).is_err() {
            tracing::warn!(device = %self.device_id, "dispatch task gone, dropping tunnelled message");
        }
    }

    /// Wrap `message` in a `Tunnel` envelope addressed to this sink's
    /// device and hand it to the owning tunnel client's connection.
    pub fn send_message(&self, message: Message) -> AgentResult<()> {
        let owner = self.owner.upgrade().ok_or(AgentError::SendFailed)?;
        owner.send_message(&self.device_id, message)
    }

    /// User-initiated close: unbinds this sink from its host system.
    /// Idempotent. A later inbound message for the same device-id
    /// resurrects the sink rather than silently dropping it (§4.6).
    pub fn close(self: &AgentSinkHandle) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            let sink = self.clone();
            tokio::spawn(async move {
                owner.system().unbind_agent(sink).await;
            });
        }
    }
}
