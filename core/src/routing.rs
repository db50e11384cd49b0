//! The two message-received policies that make up the routing engine:
//! §4.2 (frontend, device -> backend) and §4.3 (backend, device <-
//! backend). Both are plain functions rather than methods on a
//! "handler" object — there is no generic pipeline framework here, just
//! the sequential per-connection stages described in §9's design notes.

use crate::backend::BackendHandle;
use crate::client::ClientHandle;
use crate::error::{CoreError, CoreResult};
use crate::registry::ProxyRegistry;
use tunnel_protocol::{decode_envelope, encode_envelope, Code, Message, TunnelEnvelope};

/// Frontend message-received policy (§4.2). Non-`Request` messages
/// pass straight through. A `Request` whose service id is bound is
/// wrapped `{device_id, message}` into a `Tunnel` envelope and forwarded
/// to the bound backend; `Ok(None)` means "consumed, nothing to
/// forward downstream". A `Request` with no bound service comes back
/// out as `Some(message)` so the caller can run the device's
/// registered dispatchers (invariant 5).
///
/// A send failure here is a forward-hop failure (error kind 3): the
/// caller should close the frontend context that produced it.
pub fn handle_frontend_message(client: &ClientHandle, mut message: Message) -> CoreResult<Option<Message>> {
    if message.code != Code::Request {
        return Ok(Some(message));
    }

    let Some(backend) = client.transproxy().bound_server(message.service) else {
        return Ok(Some(message));
    };

    // The envelope captures the message exactly as it arrived; only
    // afterwards is `message` itself repurposed into the outer Tunnel
    // frame, mirroring the reference implementation's sequencing.
    let envelope = TunnelEnvelope::new(client.device_id().clone(), message.clone());
    let content = encode_envelope(&envelope)?;

    message.code = Code::Tunnel;
    message.content = content;

    match backend.send_message(message) {
        Ok(()) => {
            tracing::debug!(device = %client.device_id(), "forwarded tunnel message to backend");
            Ok(None)
        }
        Err(err) => {
            tracing::warn!(device = %client.device_id(), "forwarding to backend failed: {err}");
            Err(err)
        }
    }
}

/// Backend message-received policy (§4.3). Non-`Tunnel` messages pass
/// straight through. A `Tunnel` envelope is decoded, its inner message
/// is stamped with this backend's `agent_id`, and delivered to the
/// addressed device. A missing device is a lookup miss (error kind 2):
/// logged and dropped, never queued (invariant 4). A decode failure is
/// unrecoverable for this connection (error kind 1). A send failure
/// after a successful lookup is this hop's forward failure (error kind
/// 3): the caller should close the backend context that produced it.
pub fn handle_backend_message(
    registry: &ProxyRegistry,
    backend: &BackendHandle,
    message: Message,
) -> CoreResult<Option<Message>> {
    if message.code != Code::Tunnel {
        return Ok(Some(message));
    }

    let envelope: TunnelEnvelope = decode_envelope(&message.content).map_err(CoreError::from)?;
    let TunnelEnvelope { device_id, mut inner } = envelope;

    let Some(client) = registry.lookup(&device_id) else {
        tracing::warn!(device = %device_id, "tunnel envelope for unknown device, dropping");
        return Ok(None);
    };

    inner.agent = backend.agent_id();

    match client.send_message(inner) {
        Ok(()) => Ok(None),
        Err(err) => {
            tracing::warn!(device = %device_id, "backward delivery failed: {err}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backend, Client};
    use tokio::sync::mpsc::unbounded_channel;
    use tunnel_protocol::DeviceId;

    fn client_with_channel(device: &str) -> (ClientHandle, tokio::sync::mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        (Client::new(DeviceId::new(device), tx), rx)
    }

    fn backend_with_channel(agent_id: u8) -> (BackendHandle, tokio::sync::mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        (Backend::new(agent_id, tx), rx)
    }

    #[test]
    fn request_with_bound_service_is_tunnelled_to_backend() {
        let (client, _client_rx) = client_with_channel("device-a");
        let (backend, mut backend_rx) = backend_with_channel(3);
        client.transproxy_bind(0, backend);

        let request = Message::request(0, b"hello".to_vec());
        let result = handle_frontend_message(&client, request.clone()).unwrap();
        assert!(result.is_none(), "bound request should be consumed");

        let forwarded = backend_rx.try_recv().unwrap();
        assert_eq!(forwarded.code, Code::Tunnel);
        let envelope: TunnelEnvelope = decode_envelope(&forwarded.content).unwrap();
        assert_eq!(envelope.device_id, DeviceId::new("device-a"));
        assert_eq!(envelope.inner, request);
    }

    #[test]
    fn request_with_no_bound_service_passes_through() {
        let (client, _rx) = client_with_channel("device-a");
        let request = Message::request(7, b"x".to_vec());
        let result = handle_frontend_message(&client, request.clone()).unwrap();
        assert_eq!(result, Some(request));
    }

    #[test]
    fn non_request_codes_pass_through() {
        let (client, _rx) = client_with_channel("device-a");
        let response = Message::response(0, b"y".to_vec());
        let result = handle_frontend_message(&client, response.clone()).unwrap();
        assert_eq!(result, Some(response));
    }

    #[test]
    fn send_failure_on_forward_hop_is_an_error() {
        let (client, _client_rx) = client_with_channel("device-a");
        let (tx, rx) = unbounded_channel();
        drop(rx); // close the backend's receiver so the send fails
        let backend = Backend::new(1, tx);
        client.transproxy_bind(0, backend);

        let request = Message::request(0, b"z".to_vec());
        assert!(handle_frontend_message(&client, request).is_err());
    }

    struct NoopHooks;
    #[async_trait::async_trait]
    impl crate::hooks::ProxyHooks for NoopHooks {}

    #[tokio::test]
    async fn tunnel_for_live_device_is_delivered_with_agent_stamped() {
        let registry = ProxyRegistry::new();
        let (client, mut client_rx) = client_with_channel("device-a");
        let hooks = NoopHooks;
        registry.add_client(&hooks, client.clone()).await.unwrap();

        let (backend, _backend_rx) = backend_with_channel(9);
        let inner = Message::response(0, b"reply".to_vec());
        let envelope = TunnelEnvelope::new(DeviceId::new("device-a"), inner.clone());
        let tunnel_message = Message::new(Code::Tunnel, 0, encode_envelope(&envelope).unwrap());

        let result = handle_backend_message(&registry, &backend, tunnel_message).unwrap();
        assert!(result.is_none());

        let delivered = client_rx.try_recv().unwrap();
        assert_eq!(delivered.agent, 9);
        assert_eq!(delivered.content, inner.content);
    }

    #[test]
    fn tunnel_for_unknown_device_is_dropped_not_queued() {
        let registry = ProxyRegistry::new();
        let (backend, mut backend_rx) = backend_with_channel(1);
        let envelope = TunnelEnvelope::new(DeviceId::new("nobody"), Message::response(0, vec![]));
        let tunnel_message = Message::new(Code::Tunnel, 0, encode_envelope(&envelope).unwrap());

        let result = handle_backend_message(&registry, &backend, tunnel_message).unwrap();
        assert!(result.is_none());
        assert!(backend_rx.try_recv().is_err());
    }

    #[test]
    fn non_tunnel_codes_pass_through_on_backend_side() {
        let registry = ProxyRegistry::new();
        let (backend, _rx) = backend_with_channel(1);
        let who_am_i = Message::new(Code::TunnelWhoAmI, 0, vec![]);
        let result = handle_backend_message(&registry, &backend, who_am_i.clone()).unwrap();
        assert_eq!(result, Some(who_am_i));
    }
}
