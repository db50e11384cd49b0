//! The backend pipeline (§6): a single `tunnel-server` handler above
//! the framing/codec layer (§4.3). A backend's first message must be
//! `TunnelWhoAmI`; everything after is either a `Tunnel` envelope bound
//! for some device or a framework-internal code passed through.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};
use tunnel_core::{handle_backend_message, Backend, ProxyHooks, ProxyRegistry};
use tunnel_protocol::{codec, decode_envelope, Code, Message, TunnelWhoAmI};

/// How long a backend has to send its `TunnelWhoAmI` before the
/// connection is abandoned (error kind 5, handshake/handler-init).
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(listener: TcpListener, registry: Arc<ProxyRegistry>, hooks: Arc<dyn ProxyHooks>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("backend accept failed: {err}");
                continue;
            }
        };

        let registry = registry.clone();
        let hooks = hooks.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer_addr, registry, hooks).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<ProxyRegistry>,
    hooks: Arc<dyn ProxyHooks>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(err) = codec::write_message(&mut writer, &message).await {
                warn!("backend write failed: {err}");
                break;
            }
        }
    });

    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, codec::read_message(&mut reader)).await;
    let who_am_i_message = match handshake {
        Ok(Ok(message)) if message.code == Code::TunnelWhoAmI => message,
        Ok(Ok(_)) => {
            warn!(%peer_addr, "tunnel-server: first message was not TunnelWhoAmI, closing");
            writer_task.abort();
            return;
        }
        Ok(Err(err)) => {
            warn!(%peer_addr, "tunnel-server: handshake read failed: {err}");
            writer_task.abort();
            return;
        }
        Err(_) => {
            warn!(%peer_addr, "tunnel-server: handshake timed out");
            writer_task.abort();
            return;
        }
    };

    let who_am_i: TunnelWhoAmI = match decode_envelope(&who_am_i_message.content) {
        Ok(who_am_i) => who_am_i,
        Err(err) => {
            warn!(%peer_addr, "tunnel-server: malformed TunnelWhoAmI: {err}");
            writer_task.abort();
            return;
        }
    };

    let agent_id = match registry.allocate_agent_id() {
        Ok(id) => id,
        Err(err) => {
            warn!(%peer_addr, "tunnel-server: refusing connection: {err}");
            writer_task.abort();
            return;
        }
    };

    let backend = Backend::new(agent_id, outbound_tx);
    info!(%peer_addr, agent_id, services = who_am_i.services.len(), "tunnel-server: handshake complete");

    if let Err(err) = hooks.bind_services(backend.clone(), who_am_i.services).await {
        warn!(agent_id, "tunnel-server: bind_services rejected, closing: {err}");
        registry.release_agent_id(agent_id);
        writer_task.abort();
        return;
    }

    loop {
        let message = match codec::read_message(&mut reader).await {
            Ok(message) => message,
            Err(err) => {
                debug!(agent_id, "backend read ended: {err}");
                break;
            }
        };

        match message.code {
            Code::Heartbeat => {
                if backend.send_message(Message::new(Code::HeartbeatAck, 0, Vec::new())).is_err() {
                    break;
                }
            }
            _ => match handle_backend_message(&registry, &backend, message) {
                Ok(_) => {}
                Err(err) => {
                    warn!(agent_id, "tunnel-server: malformed tunnel envelope, closing: {err}");
                    break;
                }
            },
        }
    }

    hooks.unbind_services(backend.clone()).await;
    registry.release_agent_id(agent_id);
    writer_task.abort();
}
