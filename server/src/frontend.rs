//! The frontend pipeline (§6): `profile → crypto-server(DH) → heartbeat
//! → trans-proxy → client-session`. There is no generic handler-chain
//! framework here (§9) — each stage is just a step of
//! [`handle_connection`], in order, named and logged as it runs.

use crate::crypto::DhHandshake;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};
use tunnel_core::{handle_frontend_message, Client, ProxyHooks, ProxyRegistry};
use tunnel_protocol::{codec, Code, Message};

pub async fn run(
    listener: TcpListener,
    registry: Arc<ProxyRegistry>,
    hooks: Arc<dyn ProxyHooks>,
    dh: Arc<DhHandshake>,
    heartbeat_interval: Duration,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("frontend accept failed: {err}");
                continue;
            }
        };

        let registry = registry.clone();
        let hooks = hooks.clone();
        let dh = dh.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer_addr, registry, hooks, dh, heartbeat_interval).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<ProxyRegistry>,
    hooks: Arc<dyn ProxyHooks>,
    dh: Arc<DhHandshake>,
    heartbeat_interval: Duration,
) {
    // `profile`: the bottom-most stage in the chain carries no routing
    // logic of its own here; it exists to keep the pipeline's shape
    // visible, same as the framework-internal handler it mirrors.
    debug!(%peer_addr, "profile: new frontend connection");

    let mut stream = stream;
    let device_id = match dh.server_handshake(&mut stream).await {
        Ok(id) => id,
        Err(err) => {
            warn!(%peer_addr, "crypto-server: handshake failed: {err}");
            return;
        }
    };
    info!(%peer_addr, device = %device_id, "crypto-server: device authenticated");

    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(err) = codec::write_message(&mut writer, &message).await {
                warn!("frontend write failed: {err}");
                break;
            }
        }
    });

    let client = Client::new(device_id.clone(), outbound_tx);

    if let Err(err) = registry.add_client(hooks.as_ref(), client.clone()).await {
        warn!(device = %device_id, "client-session: add_client rejected: {err}");
        client.close();
        writer_task.abort();
        return;
    }

    // `heartbeat`: a device that misses two consecutive intervals is
    // treated as dead; every other read just refreshes the deadline.
    let read_timeout = heartbeat_interval * 2;

    loop {
        let message = match tokio::time::timeout(read_timeout, codec::read_message(&mut reader)).await {
            Ok(Ok(message)) => message,
            Ok(Err(err)) => {
                debug!(device = %device_id, "frontend read ended: {err}");
                break;
            }
            Err(_) => {
                warn!(device = %device_id, "heartbeat: missed deadline, closing");
                break;
            }
        };

        match message.code {
            Code::Heartbeat => {
                if client.send_message(Message::new(Code::HeartbeatAck, 0, Vec::new())).is_err() {
                    break;
                }
            }
            _ => match handle_frontend_message(&client, message) {
                Ok(Some(unbound)) => {
                    // `client-session`: nothing downstream bound this
                    // service, so it falls to the device's own
                    // registered dispatchers.
                    client.dispatch_unbound(&unbound);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(device = %device_id, "trans-proxy: forward failed, closing: {err}");
                    break;
                }
            },
        }
    }

    registry.remove_client(hooks.as_ref(), client.clone()).await;
    client.close();
    writer_task.abort();
}
