//! Outbound connection lifecycle: dial the proxy's backend listener,
//! run one [`TunnelClient`] for as long as the socket stays up, and
//! reconnect with a fixed delay on failure. Mirrors the reconnect loop
//! idiom the GUI agent in this pack's teacher uses for its relay
//! connection, adapted to raw TCP and the `tunnel-protocol` codec.

use crate::error::AgentResult;
use crate::system::System;
use crate::tunnel_client::TunnelClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};
use tunnel_protocol::codec;

/// Dial `remote_addr` and run the tunnel client until the connection
/// drops, then wait `reconnect_delay` and try again. Runs forever;
/// callers that want to stop should drop/abort the task this is
/// spawned on.
pub async fn run(name: String, system: Arc<dyn System>, remote_addr: String, reconnect_delay: Duration) {
    loop {
        match connect_once(&name, system.clone(), &remote_addr).await {
            Ok(()) => debug!(%remote_addr, "tunnel connection closed, reconnecting"),
            Err(err) => warn!(%remote_addr, "tunnel connection failed: {err}"),
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

async fn connect_once(name: &str, system: Arc<dyn System>, remote_addr: &str) -> AgentResult<()> {
    let stream = TcpStream::connect(remote_addr).await?;
    info!(%remote_addr, "connected to proxy backend listener");

    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound_tx, mut outbound_rx) = unbounded_channel();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(err) = codec::write_message(&mut writer, &message).await {
                warn!("tunnel write failed: {err}");
                break;
            }
        }
    });

    let tunnel_client = TunnelClient::new(name.to_string(), system, outbound_tx);
    tunnel_client.activate().await?;

    loop {
        let message = match codec::read_message(&mut reader).await {
            Ok(message) => message,
            Err(err) => {
                debug!("tunnel read ended: {err}");
                break;
            }
        };

        if let Err(err) = tunnel_client.message_received(message).await {
            warn!("tunnel-client: malformed tunnel envelope, closing: {err}");
            break;
        }
    }

    tunnel_client.deactivate().await;
    writer_task.abort();
    Ok(())
}
