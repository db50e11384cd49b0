//! A minimal backend: announces a single `echo` service and replies to
//! every request with its own content. Exists to exercise `tunnel-agent`
//! end to end against a running `tunnel-server`.

use async_trait::async_trait;
use clap::Parser;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::info;
use tunnel_agent::{AgentResult, AgentSink, AgentSinkHandle, Dispatcher, System, TunnelClientHandle};
use tunnel_protocol::{Code, Message, NamedService};

#[derive(Parser, Debug)]
#[command(name = "echo-backend", about = "Toy tunnel-agent backend that echoes requests")]
struct Args {
    /// Address of the proxy's backend listener.
    #[arg(long, default_value = "127.0.0.1:15827")]
    proxy_addr: String,

    /// Service id this backend announces and answers on.
    #[arg(long, default_value_t = 1)]
    service_id: u16,

    /// Seconds to wait before reconnecting after a dropped connection.
    #[arg(long, default_value_t = 5)]
    reconnect_delay_secs: u64,
}

struct EchoSystem {
    service_id: u16,
}

#[async_trait]
impl System for EchoSystem {
    async fn bind_agent(&self, agent: AgentSinkHandle) -> AgentResult<()> {
        info!(device = %agent.device_id(), "binding echo dispatcher");
        agent.add_service(Arc::new(EchoDispatcher {
            sink: Arc::downgrade(&agent),
            service_id: self.service_id,
        }));
        Ok(())
    }

    async fn unbind_agent(&self, agent: AgentSinkHandle) {
        info!(device = %agent.device_id(), "unbound");
    }

    fn agent_services(&self) -> Vec<NamedService> {
        vec![NamedService::new(self.service_id, "echo")]
    }

    async fn add_tunnel(&self, name: String, _tunnel: TunnelClientHandle) {
        info!(name, "tunnel active");
    }
}

/// Echoes every `Request` on `service_id` back as a `Response`;
/// ignores everything else so other dispatchers on the same sink get
/// a turn.
struct EchoDispatcher {
    sink: Weak<AgentSink>,
    service_id: u16,
}

impl Dispatcher for EchoDispatcher {
    fn dispatch(&self, message: &Message) -> bool {
        if message.code != Code::Request || message.service != self.service_id {
            return false;
        }
        if let Some(sink) = self.sink.upgrade() {
            let _ = sink.send_message(Message::response(message.service, message.content.clone()));
        }
        true
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "echo_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    let system = Arc::new(EchoSystem {
        service_id: args.service_id,
    });

    tunnel_agent::connect::run(
        "echo-backend".to_string(),
        system,
        args.proxy_addr,
        Duration::from_secs(args.reconnect_delay_secs),
    )
    .await;
}
