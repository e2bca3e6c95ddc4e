//! Connect command - runs the outbound tunnel client relay (C6).

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use url::Url;

use pipegate_client::{Relay, RelayConfig};

use super::Context;

/// Arguments for the connect command (§6.2 `pipegate connect`).
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Base URL of the local origin being tunneled, e.g. http://127.0.0.1:9090
    #[arg(long)]
    pub local_url: Url,

    /// The PipeGate server's WebSocket URL, including the connection id,
    /// e.g. ws://example.com/aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa
    #[arg(long)]
    pub server_url: Url,

    /// Bearer token presented at handshake
    #[arg(long, env = "PIPEGATE_CLIENT_TOKEN")]
    pub client_token: String,

    /// Disable automatic reconnection with exponential backoff
    #[arg(long)]
    pub no_reconnect: bool,

    /// Per-request timeout against the local origin, in seconds
    #[arg(long, default_value_t = 30)]
    pub origin_timeout_seconds: u64,
}

/// Run the connect command.
pub async fn run(args: ConnectArgs, ctx: &Context) -> Result<()> {
    let config = RelayConfig::new(
        args.local_url.clone(),
        args.server_url.clone(),
        args.client_token,
    )
    .with_reconnect(!args.no_reconnect)
    .with_origin_timeout(Duration::from_secs(args.origin_timeout_seconds));

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({
                "event": "connecting",
                "server_url": args.server_url.to_string(),
                "local_url": args.local_url.to_string(),
            })
        );
    } else {
        let bold = Style::new().bold();
        println!(
            "{}",
            bold.apply_to(format!("tunneling {} -> {}", args.server_url, args.local_url))
        );
    }

    let relay = Relay::new(config).context("failed to build relay")?;
    relay.run().await.context("relay exited with an error")
}
