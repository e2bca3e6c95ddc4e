//! Serve command - runs the public PipeGate relay server (C2-C5, C7).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;

use pipegate_server::{RateLimitConfig, Server, ServerConfig, TlsConfig};

use super::Context;

/// Arguments for the serve command (§6.2 `pipegate serve`).
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the public HTTP + WebSocket listener to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Shared bearer token clients must present at handshake. If unset, any
    /// token is accepted (local development only)
    #[arg(long, env = "PIPEGATE_CLIENT_TOKEN")]
    pub client_token: Option<String>,

    /// TLS private key file. Certificate loading itself is an external
    /// collaborator; the path is only carried through, never
    /// parsed here
    #[arg(long, requires = "ssl_certfile")]
    pub ssl_keyfile: Option<PathBuf>,

    /// TLS certificate file
    #[arg(long, requires = "ssl_keyfile")]
    pub ssl_certfile: Option<PathBuf>,

    /// Dispatch deadline D for a public request awaiting a tunnel response,
    /// in seconds (§4.4)
    #[arg(long, default_value_t = 30)]
    pub request_timeout_seconds: u64,

    /// Maximum buffered public request body size, in mebibytes
    #[arg(long, default_value_t = 10)]
    pub max_body_mb: u64,

    /// Per-IP rate limit, in requests per minute
    #[arg(long, default_value_t = 600)]
    pub rate_limit_rpm: u32,

    /// Disable per-IP rate limiting
    #[arg(long)]
    pub no_rate_limit: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let bind_address: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;

    if args.client_token.is_none() {
        let yellow = Style::new().yellow();
        eprintln!(
            "{}",
            yellow.apply_to(
                "warning: no --client-token configured; any bearer token will be accepted"
            )
        );
    }

    let mut config = ServerConfig::new(args.client_token)
        .with_bind_address(bind_address)
        .with_request_timeout(Duration::from_secs(args.request_timeout_seconds))
        .with_max_body_bytes((args.max_body_mb * 1024 * 1024) as usize)
        .with_rate_limit(RateLimitConfig {
            requests_per_minute: args.rate_limit_rpm,
            enabled: !args.no_rate_limit,
        });

    if let (Some(keyfile), Some(certfile)) = (args.ssl_keyfile, args.ssl_certfile) {
        config = config.with_tls(TlsConfig { keyfile, certfile });
    }

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({"event": "starting", "bind_address": bind_address.to_string()})
        );
    } else {
        let bold = Style::new().bold();
        println!(
            "{}",
            bold.apply_to(format!("pipegate serving on {bind_address}"))
        );
    }

    Server::new(config)
        .run()
        .await
        .context("server exited with an error")
}
