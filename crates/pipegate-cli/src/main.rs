//! PipeGate - a self-hosted reverse tunnel.
//!
//! Main entry point for the `pipegate` command line interface. This binary
//! is the process entry point the core spec treats as an external
//! collaborator (§1 "process entry points and flag parsing");
//! it does nothing but parse arguments, set up tracing, and hand off to
//! either the relay server (`pipegate-server`) or the tunnel client
//! (`pipegate-client`).

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{connect, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// PipeGate - a poor man's ngrok.
#[derive(Parser)]
#[command(name = "pipegate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit startup/status messages as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the public relay server (accepts tunnels and public HTTP traffic)
    Serve(serve::ServeArgs),

    /// Connect a local origin to a PipeGate server as a tunnel client
    Connect(connect::ConnectArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console-only structured logging (§6.3): this is a
    // short-lived, stdout/stderr-logged network service, not the
    // long-running desktop agent that warrants a rotating file sink.
    let filter = if cli.verbose {
        "pipegate=debug,pipegate_server=debug,pipegate_client=debug,info"
    } else {
        "pipegate=info,pipegate_server=info,pipegate_client=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Connect(args) => connect::run(args, &ctx).await,
    }
}
