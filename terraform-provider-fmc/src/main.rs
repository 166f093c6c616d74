//! Terraform Provider for Cisco FMC
//!
//! Speaks the JSON-RPC rendition of the plugin protocol over stdin/stdout.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use terraform_provider_fmc::FmcProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Terraform Provider for Cisco FMC
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-fmc")]
#[command(about = "Terraform provider for Cisco Secure Firewall Management Center")]
struct Args {
    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, env = "TF_LOG_PROVIDER_FMC", default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries the protocol, logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Starting Terraform Provider for FMC");

    let provider = FmcProvider::new().context("Failed to create Tokio runtime")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let input = line.context("Failed to read input")?;
        if input.trim().is_empty() {
            continue;
        }

        let response = provider.handle_request(&input);
        writeln!(stdout_lock, "{}", response).context("Failed to write response")?;
        stdout_lock.flush().context("Failed to flush stdout")?;
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
