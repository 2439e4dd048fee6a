//! lot_relay - occupancy stream relay
//!
//! Maintains a persistent connection to lotmond's frame stream, reconnecting
//! forever on a fixed delay, and fans the latest frame and statistics out to
//! HTTP viewers (live multipart feed, JSON stats, connection status).

use anyhow::Result;
use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Duration;

use lotmon::config::RelayConfig;
use lotmon::stream::relay::spawn_receiver;
use lotmon::{RelayServer, RelayServerConfig, RelayState};

#[derive(Parser, Debug)]
#[command(name = "lot_relay", about = "Parking lot occupancy stream relay")]
struct Args {
    /// Producer address to pull frames from (overrides config file).
    #[arg(long)]
    upstream: Option<String>,
    /// HTTP listen address for viewers (overrides config file).
    #[arg(long)]
    http_addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RelayConfig::load()?;
    if let Some(addr) = args.upstream {
        cfg.upstream_addr = addr;
    }
    if let Some(addr) = args.http_addr {
        cfg.http_addr = addr;
    }

    let state = RelayState::new();
    let server = RelayServer::new(
        RelayServerConfig {
            addr: cfg.http_addr.clone(),
            jpeg_quality: cfg.jpeg_quality,
            frame_interval: Duration::from_millis(40),
            placeholder_size: cfg.placeholder_size,
        },
        state.clone(),
    )
    .spawn()?;
    log::info!("viewer http server listening on {}", server.addr);

    let shutdown = server.shutdown_flag();
    let receiver = spawn_receiver(
        cfg.upstream_addr.clone(),
        state,
        cfg.reconnect_delay,
        shutdown.clone(),
    );
    log::info!(
        "pulling frames from {} (reconnect every {}s)",
        cfg.upstream_addr,
        cfg.reconnect_delay.as_secs()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    let _ = rx.recv();

    log::info!("shutting down");
    shutdown.store(true, Ordering::SeqCst);
    receiver
        .join()
        .map_err(|_| anyhow::anyhow!("receiver thread panicked"))?;
    server.stop()?;
    Ok(())
}
