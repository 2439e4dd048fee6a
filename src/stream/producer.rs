//! Stream producer: serves the latest annotated frame + report over TCP.
//!
//! The processing loop publishes into a shared latest-frame cell; the serve
//! loop, on its own thread, accepts one relay connection at a time and sends
//! a length-prefixed message at a fixed cadence. There is no backlog: every
//! send snapshots whatever is current. A send failure tears down that
//! connection only; the producer keeps accepting.

use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::occupancy::OccupancyReport;
use crate::state::StateCell;
use crate::stream::{write_message, StreamMessage};

/// The producer's shared state: the single most recent annotated frame and
/// its report, continuously overwritten.
#[derive(Clone, Debug)]
pub struct CurrentFrame {
    pub frame: Frame,
    pub report: OccupancyReport,
}

#[derive(Clone, Debug)]
pub struct ProducerConfig {
    pub addr: String,
    pub jpeg_quality: u8,
    /// Send cadence for the active connection (~25 fps).
    pub frame_interval: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:9999".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            frame_interval: Duration::from_millis(40),
        }
    }
}

#[derive(Debug)]
pub struct ProducerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ProducerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream producer thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StreamProducer {
    cfg: ProducerConfig,
    state: StateCell<CurrentFrame>,
}

impl StreamProducer {
    pub fn new(cfg: ProducerConfig, state: StateCell<CurrentFrame>) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ProducerHandle> {
        let listener = TcpListener::bind(&self.cfg.addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let state = self.state;
        let join = std::thread::spawn(move || {
            serve(listener, cfg, state, shutdown_thread);
        });

        Ok(ProducerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn serve(
    listener: TcpListener,
    cfg: ProducerConfig,
    state: StateCell<CurrentFrame>,
    shutdown: Arc<AtomicBool>,
) {
    log::info!("stream producer listening");
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("relay connected from {}", peer);
                if let Err(err) = serve_connection(stream, &cfg, &state, &shutdown) {
                    log::warn!("relay connection dropped: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                log::error!("stream producer accept failed: {}", err);
                std::thread::sleep(Duration::from_millis(500));
            }
        }
    }
}

/// Serve one connection until it fails, the consumer hangs up, or shutdown.
fn serve_connection(
    mut stream: TcpStream,
    cfg: &ProducerConfig,
    state: &StateCell<CurrentFrame>,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    stream.set_nodelay(true)?;

    while !shutdown.load(Ordering::SeqCst) {
        // The message is built from whatever is current at send time and
        // discarded after transmission.
        if let Some(current) = state.snapshot() {
            let message = StreamMessage {
                frame: current.frame.encode_jpeg(cfg.jpeg_quality)?,
                stats: current.report,
            };
            write_message(&mut stream, &message)?;
        }
        std::thread::sleep(cfg.frame_interval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_stop_joins_the_serve_thread() {
        let producer = StreamProducer::new(
            ProducerConfig {
                addr: "127.0.0.1:0".to_string(),
                ..ProducerConfig::default()
            },
            StateCell::new(),
        );
        let handle = producer.spawn().expect("spawn producer");
        assert_ne!(handle.addr.port(), 0);
        handle.stop().expect("stop producer");
    }
}
