//! Stream relay: persistent client to the producer plus the HTTP viewer
//! surface.
//!
//! The receive loop connects to the producer, reads framed messages, and
//! publishes the decoded frame + stats as the relay's current state. Any
//! transport fault marks the relay disconnected and schedules a reconnect
//! after a fixed delay, forever. The HTTP side serves each viewer on its own
//! thread; viewer streams are independent of each other and of the upstream
//! connection.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::occupancy::OccupancyReport;
use crate::state::StateCell;
use crate::stream::FramedReader;

const MAX_REQUEST_BYTES: usize = 8192;
const MULTIPART_BOUNDARY: &str = "frame";
/// Pause between placeholder frames while nothing has arrived yet.
const IDLE_FRAME_DELAY: Duration = Duration::from_millis(500);

/// Decoded frame + stats pair published by the receive loop.
#[derive(Clone, Debug)]
pub struct RelayFrame {
    pub frame: Frame,
    pub report: OccupancyReport,
}

/// Shared between the receive loop (single writer) and every viewer thread.
#[derive(Clone)]
pub struct RelayState {
    latest: StateCell<RelayFrame>,
    connected: Arc<AtomicBool>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            latest: StateCell::new(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::SeqCst);
    }

    pub fn publish(&self, frame: Frame, report: OccupancyReport) {
        self.latest.publish(RelayFrame { frame, report });
    }

    pub fn snapshot(&self) -> Option<RelayFrame> {
        self.latest.snapshot()
    }
}

/// Spawn the reconnect-forever receive loop. Returns the thread handle; the
/// loop exits only when `shutdown` is set.
pub fn spawn_receiver(
    upstream: String,
    state: RelayState,
    reconnect_delay: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::SeqCst) {
            log::info!("connecting to producer at {}", upstream);
            match receive_stream(&upstream, &state, &shutdown) {
                Ok(()) => break, // shutdown requested mid-stream
                Err(err) => {
                    log::warn!("stream connection error: {}", err);
                }
            }
            state.set_connected(false);
            // Fixed-delay retry, sliced so shutdown stays responsive.
            let wait_until = Instant::now() + reconnect_delay;
            while Instant::now() < wait_until && !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        state.set_connected(false);
    })
}

fn receive_stream(upstream: &str, state: &RelayState, shutdown: &AtomicBool) -> Result<()> {
    // No read timeout: a framed read on an open-but-quiet connection waits
    // for the peer. Only a close or transport error is a connection fault.
    let stream = TcpStream::connect(upstream)?;
    state.set_connected(true);
    log::info!("connected to producer");

    let mut reader = FramedReader::new(stream);
    while !shutdown.load(Ordering::SeqCst) {
        let message = reader.read_message()?;
        let frame = Frame::decode_jpeg(&message.frame)?;
        state.publish(frame, message.stats);
    }
    Ok(())
}

// -------------------- HTTP viewer surface --------------------

#[derive(Clone, Debug)]
pub struct RelayServerConfig {
    pub addr: String,
    pub jpeg_quality: u8,
    /// Cap on the per-viewer multipart frame rate.
    pub frame_interval: Duration,
    /// Placeholder dimensions before the first upstream frame.
    pub placeholder_size: (u32, u32),
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            frame_interval: Duration::from_millis(40),
            placeholder_size: (960, 540),
        }
    }
}

#[derive(Debug)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("relay server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RelayServer {
    cfg: RelayServerConfig,
    state: RelayState,
}

impl RelayServer {
    pub fn new(cfg: RelayServerConfig, state: RelayState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let listener = TcpListener::bind(&self.cfg.addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let state = self.state;
        let join = std::thread::spawn(move || {
            accept_viewers(listener, cfg, state, shutdown_thread);
        });

        Ok(RelayHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn accept_viewers(
    listener: TcpListener,
    cfg: RelayServerConfig,
    state: RelayState,
    shutdown: Arc<AtomicBool>,
) {
    log::info!("relay http server listening");
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                // Each viewer runs on its own thread so one slow multipart
                // stream never stalls another viewer or the receive loop.
                let cfg = cfg.clone();
                let state = state.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_viewer(stream, &cfg, &state, &shutdown) {
                        log::debug!("viewer connection ended: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                log::error!("relay accept failed: {}", err);
                std::thread::sleep(Duration::from_millis(500));
            }
        }
    }
}

fn handle_viewer(
    mut stream: TcpStream,
    cfg: &RelayServerConfig,
    state: &RelayState,
    shutdown: &AtomicBool,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }
    match request.path.as_str() {
        "/" => write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML),
        "/stats" => {
            let report = state
                .snapshot()
                .map(|latest| latest.report)
                .unwrap_or_default();
            let body = serde_json::to_vec(&report)?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        "/connection_status" => {
            let body = serde_json::json!({ "connected": state.connected() }).to_string();
            write_json_response(&mut stream, 200, &body)
        }
        "/video_feed" => stream_video(stream, cfg, state, shutdown),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

/// Continuous multipart/x-mixed-replace stream of the current frame,
/// re-encoded at a capped rate. Serves a placeholder until the first
/// upstream frame arrives. Runs until the viewer hangs up or shutdown.
fn stream_video(
    mut stream: TcpStream,
    cfg: &RelayServerConfig,
    state: &RelayState,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\n\r\n",
        MULTIPART_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let (pw, ph) = cfg.placeholder_size;
    let placeholder = Frame::placeholder(pw, ph).encode_jpeg(cfg.jpeg_quality)?;

    let mut last_sent = Instant::now() - cfg.frame_interval;
    while !shutdown.load(Ordering::SeqCst) {
        if last_sent.elapsed() < cfg.frame_interval {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        match state.snapshot() {
            Some(latest) => {
                let jpeg = latest.frame.encode_jpeg(cfg.jpeg_quality)?;
                write_part(&mut stream, &jpeg)?;
                last_sent = Instant::now();
            }
            None => {
                write_part(&mut stream, &placeholder)?;
                last_sent = Instant::now();
                std::thread::sleep(IDLE_FRAME_DELAY);
            }
        }
    }
    Ok(())
}

fn write_part(stream: &mut TcpStream, jpeg: &[u8]) -> Result<()> {
    let part_header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MULTIPART_BOUNDARY,
        jpeg.len()
    );
    stream.write_all(part_header.as_bytes())?;
    stream.write_all(jpeg)?;
    stream.write_all(b"\r\n")?;
    Ok(())
}

// -------------------- Minimal HTTP plumbing --------------------

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    #[allow(dead_code)]
    headers: HashMap<String, String>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

/// Minimal viewer page: live feed plus polled statistics.
const INDEX_HTML: &[u8] = br#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Parking Lot Monitor</title></head>
<body>
<h1>Parking Lot Monitor</h1>
<img src="/video_feed" alt="live feed" style="max-width:100%">
<pre id="stats">loading...</pre>
<pre id="link">checking stream...</pre>
<script>
async function poll() {
  try {
    const stats = await (await fetch('/stats')).json();
    document.getElementById('stats').textContent = JSON.stringify(stats, null, 2);
    const link = await (await fetch('/connection_status')).json();
    document.getElementById('link').textContent =
      link.connected ? 'stream connected' : 'stream disconnected';
  } catch (e) {
    document.getElementById('link').textContent = 'relay unreachable';
  }
}
poll();
setInterval(poll, 1500);
</script>
</body>
</html>
"#;
