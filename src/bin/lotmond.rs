//! lotmond - parking lot monitor daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source
//! 2. Runs vehicle detection and matches boxes against the zone store
//! 3. Applies operator annotation commands read from stdin
//! 4. Renders the occupancy overlay onto each frame
//! 5. Serves the latest frame + statistics to the relay over TCP

use anyhow::Result;
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use lotmon::annotate::Command;
use lotmon::capture::{open_source, CaptureConfig};
use lotmon::config::MonitorConfig;
use lotmon::detect::Detection;
use lotmon::layout::auto_layout;
use lotmon::render::annotate_frame;
use lotmon::detect::Detector;
use lotmon::{
    match_frame, AnnotationController, ControlEvent, CurrentFrame, FrameOccupancy, Mode, Point,
    ProducerConfig, StateCell, StreamProducer, StubDetector, SyntheticSource, VehicleLabels,
    ZoneStore,
};

#[derive(Parser, Debug)]
#[command(name = "lotmond", about = "Parking lot occupancy monitor daemon")]
struct Args {
    /// Zone store path (overrides config file).
    #[arg(long)]
    zones_path: Option<PathBuf>,
    /// Capture source locator, e.g. stub://lot (overrides config file).
    #[arg(long)]
    source: Option<String>,
    /// TCP listen address for the frame stream (overrides config file).
    #[arg(long)]
    stream_addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = MonitorConfig::load()?;
    if let Some(path) = args.zones_path {
        cfg.zones_path = path;
    }
    if let Some(source) = args.source {
        cfg.capture.source = source;
    }
    if let Some(addr) = args.stream_addr {
        cfg.stream_addr = addr;
    }

    let mut store = ZoneStore::open(&cfg.zones_path)?;
    log::info!(
        "zone store {} loaded with {} zone(s)",
        cfg.zones_path.display(),
        store.len()
    );

    let labels = if cfg.vehicle_labels.is_empty() {
        VehicleLabels::default()
    } else {
        VehicleLabels::new(cfg.vehicle_labels.iter().cloned())
    };

    let mut source = open_source(cfg.capture.clone())?;
    source.connect()?;
    let mut detector = StubDetector::new(scene_script(&cfg.capture));

    let state: StateCell<CurrentFrame> = StateCell::new();
    let producer = StreamProducer::new(
        ProducerConfig {
            addr: cfg.stream_addr.clone(),
            jpeg_quality: cfg.jpeg_quality,
            frame_interval: Duration::from_millis(1000 / cfg.capture.target_fps as u64),
        },
        state.clone(),
    )
    .spawn()?;
    log::info!("frame stream listening on {}", producer.addr);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })?;

    let control_rx = spawn_control_reader();

    let mut controller = AnnotationController::new();
    let mut last_detections: Vec<Detection> = Vec::new();
    let mut last_pointer: Option<Point> = None;
    let mut occupancy = FrameOccupancy::default();
    let mut last_health_log = Instant::now();
    let frame_interval = Duration::from_millis(1000 / cfg.capture.target_fps as u64);

    log::info!("lotmond running; stdin controls: click X Y, s/r/c/a/d/x/b/q");
    while !shutdown.load(Ordering::SeqCst) {
        let frame_start = Instant::now();

        while let Ok(event) = control_rx.try_recv() {
            if handle_control(event, &mut controller, &mut store, &last_detections, &labels, &cfg)?
            {
                shutdown.store(true, Ordering::SeqCst);
            }
            if let ControlEvent::Click(p) = event {
                last_pointer = Some(p);
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let mut frame = source.next_frame()?;

        match detector.detect(&frame) {
            Ok(detections) => {
                occupancy = match_frame(&detections, store.snapshot(), &labels);
                last_detections = detections;
            }
            Err(e) => {
                // Keep the previous occupancy rather than report an empty lot.
                log::warn!("detector failed, skipping occupancy update: {}", e);
            }
        }

        let preview = last_pointer.and_then(|p| controller.preview_at(p));
        annotate_frame(
            &mut frame,
            &occupancy,
            controller.pending_points(),
            preview.as_ref(),
        );
        state.publish(CurrentFrame {
            frame,
            report: occupancy.report.clone(),
        });

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "capture frames={} source={} zones={} occupancy={}%",
                stats.frames_captured,
                stats.source,
                store.len(),
                occupancy.report.occupancy_rate
            );
            last_health_log = Instant::now();
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }

    log::info!("shutting down");
    producer.stop()?;
    Ok(())
}

/// Apply one operator event. Returns true when the operator asked to quit.
fn handle_control(
    event: ControlEvent,
    controller: &mut AnnotationController,
    store: &mut ZoneStore,
    last_detections: &[Detection],
    labels: &VehicleLabels,
    cfg: &MonitorConfig,
) -> Result<bool> {
    match event {
        ControlEvent::Click(p) => {
            if let Err(e) = controller.handle_click(store, p) {
                log::warn!("click at ({}, {}) rejected: {}", p.x, p.y, e);
            }
        }
        ControlEvent::Command(Command::CommitDraw) => {
            controller.commit_draw(store)?;
        }
        ControlEvent::Command(Command::UndoLast) => {
            controller.undo_last(store)?;
        }
        ControlEvent::Command(Command::ClearAll) => {
            controller.clear_all(store)?;
        }
        ControlEvent::Command(Command::AutoLayout) => {
            let layout = auto_layout(last_detections, labels, cfg.auto_layout_margin);
            log::info!(
                "auto-layout replacing {} zone(s) with {}",
                store.len(),
                layout.zones.len()
            );
            store.replace_all(layout.zones)?;
            if let Some(size) = layout.manual_box {
                controller.set_manual_box(size);
            }
        }
        ControlEvent::Command(Command::SwitchDraw) => controller.set_mode(Mode::DrawPolygon),
        ControlEvent::Command(Command::SwitchRemove) => controller.set_mode(Mode::RemoveZone),
        ControlEvent::Command(Command::SwitchAdd) => controller.set_mode(Mode::AddFromTemplate),
        ControlEvent::Command(Command::Quit) => return Ok(true),
    }
    Ok(false)
}

/// Read operator control lines from stdin on a dedicated thread. The channel
/// closes on EOF; the processing loop just stops seeing events.
fn spawn_control_reader() -> mpsc::Receiver<ControlEvent> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Some(event) = ControlEvent::parse(&line) {
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

/// Detection script matching the synthetic scene, so the stub pipeline shows
/// real occupancy changes. The transient slot's 200-frame period divides the
/// script length, keeping the cycle aligned after wrap-around.
fn scene_script(capture: &CaptureConfig) -> Vec<Vec<Detection>> {
    let slots = SyntheticSource::slot_boxes(capture.width, capture.height);
    (1..=200u64)
        .map(|frame_count| {
            let present = SyntheticSource::transient_slot_present(frame_count);
            slots
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != slots.len() - 1 || present)
                .map(|(_, &(x1, y1, x2, y2))| Detection {
                    x1: x1 as f32,
                    y1: y1 as f32,
                    x2: x2 as f32,
                    y2: y2 as f32,
                    confidence: 0.9,
                    label: "car".to_string(),
                })
                .collect()
        })
        .collect()
}
