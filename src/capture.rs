//! Frame sources.
//!
//! Video capture and decoding are external collaborators; this module
//! defines the source boundary plus a `stub://` synthetic source that loops
//! forever like the original looping video file. Real decoders plug in
//! behind `FrameSource`.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Source locator. `stub://<name>` selects the synthetic source.
    pub source: String,
    pub width: u32,
    pub height: u32,
    /// Target frame rate; the processing loop paces itself to this.
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: "stub://lot".to_string(),
            width: 960,
            height: 540,
            target_fps: 25,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Source of sequential frames. Sources loop rather than end.
pub trait FrameSource {
    fn connect(&mut self) -> Result<()>;
    fn next_frame(&mut self) -> Result<Frame>;
    fn stats(&self) -> CaptureStats;
}

pub fn open_source(config: CaptureConfig) -> Result<Box<dyn FrameSource + Send>> {
    if config.source.starts_with("stub://") {
        Ok(Box::new(SyntheticSource::new(config)))
    } else {
        Err(anyhow!(
            "unsupported capture source '{}' (only stub:// sources are built in)",
            config.source
        ))
    }
}

/// Deterministic parking-lot scene: asphalt background with dark vehicle
/// rectangles in fixed slots, one of which comes and goes so occupancy
/// actually changes over time.
pub struct SyntheticSource {
    config: CaptureConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    /// Slot boxes in frame coordinates, scaled to the configured size.
    /// The stub detector uses the same slots, so detections line up with
    /// the rendered scene.
    pub fn slot_boxes(width: u32, height: u32) -> Vec<(u32, u32, u32, u32)> {
        let slot_w = width / 8;
        let slot_h = height / 3;
        (0..4)
            .map(|i| {
                let x = width / 16 + i * (slot_w + width / 16);
                let y = height / 3;
                (x, y, x + slot_w, y + slot_h)
            })
            .collect()
    }

    /// The transient slot is vacant every other 100-frame period.
    pub fn transient_slot_present(frame_count: u64) -> bool {
        (frame_count / 100) % 2 == 0
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("capture: connected to {} (synthetic)", self.config.source);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let (w, h) = (self.config.width, self.config.height);
        let mut frame = Frame::filled(w, h, [70, 70, 72]);

        let slots = Self::slot_boxes(w, h);
        let present = Self::transient_slot_present(self.frame_count);
        for (i, &(x1, y1, x2, y2)) in slots.iter().enumerate() {
            if i == slots.len() - 1 && !present {
                continue;
            }
            let color = [30 + (i as u8) * 20, 30, 90];
            for y in y1..y2.min(h) {
                for x in x1..x2.min(w) {
                    frame.set_pixel(x, y, color);
                }
            }
        }
        Ok(frame)
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.source.clone(),
        }
    }
}
