//! Object-detector boundary.
//!
//! The detector is an external collaborator: given a frame it returns
//! axis-aligned boxes with a class label and confidence. Model internals are
//! out of scope; this crate ships only the trait and a scripted stub used by
//! tests and the synthetic demo pipeline. Confidence is assumed to be
//! pre-thresholded by the detector wrapper.

use anyhow::Result;
use std::collections::HashSet;

use crate::frame::Frame;
use crate::{Point, Polygon};

/// One detected vehicle: box corners in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub label: String,
}

impl Detection {
    /// The box as a 4-point polygon in top-left, bottom-left, bottom-right,
    /// top-right order, matching zone orientation.
    pub fn box_polygon(&self) -> Polygon {
        Polygon::new(vec![
            Point::new(self.x1 as i32, self.y1 as i32),
            Point::new(self.x1 as i32, self.y2 as i32),
            Point::new(self.x2 as i32, self.y2 as i32),
            Point::new(self.x2 as i32, self.y1 as i32),
        ])
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// The class labels counted as vehicles when matching and auto-laying-out.
#[derive(Clone, Debug)]
pub struct VehicleLabels {
    labels: HashSet<String>,
}

impl VehicleLabels {
    pub fn new(labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

impl Default for VehicleLabels {
    fn default() -> Self {
        Self::new(
            [
                "car",
                "van",
                "truck",
                "bus",
                "bicycle",
                "tricycle",
                "awning-tricycle",
                "motor",
            ]
            .into_iter()
            .map(str::to_string),
        )
    }
}

/// Detector boundary. A failed call is fatal to the current frame only; the
/// caller skips that frame's occupancy update rather than crash.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Scripted detector: cycles through a fixed sequence of per-frame detection
/// lists. Stands in for a real model in tests and `stub://` pipelines.
pub struct StubDetector {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl StubDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// A stub that reports the same boxes every frame.
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self::new(vec![detections])
    }
}

impl Detector for StubDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.script[self.cursor % self.script.len()].clone();
        self.cursor += 1;
        Ok(out)
    }
}
