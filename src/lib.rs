//! lotmon - parking lot occupancy monitor
//!
//! Two cooperating processes are built from this crate:
//!
//! - `lotmond` watches a video source, matches detected vehicles against a
//!   persisted set of parking-zone polygons, and serves the annotated frame
//!   plus occupancy statistics over TCP.
//! - `lot_relay` maintains a persistent connection to `lotmond` and fans the
//!   latest frame and statistics out to HTTP viewers.
//!
//! # Module Structure
//!
//! - `zones`: the persisted polygon store
//! - `annotate`: interactive zone editing (draw / remove / add-from-template)
//! - `layout`: auto-layout of zones from one frame's detections
//! - `detect`: the object-detector boundary
//! - `occupancy`: per-frame box-to-zone matching
//! - `capture`, `frame`, `render`: frame source, pixel buffer, overlay
//! - `state`, `stream`: shared latest-frame cell, wire protocol, producer,
//!   relay
//!
//! Geometry primitives shared by all of the above live at the crate root.

use serde::{Deserialize, Serialize};

pub mod annotate;
pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod layout;
pub mod occupancy;
pub mod render;
pub mod state;
pub mod stream;
pub mod zones;

pub use annotate::{AnnotationController, ClickOutcome, ControlEvent, Mode};
pub use capture::{CaptureConfig, FrameSource, SyntheticSource};
pub use detect::{Detection, Detector, StubDetector, VehicleLabels};
pub use frame::Frame;
pub use occupancy::{match_frame, FrameOccupancy, OccupancyReport};
pub use state::StateCell;
pub use stream::producer::{CurrentFrame, ProducerConfig, ProducerHandle, StreamProducer};
pub use stream::relay::{RelayHandle, RelayServer, RelayServerConfig, RelayState};
pub use zones::ZoneStore;

// -------------------- Geometry --------------------

/// A point in frame pixel coordinates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An ordered polygon in frame pixel coordinates. Insertion order is drawing
/// order; the last point connects back to the first.
///
/// Simple (non-self-intersecting) shape is assumed, not enforced.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arithmetic mean of the points. An empty polygon yields (0, 0).
    pub fn centroid(&self) -> (f64, f64) {
        if self.points.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.points.len() as f64;
        let sx: f64 = self.points.iter().map(|p| p.x as f64).sum();
        let sy: f64 = self.points.iter().map(|p| p.y as f64).sum();
        (sx / n, sy / n)
    }

    /// Ray-casting containment test treating the polygon as a closed loop.
    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon((p.x as f64, p.y as f64), &self.points)
    }

    /// Axis-aligned bounding box as (min_x, min_y, max_x, max_y).
    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some((min_x, min_y, max_x, max_y))
    }
}

/// Crossing-number test over the polygon's edge list. The edge from the last
/// point back to the first is included.
pub fn point_in_polygon(p: (f64, f64), points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let (px, py) = p;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (points[i].x as f64, points[i].y as f64);
        let (xj, yj) = (points[j].x as f64, points[j].y as f64);
        if (yi > py) != (yj > py) {
            let x_cross = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            Point::new(0, 0),
            Point::new(0, 10),
            Point::new(10, 10),
            Point::new(10, 0),
        ])
    }

    #[test]
    fn centroid_is_mean_of_points() {
        assert_eq!(square().centroid(), (5.0, 5.0));
    }

    #[test]
    fn containment_inside_and_outside() {
        let sq = square();
        assert!(sq.contains(Point::new(5, 5)));
        assert!(!sq.contains(Point::new(15, 5)));
        assert!(!sq.contains(Point::new(-1, 5)));
    }

    #[test]
    fn closing_edge_is_part_of_the_loop() {
        // Triangle whose closing edge runs from (10, 0) back to (0, 0).
        let tri = Polygon::new(vec![Point::new(0, 0), Point::new(5, 10), Point::new(10, 0)]);
        assert!(tri.contains(Point::new(5, 4)));
        assert!(!tri.contains(Point::new(0, 8)));
    }

    #[test]
    fn concave_polygon_can_exclude_its_own_centroid() {
        // U shape: the mean of the points lands in the notch.
        let u = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(0, 10),
            Point::new(12, 10),
            Point::new(12, 0),
            Point::new(9, 0),
            Point::new(9, 7),
            Point::new(3, 7),
            Point::new(3, 0),
        ]);
        let (cx, cy) = u.centroid();
        assert!(!u.contains(Point::new(cx.round() as i32, cy.round() as i32)));
    }

    #[test]
    fn degenerate_polygons_contain_nothing() {
        let line = Polygon::new(vec![Point::new(0, 0), Point::new(10, 0)]);
        assert!(!line.contains(Point::new(5, 0)));
        assert!(!Polygon::default().contains(Point::new(0, 0)));
    }

    #[test]
    fn polygon_serializes_as_point_array() {
        let json = serde_json::to_string(&square()).unwrap();
        assert!(json.starts_with('['));
        let back: Polygon = serde_json::from_str(&json).unwrap();
        assert_eq!(back, square());
    }
}
