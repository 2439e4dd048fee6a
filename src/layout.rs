//! Auto-layout: derive an initial zone set from one frame's detections.
//!
//! Every detected vehicle box, expanded by a fixed margin, becomes a zone.
//! The generated list replaces the whole store; it is never merged with
//! existing zones.

use crate::detect::{Detection, VehicleLabels};
use crate::{Point, Polygon};

pub const DEFAULT_MARGIN: i32 = 5;

/// Result of an auto-layout pass.
pub struct AutoLayout {
    /// The replacement zone set, one polygon per detected vehicle.
    pub zones: Vec<Polygon>,
    /// Average vehicle box scaled 1.1x, the new fallback template
    /// dimensions. None when no vehicle was detected.
    pub manual_box: Option<(u32, u32)>,
}

/// Build zones from the frame's detections. Boxes are expanded by `margin`
/// on all sides; point order is top-left, bottom-left, bottom-right,
/// top-right so downstream centroid and containment logic sees the same
/// orientation as hand-drawn zones.
pub fn auto_layout(
    detections: &[Detection],
    vehicle_labels: &VehicleLabels,
    margin: i32,
) -> AutoLayout {
    let mut zones = Vec::new();
    let mut width_sum = 0.0f32;
    let mut height_sum = 0.0f32;

    for detection in detections {
        if !vehicle_labels.contains(&detection.label) {
            continue;
        }
        let x1 = detection.x1 as i32 - margin;
        let y1 = detection.y1 as i32 - margin;
        let x2 = detection.x2 as i32 + margin;
        let y2 = detection.y2 as i32 + margin;
        zones.push(Polygon::new(vec![
            Point::new(x1, y1),
            Point::new(x1, y2),
            Point::new(x2, y2),
            Point::new(x2, y1),
        ]));
        width_sum += detection.width();
        height_sum += detection.height();
    }

    let manual_box = if zones.is_empty() {
        None
    } else {
        let n = zones.len() as f32;
        Some((
            (width_sum / n * 1.1) as u32,
            (height_sum / n * 1.1) as u32,
        ))
    };

    AutoLayout { zones, manual_box }
}
