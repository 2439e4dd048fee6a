//! Per-frame box-to-zone occupancy matching.
//!
//! A zone is occupied when some detection's box contains the zone polygon's
//! centroid. This is a deliberate approximation, not area overlap: downstream
//! consumers depend on its tie-breaking (first detection in iteration order
//! claims a zone) and on its behavior for concave zones whose centroid falls
//! outside their own outline.

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, VehicleLabels};
use crate::{point_in_polygon, Polygon};

/// Frame-local occupancy statistics. Never persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OccupancyReport {
    pub total_spaces: usize,
    pub free_spaces: usize,
    pub occupied_spaces: usize,
    /// Percentage of zones occupied, rounded to one decimal. 0 when there
    /// are no zones.
    pub occupancy_rate: f64,
}

impl OccupancyReport {
    pub fn from_counts(total: usize, free: usize) -> Self {
        let occupied = total - free;
        let rate = if total == 0 {
            0.0
        } else {
            (occupied as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            total_spaces: total,
            free_spaces: free,
            occupied_spaces: occupied,
            occupancy_rate: rate,
        }
    }
}

impl Default for OccupancyReport {
    fn default() -> Self {
        Self::from_counts(0, 0)
    }
}

/// Partition of the frame-start zone snapshot, in snapshot order within each
/// half, plus the derived report.
#[derive(Clone, Debug, Default)]
pub struct FrameOccupancy {
    pub occupied: Vec<Polygon>,
    pub free: Vec<Polygon>,
    pub report: OccupancyReport,
}

/// Match one frame's detections against a snapshot of the zone store.
///
/// Detections are filtered to the vehicle label set, then processed in order;
/// each claims every remaining candidate zone whose centroid its box
/// contains. A claimed zone leaves the candidate set, so at most one
/// detection claims a given zone. Whatever remains after all detections is
/// free.
pub fn match_frame(
    detections: &[Detection],
    zones: Vec<Polygon>,
    vehicle_labels: &VehicleLabels,
) -> FrameOccupancy {
    let total = zones.len();
    let mut candidates = zones;
    let mut occupied = Vec::new();

    for detection in detections {
        if !vehicle_labels.contains(&detection.label) {
            continue;
        }
        let car_box = detection.box_polygon();
        let mut still_free = Vec::with_capacity(candidates.len());
        for zone in candidates {
            // The centroid stays fractional for the containment test.
            let centroid = zone.centroid();
            if point_in_polygon(centroid, &car_box.points) {
                occupied.push(zone);
            } else {
                still_free.push(zone);
            }
        }
        candidates = still_free;
    }

    let report = OccupancyReport::from_counts(total, candidates.len());
    FrameOccupancy {
        occupied,
        free: candidates,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn zone_at(x: i32, y: i32) -> Polygon {
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x, y + 20),
            Point::new(x + 20, y + 20),
            Point::new(x + 20, y),
        ])
    }

    fn car_over(x: i32, y: i32) -> Detection {
        Detection {
            x1: x as f32,
            y1: y as f32,
            x2: (x + 30) as f32,
            y2: (y + 30) as f32,
            confidence: 0.9,
            label: "car".to_string(),
        }
    }

    #[test]
    fn one_car_over_middle_zone_of_three() {
        let zones = vec![zone_at(0, 0), zone_at(100, 0), zone_at(200, 0)];
        // Box covering zone #1's centroid (110, 10) only.
        let result = match_frame(&[car_over(95, -5)], zones, &VehicleLabels::default());
        assert_eq!(result.report.total_spaces, 3);
        assert_eq!(result.report.free_spaces, 2);
        assert_eq!(result.report.occupied_spaces, 1);
        assert_eq!(result.report.occupancy_rate, 33.3);
        assert_eq!(result.occupied, vec![zone_at(100, 0)]);
    }

    #[test]
    fn two_detections_over_one_zone_count_it_once() {
        let zones = vec![zone_at(0, 0)];
        let dets = vec![car_over(-5, -5), car_over(-2, -2)];
        let result = match_frame(&dets, zones, &VehicleLabels::default());
        assert_eq!(result.report.occupied_spaces, 1);
        assert_eq!(result.occupied.len(), 1);
        assert!(result.free.is_empty());
    }

    #[test]
    fn one_detection_can_claim_several_zones() {
        let zones = vec![zone_at(0, 0), zone_at(25, 0)];
        let wide = Detection {
            x1: -5.0,
            y1: -5.0,
            x2: 60.0,
            y2: 30.0,
            confidence: 0.9,
            label: "truck".to_string(),
        };
        let result = match_frame(&[wide], zones, &VehicleLabels::default());
        assert_eq!(result.report.occupied_spaces, 2);
        assert_eq!(result.report.occupancy_rate, 100.0);
    }

    #[test]
    fn fractional_centroid_is_matched_without_rounding() {
        // Centroid (-0.5, 10) sits left of a box starting at x = 0. An
        // integer-truncated centroid would land on 0 and falsely match.
        let zone = Polygon::new(vec![
            Point::new(-2, 0),
            Point::new(-2, 20),
            Point::new(1, 20),
            Point::new(1, 0),
        ]);
        let result = match_frame(&[car_over(0, -5)], vec![zone], &VehicleLabels::default());
        assert_eq!(result.report.free_spaces, 1);
        assert_eq!(result.report.occupied_spaces, 0);
    }

    #[test]
    fn non_vehicle_labels_are_ignored() {
        let zones = vec![zone_at(0, 0)];
        let mut person = car_over(-5, -5);
        person.label = "person".to_string();
        let result = match_frame(&[person], zones, &VehicleLabels::default());
        assert_eq!(result.report.free_spaces, 1);
    }

    #[test]
    fn empty_store_yields_zero_rate() {
        let result = match_frame(&[car_over(0, 0)], Vec::new(), &VehicleLabels::default());
        assert_eq!(result.report.total_spaces, 0);
        assert_eq!(result.report.occupancy_rate, 0.0);
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(OccupancyReport::from_counts(3, 1).occupancy_rate, 66.7);
        assert_eq!(OccupancyReport::from_counts(6, 5).occupancy_rate, 16.7);
    }

    #[test]
    fn report_serializes_with_wire_field_names() {
        let json = serde_json::to_string(&OccupancyReport::from_counts(3, 2)).unwrap();
        for key in [
            "total_spaces",
            "free_spaces",
            "occupied_spaces",
            "occupancy_rate",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }
}
