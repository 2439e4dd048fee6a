//! Annotation overlay for the streamed frame.
//!
//! Occupied zones are tinted red and free zones yellow (alpha-blended fills,
//! as the original feed showed them); pending draw points render as small
//! dots and the add-mode preview as a green outline.

use crate::frame::Frame;
use crate::occupancy::FrameOccupancy;
use crate::{Point, Polygon};

pub const OCCUPIED_TINT: [u8; 3] = [255, 0, 0];
pub const FREE_TINT: [u8; 3] = [255, 255, 0];
pub const PREVIEW_COLOR: [u8; 3] = [0, 255, 0];
pub const PENDING_COLOR: [u8; 3] = [255, 0, 0];
const TINT_ALPHA: f32 = 0.2;

/// Blend `color` over every pixel inside `polygon`, scanning only its
/// bounding box.
pub fn tint_polygon(frame: &mut Frame, polygon: &Polygon, color: [u8; 3], alpha: f32) {
    let Some((min_x, min_y, max_x, max_y)) = polygon.bounds() else {
        return;
    };
    let x0 = min_x.max(0) as u32;
    let y0 = min_y.max(0) as u32;
    let x1 = (max_x.min(frame.width() as i32 - 1)).max(0) as u32;
    let y1 = (max_y.min(frame.height() as i32 - 1)).max(0) as u32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            if polygon.contains(Point::new(x as i32, y as i32)) {
                let base = frame.get_pixel(x, y);
                let mut blended = [0u8; 3];
                for c in 0..3 {
                    blended[c] =
                        (base[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha) as u8;
                }
                frame.set_pixel(x, y, blended);
            }
        }
    }
}

/// Draw the closed outline of `polygon`.
pub fn outline_polygon(frame: &mut Frame, polygon: &Polygon, color: [u8; 3]) {
    let n = polygon.points.len();
    if n < 2 {
        return;
    }
    for i in 0..n {
        let a = polygon.points[i];
        let b = polygon.points[(i + 1) % n];
        draw_line(frame, a, b, color);
    }
}

/// Small filled dot at each pending draw point.
pub fn draw_points(frame: &mut Frame, points: &[Point], color: [u8; 3]) {
    for p in points {
        for dy in -2..=2i32 {
            for dx in -2..=2i32 {
                put_pixel(frame, p.x + dx, p.y + dy, color);
            }
        }
    }
}

/// Full overlay for one frame: zone fills plus any in-progress annotation.
pub fn annotate_frame(
    frame: &mut Frame,
    occupancy: &FrameOccupancy,
    pending: &[Point],
    preview: Option<&Polygon>,
) {
    for zone in &occupancy.occupied {
        tint_polygon(frame, zone, OCCUPIED_TINT, TINT_ALPHA);
    }
    for zone in &occupancy.free {
        tint_polygon(frame, zone, FREE_TINT, TINT_ALPHA);
    }
    draw_points(frame, pending, PENDING_COLOR);
    if let Some(shape) = preview {
        outline_polygon(frame, shape, PREVIEW_COLOR);
    }
}

fn draw_line(frame: &mut Frame, a: Point, b: Point, color: [u8; 3]) {
    // Bresenham.
    let (mut x, mut y) = (a.x, a.y);
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(frame, x, y, color);
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn put_pixel(frame: &mut Frame, x: i32, y: i32, color: [u8; 3]) {
    if x < 0 || y < 0 || x >= frame.width() as i32 || y >= frame.height() as i32 {
        return;
    }
    frame.set_pixel(x as u32, y as u32, color);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: i32, y: i32, side: i32) -> Polygon {
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x, y + side),
            Point::new(x + side, y + side),
            Point::new(x + side, y),
        ])
    }

    #[test]
    fn tint_blends_inside_and_leaves_outside() {
        let mut frame = Frame::filled(40, 40, [100, 100, 100]);
        tint_polygon(&mut frame, &square(5, 5, 10), [255, 0, 0], 0.2);
        assert_ne!(frame.get_pixel(8, 8), [100, 100, 100]);
        assert_eq!(frame.get_pixel(30, 30), [100, 100, 100]);
    }

    #[test]
    fn tint_clips_to_frame_bounds() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0]);
        // Polygon hanging off every edge must not panic.
        tint_polygon(&mut frame, &square(-10, -10, 60), [255, 255, 0], 0.5);
        assert_ne!(frame.get_pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn outline_touches_corners() {
        let mut frame = Frame::filled(40, 40, [0, 0, 0]);
        outline_polygon(&mut frame, &square(2, 2, 20), PREVIEW_COLOR);
        assert_eq!(frame.get_pixel(2, 2), PREVIEW_COLOR);
        assert_eq!(frame.get_pixel(22, 22), PREVIEW_COLOR);
        assert_eq!(frame.get_pixel(12, 12), [0, 0, 0]);
    }

    #[test]
    fn pending_points_render_even_near_edges() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]);
        draw_points(&mut frame, &[Point::new(0, 0)], PENDING_COLOR);
        assert_eq!(frame.get_pixel(0, 0), PENDING_COLOR);
        assert_eq!(frame.get_pixel(2, 2), PENDING_COLOR);
    }
}
