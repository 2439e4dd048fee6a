//! Interactive zone annotation.
//!
//! A mode-based state machine turns operator pointer events into zone store
//! mutations. The three modes are mutually exclusive and every mode switch
//! drops any in-progress point buffer:
//!
//! - `DrawPolygon` (default): clicks buffer points; an explicit commit turns
//!   the buffer into a new zone and makes it the template.
//! - `RemoveZone`: a click removes every zone containing it, in one
//!   transaction.
//! - `AddFromTemplate`: a click stamps a congruent copy of the template
//!   polygon, translated so its centroid lands on the click.

use anyhow::{anyhow, Result};

use crate::zones::ZoneStore;
use crate::{Point, Polygon};

pub const DEFAULT_MANUAL_BOX: (u32, u32) = (80, 160);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    DrawPolygon,
    RemoveZone,
    AddFromTemplate,
}

/// What a pointer click did, for operator feedback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Draw mode: point buffered; count of pending points.
    PointBuffered(usize),
    /// Remove mode: zones removed in this transaction (0 if the click hit
    /// nothing; nothing was persisted in that case).
    ZonesRemoved(usize),
    /// Add mode: one congruent zone appended.
    ZoneAdded,
}

/// Discrete operator commands, mapped from the original key bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    CommitDraw,
    UndoLast,
    ClearAll,
    AutoLayout,
    SwitchDraw,
    SwitchRemove,
    SwitchAdd,
    Quit,
}

/// One line of the operator control surface: either a pointer click carrying
/// coordinates or a discrete command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    Click(Point),
    Command(Command),
}

impl ControlEvent {
    /// Parse one control line. `click X Y` is a pointer event; the
    /// single-letter commands keep the original bindings (`s` commit,
    /// `r` undo, `c` clear, `a` auto-layout, `d`/`x`/`b` mode switches,
    /// `q` quit). Unknown input is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();
        let mut parts = lower.split_whitespace();
        if parts.next() == Some("click") {
            let x: i32 = parts.next()?.parse().ok()?;
            let y: i32 = parts.next()?.parse().ok()?;
            return Some(ControlEvent::Click(Point::new(x, y)));
        }
        let command = match lower.as_str() {
            "s" => Command::CommitDraw,
            "r" => Command::UndoLast,
            "c" => Command::ClearAll,
            "a" => Command::AutoLayout,
            "d" => Command::SwitchDraw,
            "x" => Command::SwitchRemove,
            "b" => Command::SwitchAdd,
            "q" => Command::Quit,
            _ => return None,
        };
        Some(ControlEvent::Command(command))
    }
}

pub struct AnnotationController {
    mode: Mode,
    pending: Vec<Point>,
    template: Option<Polygon>,
    /// Fallback template dimensions, recomputed by auto-layout from the
    /// average detected vehicle box. Held until an operator commits a real
    /// template polygon.
    manual_box: (u32, u32),
}

impl Default for AnnotationController {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationController {
    pub fn new() -> Self {
        Self {
            mode: Mode::DrawPolygon,
            pending: Vec::new(),
            template: None,
            manual_box: DEFAULT_MANUAL_BOX,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pending_points(&self) -> &[Point] {
        &self.pending
    }

    pub fn template(&self) -> Option<&Polygon> {
        self.template.as_ref()
    }

    pub fn manual_box(&self) -> (u32, u32) {
        self.manual_box
    }

    pub fn set_manual_box(&mut self, size: (u32, u32)) {
        self.manual_box = size;
    }

    /// Switch modes. Always drops the in-progress point buffer.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.pending.clear();
    }

    /// Dispatch one pointer click according to the current mode.
    pub fn handle_click(&mut self, store: &mut ZoneStore, p: Point) -> Result<ClickOutcome> {
        match self.mode {
            Mode::DrawPolygon => {
                self.pending.push(p);
                Ok(ClickOutcome::PointBuffered(self.pending.len()))
            }
            Mode::RemoveZone => {
                let hits = store
                    .zones()
                    .iter()
                    .enumerate()
                    .filter(|(_, zone)| zone.contains(p))
                    .map(|(i, _)| i)
                    .collect();
                let removed = store.remove_at(&hits)?;
                if removed > 0 {
                    log::info!("removed {} zone(s) at ({}, {})", removed, p.x, p.y);
                }
                Ok(ClickOutcome::ZonesRemoved(removed))
            }
            Mode::AddFromTemplate => {
                let template = self.template.as_ref().ok_or_else(|| {
                    anyhow!("no template polygon available; draw and commit a polygon first")
                })?;
                let stamped = stamp_template(template, p);
                store.append(stamped)?;
                log::info!("added zone at ({}, {}) from template", p.x, p.y);
                Ok(ClickOutcome::ZoneAdded)
            }
        }
    }

    /// Commit the pending draw buffer as a new zone. The committed polygon
    /// becomes the template. Committing an empty buffer is a no-op.
    pub fn commit_draw(&mut self, store: &mut ZoneStore) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        let polygon = Polygon::new(std::mem::take(&mut self.pending));
        store.append(polygon.clone())?;
        log::info!("committed polygon with {} points as template", polygon.len());
        self.template = Some(polygon);
        Ok(true)
    }

    /// Pop the most recently appended zone. Silently ignored on an empty
    /// store.
    pub fn undo_last(&mut self, store: &mut ZoneStore) -> Result<bool> {
        store.undo_last()
    }

    pub fn clear_all(&mut self, store: &mut ZoneStore) -> Result<()> {
        store.clear()?;
        log::info!("all zones cleared");
        Ok(())
    }

    /// Live preview of the congruent shape the next add-mode click would
    /// create, following the pointer. None unless add mode is active and a
    /// template exists.
    pub fn preview_at(&self, p: Point) -> Option<Polygon> {
        if self.mode != Mode::AddFromTemplate {
            return None;
        }
        self.template.as_ref().map(|t| stamp_template(t, p))
    }
}

/// Congruent copy of `template`, translated so its centroid lands on
/// `target`: each point keeps its offset from the template centroid.
fn stamp_template(template: &Polygon, target: Point) -> Polygon {
    let (cx, cy) = template.centroid();
    let points = template
        .points
        .iter()
        .map(|p| {
            Point::new(
                (target.x as f64 + (p.x as f64 - cx)) as i32,
                (target.y as f64 + (p.y as f64 - cy)) as i32,
            )
        })
        .collect();
    Polygon::new(points)
}
