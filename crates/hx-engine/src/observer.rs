//! Intersection observer
//!
//! The engine has no layout, so the host reports element rectangles and the
//! viewport. `revealed` and `intersect` triggers are driven from here.

use hx_dom::NodeId;
use std::collections::HashMap;

/// Axis-aligned rectangle in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Overlap with another rect
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right > x && bottom > y {
            Some(Rect {
                x,
                y,
                width: right - x,
                height: bottom - y,
            })
        } else {
            None
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// One threshold crossing
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub threshold: f64,
    /// Visible fraction of the element
    pub ratio: f64,
    pub is_intersecting: bool,
}

#[derive(Debug, Clone)]
struct Watch {
    threshold: f64,
    intersecting: bool,
}

/// Tracks visibility of observed elements across host updates
#[derive(Debug, Default)]
pub struct IntersectionObserver {
    observed: HashMap<NodeId, Vec<Watch>>,
}

impl IntersectionObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `target` at `threshold` (0.0 means any overlap)
    pub fn observe(&mut self, target: NodeId, threshold: f64) {
        let threshold = threshold.clamp(0.0, 1.0);
        let watches = self.observed.entry(target).or_default();
        if !watches.iter().any(|w| w.threshold == threshold) {
            watches.push(Watch {
                threshold,
                intersecting: false,
            });
        }
    }

    pub fn unobserve(&mut self, target: NodeId) {
        self.observed.remove(&target);
    }

    pub fn is_observing(&self, target: NodeId) -> bool {
        self.observed.contains_key(&target)
    }

    pub fn clear(&mut self) {
        self.observed.clear();
    }

    /// Recompute against new geometry. Returns an entry for every watch whose
    /// intersecting state changed. Elements without a rect are left alone.
    pub fn update(&mut self, viewport: Rect, rects: &HashMap<NodeId, Rect>) -> Vec<IntersectionEntry> {
        let mut entries = Vec::new();
        for (&node, watches) in &mut self.observed {
            let Some(rect) = rects.get(&node) else {
                continue;
            };
            let ratio = match rect.intersect(&viewport) {
                Some(i) if rect.area() > 0.0 => i.area() / rect.area(),
                // Zero-area elements count as fully visible when inside
                Some(_) => 1.0,
                None => 0.0,
            };
            for watch in watches.iter_mut() {
                let now = ratio > 0.0 && ratio >= watch.threshold;
                if now != watch.intersecting {
                    watch.intersecting = now;
                    entries.push(IntersectionEntry {
                        target: node,
                        threshold: watch.threshold,
                        ratio,
                        is_intersecting: now,
                    });
                }
            }
        }
        entries.sort_by_key(|e| e.target);
        entries
    }
}
