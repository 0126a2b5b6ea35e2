use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::my_types::*;
use crate::tracker::FeatureTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out increasing object ids. Clones draw from the same sequence,
/// so ids stay unique across every holder of the generator.
#[derive(Clone, Debug, Default)]
pub struct ObjectIdGenerator {
    next: Arc<AtomicU64>,
}

impl ObjectIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ObjectId {
        ObjectId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A rectangle carried along by the image motion inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowingObject {
    id: ObjectId,
    rect: Rect,
    disposed: bool,
}

impl FlowingObject {
    pub fn new(id: ObjectId, rect: Rect) -> Self {
        FlowingObject {
            id,
            rect,
            disposed: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn center(&self) -> Point {
        self.rect.center()
    }

    /// Only the center decides, a region may hang half outside the frame.
    pub fn is_inside(&self, size: Size) -> bool {
        let p = self.center();
        p.x >= 0 && p.y >= 0 && (p.x as i64) < size.width as i64 && (p.y as i64) < size.height as i64
    }

    /// Shift the origin; fractional parts are truncated toward zero.
    pub fn translate(&mut self, diff: Vector2d) {
        self.rect.x += diff.x as i32;
        self.rect.y += diff.y as i32;
    }

    /// Follow the strongest flow inside the rectangle for one frame.
    pub fn process(&mut self, tracker: &FeatureTracker) {
        if self.disposed {
            return;
        }

        let diff = tracker.query_flow(&self.rect);
        self.translate(diff);

        // without a frame there is nothing to leave
        let size = tracker.frame_size();
        if !size.is_empty() && !self.is_inside(size) {
            info!(id = %self.id, rect = ?self.rect, "flowing object left the frame");
            self.disposed = true;
        }
    }
}
