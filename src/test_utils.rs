//! Scripted collaborators for driving the tracker deterministically in tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::ManualClock;
use crate::config::TrackerConfig;
use crate::detector::CornerDetector;
use crate::image::{Frame, Image};
use crate::my_types::*;
use crate::optical_flow::{FlowResult, FlowSolver};
use crate::tracker::FeatureTracker;

/// Moves point `i` by `moves[i].0` and reports `moves[i].1` as its status.
/// Points past the end of the script stay put and are tracked.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSolver {
    pub moves: Arc<Mutex<Vec<(Vector2d, bool)>>>,
}

impl ScriptedSolver {
    pub fn set(&self, moves: Vec<(Vector2d, bool)>) {
        *self.moves.lock().unwrap() = moves;
    }
}

impl FlowSolver for ScriptedSolver {
    fn track(&mut self, _prev: &Image, _next: &Image, points: &[Vector2d]) -> FlowResult {
        let moves = self.moves.lock().unwrap();
        let mut result = FlowResult::lost(points);
        for (i, p) in points.iter().enumerate() {
            let (shift, status) = moves.get(i).copied().unwrap_or((Vector2d::zeros(), true));
            result.points[i] = p + shift;
            result.status[i] = status;
        }
        result
    }
}

/// Returns a fixed list of corners and counts how often it ran.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    pub corners: Arc<Mutex<Vec<Vector2d>>>,
    pub calls: Arc<Mutex<usize>>,
}

impl ScriptedDetector {
    pub fn set(&self, corners: Vec<Vector2d>) {
        *self.corners.lock().unwrap() = corners;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CornerDetector for ScriptedDetector {
    fn detect(&mut self, _image: &Image, max_corners: usize) -> Vec<Vector2d> {
        *self.calls.lock().unwrap() += 1;
        let corners = self.corners.lock().unwrap();
        corners.iter().take(max_corners).copied().collect()
    }
}

pub struct Harness {
    pub tracker: FeatureTracker,
    pub solver: ScriptedSolver,
    pub detector: ScriptedDetector,
    pub clock: ManualClock,
}

pub fn harness(config: &TrackerConfig) -> Harness {
    let solver = ScriptedSolver::default();
    let detector = ScriptedDetector::default();
    let clock = ManualClock::new(Duration::from_millis(1000));
    let tracker = FeatureTracker::with_parts(
        config,
        Box::new(solver.clone()),
        Box::new(detector.clone()),
        Box::new(clock.clone()),
    );
    Harness {
        tracker,
        solver,
        detector,
        clock,
    }
}

pub fn blank_frame() -> Frame {
    Frame::Gray(Image::new(640, 480))
}
