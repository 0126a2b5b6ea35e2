use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::clock::{Clock, MonotonicClock};
use crate::config::TrackerConfig;
use crate::image::Frame;
use crate::my_types::*;
use crate::region_set::TrackedRegionSet;
use crate::tracker::FeatureTracker;

/// Which layers end up on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawMode(u8);

impl DrawMode {
    pub const CAPTURE_IMAGE: DrawMode = DrawMode(1);
    pub const FEATURE_POINTS: DrawMode = DrawMode(2);
    pub const ALL: DrawMode = DrawMode(3);

    pub fn contains(&self, other: DrawMode) -> bool {
        self.0 & other.0 != 0
    }

    /// 3 -> 1 -> 2 -> 3
    pub fn next(&self) -> DrawMode {
        if *self == DrawMode::ALL {
            DrawMode::CAPTURE_IMAGE
        } else {
            DrawMode(self.0 + 1)
        }
    }
}

impl Default for DrawMode {
    fn default() -> Self {
        DrawMode::ALL
    }
}

/// Requests coming from the user interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// place a new flowing object centered at the point
    Click { x: i32, y: i32 },
    /// forget all features and flowing objects
    Clear,
    ToggleDrawMode,
    /// tap twice to set the replenish interval to the time between taps
    Recalibrate,
}

/// Owns the tracker and the flowing objects and drives them frame by frame.
#[derive(Debug)]
pub struct Controller {
    tracker: FeatureTracker,
    regions: TrackedRegionSet,
    clock: Box<dyn Clock>,
    draw_mode: DrawMode,
    region_size: i32,
    last_calibration: Option<Duration>,
}

impl Controller {
    pub fn new(config: &TrackerConfig, region_size: i32) -> Self {
        Self::with_parts(
            FeatureTracker::new(config),
            TrackedRegionSet::default(),
            Box::new(MonotonicClock::new()),
            region_size,
        )
    }

    pub fn with_parts(
        tracker: FeatureTracker,
        regions: TrackedRegionSet,
        clock: Box<dyn Clock>,
        region_size: i32,
    ) -> Self {
        Controller {
            tracker,
            regions,
            clock,
            draw_mode: DrawMode::default(),
            region_size,
            last_calibration: None,
        }
    }

    pub fn tracker(&self) -> &FeatureTracker {
        &self.tracker
    }

    pub fn regions(&self) -> &TrackedRegionSet {
        &self.regions
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    /// One tick: features first, then the objects riding on them.
    pub fn process(&mut self, frame: &Frame) {
        self.tracker.process(frame);
        self.regions.process(&self.tracker);
    }

    #[instrument(skip(self))]
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Click { x, y } => {
                let rect = Rect::centered_at(Point::new(x, y), self.region_size);
                self.regions.append(rect);
            }
            Command::Clear => {
                self.tracker.clear();
                self.regions.clear();
            }
            Command::ToggleDrawMode => {
                self.draw_mode = self.draw_mode.next();
            }
            Command::Recalibrate => self.recalibrate(),
        }
    }

    fn recalibrate(&mut self) {
        let t = self.clock.now();
        if let Some(old_t) = self.last_calibration {
            let diff = t.saturating_sub(old_t);
            self.tracker.set_append_interval(diff);
            self.tracker.set_feature_lifetime(diff * 2);
            self.tracker.clear();
            info!(
                append_interval = ?self.tracker.append_interval(),
                feature_lifetime = ?self.tracker.feature_lifetime(),
                "adjusted append interval and feature lifetime"
            );
        }
        self.last_calibration = Some(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn controller() -> Controller {
        let h = harness(&TrackerConfig::default());
        Controller::with_parts(h.tracker, TrackedRegionSet::default(), Box::new(h.clock), 60)
    }

    #[test]
    fn test_click_places_centered_square() {
        let mut controller = controller();
        controller.handle(Command::Click { x: 100, y: 100 });
        let object = controller.regions().iter().next().unwrap();
        assert_eq!(object.rect(), Rect::new(70, 70, 60, 60));
        assert_eq!(object.center(), Point::new(100, 100));
    }

    #[test]
    fn test_clear_resets_both_components() {
        let h = harness(&TrackerConfig::default());
        h.detector.set(vec![Vector2d::new(10., 10.)]);
        let mut controller = Controller::with_parts(
            h.tracker,
            TrackedRegionSet::default(),
            Box::new(h.clock.clone()),
            60,
        );
        controller.process(&blank_frame());
        controller.handle(Command::Click { x: 300, y: 300 });
        assert_eq!(controller.tracker().size(), 1);

        controller.handle(Command::Clear);
        assert_eq!(controller.tracker().size(), 0);
        assert!(controller.regions().is_empty());
    }

    #[test]
    fn test_draw_mode_cycles() {
        let mut controller = controller();
        assert_eq!(controller.draw_mode(), DrawMode::ALL);
        let mut seen = vec![];
        for _ in 0..4 {
            controller.handle(Command::ToggleDrawMode);
            seen.push(controller.draw_mode());
        }
        assert_eq!(
            seen,
            vec![
                DrawMode::CAPTURE_IMAGE,
                DrawMode::FEATURE_POINTS,
                DrawMode::ALL,
                DrawMode::CAPTURE_IMAGE
            ]
        );
        assert!(DrawMode::ALL.contains(DrawMode::FEATURE_POINTS));
        assert!(!DrawMode::CAPTURE_IMAGE.contains(DrawMode::FEATURE_POINTS));
    }

    #[test]
    fn test_recalibrate_uses_time_between_taps() {
        let h = harness(&TrackerConfig::default());
        h.detector.set(vec![Vector2d::new(10., 10.)]);
        let clock = h.clock.clone();
        let mut controller =
            Controller::with_parts(h.tracker, TrackedRegionSet::default(), Box::new(clock.clone()), 60);
        controller.process(&blank_frame());

        controller.handle(Command::Recalibrate);
        assert_eq!(controller.tracker().size(), 1);
        assert_eq!(controller.tracker().append_interval(), Duration::from_millis(1000));

        clock.advance(Duration::from_millis(400));
        controller.handle(Command::Recalibrate);
        assert_eq!(controller.tracker().append_interval(), Duration::from_millis(400));
        assert_eq!(controller.tracker().feature_lifetime(), Duration::from_millis(800));
        assert_eq!(controller.tracker().size(), 0);

        // the second tap also starts the next measurement
        clock.advance(Duration::from_millis(250));
        controller.handle(Command::Recalibrate);
        assert_eq!(controller.tracker().append_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_recalibrate_ignores_zero_interval() {
        let mut controller = controller();
        controller.handle(Command::Recalibrate);
        controller.handle(Command::Recalibrate);
        assert_eq!(controller.tracker().append_interval(), Duration::from_millis(1000));
        assert_eq!(controller.tracker().feature_lifetime(), Duration::from_millis(2000));
    }

    #[test]
    fn test_command_json() {
        let command: Command = serde_json::from_str(r#"{"type": "click", "x": 5, "y": 7}"#).unwrap();
        assert_eq!(command, Command::Click { x: 5, y: 7 });
        let command: Command = serde_json::from_str(r#"{"type": "toggle_draw_mode"}"#).unwrap();
        assert_eq!(command, Command::ToggleDrawMode);
    }
}
