use std::time::Duration;

use tracing::{debug, instrument, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::config::TrackerConfig;
use crate::detector::{CornerDetector, GoodFeatures};
use crate::feature::Features;
use crate::image::{Frame, Image};
use crate::my_types::*;
use crate::optical_flow::{FlowSolver, PyramidalLk};

/// Keeps a population of sparse features alive across frames and answers
/// which way the image moved inside a rectangle.
#[derive(Debug)]
pub struct FeatureTracker {
    max_feature_count: usize,
    min_feature_count: usize,
    feature_lifetime: Duration,
    append_interval: Duration,
    max_tracking_displacement: f64,
    last_append: Duration,
    frame_old: Image,
    frame_now: Image,
    features: Features,
    solver: Box<dyn FlowSolver>,
    detector: Box<dyn CornerDetector>,
    clock: Box<dyn Clock>,
}

impl FeatureTracker {
    /// Tracker with the built-in Lucas-Kanade solver, corner detector and
    /// the monotonic system clock.
    pub fn new(config: &TrackerConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(PyramidalLk::new(&config.flow)),
            Box::new(GoodFeatures::new(&config.detector)),
            Box::new(MonotonicClock::new()),
        )
    }

    pub fn with_parts(
        config: &TrackerConfig,
        solver: Box<dyn FlowSolver>,
        detector: Box<dyn CornerDetector>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let mut tracker = FeatureTracker {
            max_feature_count: config.max_feature_count,
            min_feature_count: config.min_feature_count,
            feature_lifetime: Duration::from_millis(2000),
            append_interval: Duration::from_millis(1000),
            max_tracking_displacement: config.max_tracking_displacement,
            last_append: Duration::ZERO,
            frame_old: Image::empty(),
            frame_now: Image::empty(),
            features: Features::default(),
            solver,
            detector,
            clock,
        };
        tracker.set_feature_lifetime(config.feature_lifetime());
        tracker.set_append_interval(config.append_interval());
        tracker
    }

    /// Zero durations are ignored.
    pub fn set_feature_lifetime(&mut self, lifetime: Duration) {
        if lifetime.is_zero() {
            return;
        }
        self.feature_lifetime = lifetime;
    }

    /// Zero durations are ignored.
    pub fn set_append_interval(&mut self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        self.append_interval = interval;
    }

    pub fn feature_lifetime(&self) -> Duration {
        self.feature_lifetime
    }

    pub fn append_interval(&self) -> Duration {
        self.append_interval
    }

    /// Drop both frames and every feature.
    pub fn clear(&mut self) {
        self.frame_old.clear();
        self.frame_now.clear();
        self.features.clear();
        self.last_append = Duration::ZERO;
    }

    /// Number of features held for the current frame
    pub fn size(&self) -> usize {
        self.features.len()
    }

    /// Dimensions of the current frame, empty before the first frame
    pub fn frame_size(&self) -> Size {
        self.frame_now.dims()
    }

    /// Advance the feature population by one frame.
    #[instrument(skip_all)]
    pub fn process(&mut self, frame: &Frame) {
        let gray = frame.to_grayscale();
        let now = self.clock.now();

        // only keep features that could be tracked
        let before = self.features.len();
        let keep: Vec<bool> = (0..before).map(|i| self.is_tracked_at(i, now)).collect();
        self.features.compact(&keep);
        let survivors = self.features.len();

        // append new features when few survived or the population is getting old
        let mut appended = 0;
        if survivors < self.min_feature_count
            || now.saturating_sub(self.last_append) >= self.append_interval
        {
            appended = self.append_features(&gray, now);
        }

        // rotate new data into old data
        self.features.rotate();
        self.frame_old = std::mem::replace(&mut self.frame_now, gray);
        if self.frame_old.is_empty() {
            self.frame_old = self.frame_now.clone();
        }

        let result = self
            .solver
            .track(&self.frame_old, &self.frame_now, &self.features.previous);
        self.features.update(result.points, result.status, result.errors);

        debug!(
            before,
            pruned = before - survivors,
            appended,
            size = self.features.len(),
            "processed frame"
        );
    }

    fn append_features(&mut self, gray: &Image, now: Duration) -> usize {
        if gray.is_empty() {
            return 0;
        }
        let corners = self.detector.detect(gray, self.max_feature_count);
        self.features.append(&corners, now);
        self.last_append = now;
        trace!(count = corners.len(), "appended features");
        corners.len()
    }

    /// A feature counts as tracked when the last correspondence succeeded,
    /// it is younger than the feature lifetime and its displacement is not
    /// an outlier. Out-of-range indices are never tracked.
    pub fn is_tracked(&self, index: usize) -> bool {
        self.is_tracked_at(index, self.clock.now())
    }

    fn is_tracked_at(&self, index: usize, now: Duration) -> bool {
        let f = &self.features;
        if index >= f.status.len() || index >= f.displacement.len() || index >= f.last_seen.len() {
            return false;
        }
        if !f.status[index] {
            return false;
        }
        if now.saturating_sub(f.last_seen[index]) > self.feature_lifetime {
            return false;
        }
        if f.displacement[index].norm() > self.max_tracking_displacement {
            return false;
        }
        true
    }

    fn is_inner(&self, index: usize, rect: &Rect) -> bool {
        match self.features.previous.get(index) {
            Some(p) => rect.contains(p),
            None => false,
        }
    }

    /// Largest displacement among tracked features whose previous position
    /// lies inside `rect`. Zero when none qualifies.
    pub fn query_flow(&self, rect: &Rect) -> Vector2d {
        let mut max_diff = Vector2d::zeros();
        let mut max_diff_length = 0.;

        if self.features.is_empty() {
            return max_diff;
        }

        let now = self.clock.now();
        for i in 0..self.size() {
            if self.is_tracked_at(i, now) && self.is_inner(i, rect) {
                let diff = self.features.displacement[i];
                let diff_length = diff.norm();
                if max_diff_length < diff_length {
                    max_diff = diff;
                    max_diff_length = diff_length;
                }
            }
        }

        max_diff
    }

    /// (previous, current) positions of every tracked feature
    pub fn tracked_motions(&self) -> Vec<(Vector2d, Vector2d)> {
        let now = self.clock.now();
        (0..self.size())
            .filter(|i| self.is_tracked_at(*i, now))
            .map(|i| (self.features.previous[i], self.features.current[i]))
            .collect()
    }
}
