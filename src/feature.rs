use std::time::Duration;

use crate::my_types::*;

/// Feature population as index-aligned parallel arrays.
///
/// Index `i` names the same point in every array only until the next
/// compaction; nothing outside the tracker should hold on to an index.
#[derive(Clone, Debug, Default)]
pub struct Features {
    /// positions in the previous frame
    pub previous: Vec<Vector2d>,
    /// positions in the current frame
    pub current: Vec<Vector2d>,
    /// `current - previous`
    pub displacement: Vec<Vector2d>,
    /// time the point was detected
    pub last_seen: Vec<Duration>,
    /// correspondence succeeded on the latest tick
    pub status: Vec<bool>,
    /// solver error estimate, recorded but unused for filtering
    pub errors: Vec<f64>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn clear(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.displacement.clear();
        self.last_seen.clear();
        self.status.clear();
        self.errors.clear();
    }

    /// Keep the current points for which `keep[i]` is set, preserving order.
    ///
    /// The correspondence arrays describe the tick that has just been
    /// judged, so they are dropped; the survivors carry zero displacement
    /// until the next correspondence.
    pub fn compact(&mut self, keep: &[bool]) {
        let mut count = 0;
        for i in 0..self.current.len() {
            if keep.get(i).copied().unwrap_or(false) {
                self.current[count] = self.current[i];
                self.last_seen[count] = self.last_seen[i];
                count += 1;
            }
        }
        self.current.truncate(count);
        self.last_seen.truncate(count);
        self.displacement.clear();
        self.displacement.resize(count, Vector2d::zeros());
        self.status.clear();
        self.errors.clear();
    }

    /// Append freshly detected points seen at `now`
    pub fn append(&mut self, points: &[Vector2d], now: Duration) {
        self.current.extend_from_slice(points);
        self.last_seen.resize(self.current.len(), now);
        self.displacement.resize(self.current.len(), Vector2d::zeros());
    }

    /// Current positions become previous ones; current is emptied for the
    /// next correspondence.
    pub fn rotate(&mut self) {
        self.previous.clone_from(&self.current);
        self.current.clear();
    }

    /// Store one correspondence result and recompute displacements.
    pub fn update(&mut self, points: Vec<Vector2d>, status: Vec<bool>, errors: Vec<f64>) {
        debug_assert_eq!(points.len(), self.previous.len());
        self.current = points;
        self.status = status;
        self.errors = errors;
        self.status.resize(self.current.len(), false);
        self.errors.resize(self.current.len(), 0.);
        self.displacement = self
            .current
            .iter()
            .zip(self.previous.iter())
            .map(|(now, old)| now - old)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_compact_preserves_order_and_alignment() {
        let mut features = Features::default();
        let points: Vec<_> = (0..4).map(|i| Vector2d::new(i as f64, 0.)).collect();
        features.append(&points[..2], ms(1));
        features.append(&points[2..], ms(2));
        features.compact(&[false, true, false, true]);
        assert_eq!(features.current, vec![points[1], points[3]]);
        assert_eq!(features.last_seen, vec![ms(1), ms(2)]);
        assert_eq!(features.displacement.len(), 2);
        assert!(features.status.is_empty());
    }

    #[test]
    fn test_compact_with_short_mask_drops_rest() {
        let mut features = Features::default();
        features.append(&[Vector2d::zeros(), Vector2d::zeros()], ms(1));
        features.compact(&[true]);
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn test_rotate_then_update() {
        let mut features = Features::default();
        features.append(&[Vector2d::new(1., 1.), Vector2d::new(5., 5.)], ms(3));
        features.rotate();
        assert!(features.current.is_empty());
        assert_eq!(features.previous.len(), 2);

        features.update(
            vec![Vector2d::new(2., 0.), Vector2d::new(5., 5.)],
            vec![true, false],
            vec![0.1, 0.2],
        );
        assert_eq!(features.displacement, vec![Vector2d::new(1., -1.), Vector2d::zeros()]);
        assert_eq!(features.status, vec![true, false]);
        assert_eq!(features.last_seen, vec![ms(3), ms(3)]);
    }
}
