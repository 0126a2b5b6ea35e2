use tracing::{debug, info, instrument};

use crate::flowing_object::{FlowingObject, ObjectId, ObjectIdGenerator};
use crate::my_types::*;
use crate::tracker::FeatureTracker;

/// Flowing objects in insertion order. Overlaps are allowed.
#[derive(Debug, Default)]
pub struct TrackedRegionSet {
    ids: ObjectIdGenerator,
    flowing_objects: Vec<FlowingObject>,
}

impl TrackedRegionSet {
    pub fn new(ids: ObjectIdGenerator) -> Self {
        TrackedRegionSet {
            ids,
            flowing_objects: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.flowing_objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flowing_objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.flowing_objects.clear();
    }

    pub fn append(&mut self, rect: Rect) -> ObjectId {
        let object = FlowingObject::new(self.ids.next_id(), rect);
        let id = object.id();
        info!(%id, ?rect, "new flowing object");
        self.flowing_objects.push(object);
        id
    }

    /// Snapshot of the object with `id`
    pub fn get(&self, id: ObjectId) -> Option<FlowingObject> {
        self.flowing_objects.iter().find(|o| o.id() == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowingObject> {
        self.flowing_objects.iter()
    }

    /// Move every object by the flow inside it, then drop the ones that
    /// left the frame.
    #[instrument(skip_all, fields(objects = self.flowing_objects.len()))]
    pub fn process(&mut self, tracker: &FeatureTracker) {
        for object in self.flowing_objects.iter_mut() {
            object.process(tracker);
        }

        let before = self.flowing_objects.len();
        self.flowing_objects.retain(|o| !o.is_disposed());
        debug!(removed = before - self.flowing_objects.len(), "processed flowing objects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::test_utils::*;

    #[test]
    fn test_append_then_get() {
        let mut regions = TrackedRegionSet::default();
        let rect = Rect::new(10, 20, 60, 60);
        let id = regions.append(rect);
        let object = regions.get(id).unwrap();
        assert_eq!(object.id(), id);
        assert_eq!(object.rect(), rect);
        assert!(!object.is_disposed());
        assert!(regions.get(ObjectId(id.0 + 100)).is_none());
    }

    #[test]
    fn test_get_returns_a_copy() {
        let mut regions = TrackedRegionSet::default();
        let id = regions.append(Rect::new(0, 0, 10, 10));
        let mut copy = regions.get(id).unwrap();
        copy.translate(Vector2d::new(5., 5.));
        assert_eq!(regions.get(id).unwrap().rect(), Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn test_ids_shared_between_sets() {
        let ids = ObjectIdGenerator::new();
        let mut a = TrackedRegionSet::new(ids.clone());
        let mut b = TrackedRegionSet::new(ids);
        let first = a.append(Rect::default());
        let second = b.append(Rect::default());
        let third = a.append(Rect::default());
        assert!(first < second && second < third);
    }

    #[test]
    fn test_region_follows_single_feature() {
        let mut h = harness(&TrackerConfig::default());
        h.detector.set(vec![Vector2d::new(110., 95.)]);
        h.solver.set(vec![(Vector2d::new(5., -3.), true)]);
        h.tracker.process(&blank_frame());

        let mut regions = TrackedRegionSet::default();
        let id = regions.append(Rect::centered_at(Point::new(100, 100), 60));
        regions.process(&h.tracker);

        let object = regions.get(id).unwrap();
        assert_eq!(object.center(), Point::new(105, 97));
        assert_eq!(object.rect(), Rect::new(75, 67, 60, 60));
        assert!(!object.is_disposed());
    }

    #[test]
    fn test_disposed_regions_are_removed_in_order() {
        let mut h = harness(&TrackerConfig::default());
        h.detector.set(vec![Vector2d::new(620., 240.)]);
        h.solver.set(vec![(Vector2d::new(30., 0.), true)]);
        h.tracker.process(&blank_frame());

        let mut regions = TrackedRegionSet::default();
        let a = regions.append(Rect::new(100, 100, 60, 60));
        let b = regions.append(Rect::new(600, 210, 60, 60));
        let c = regions.append(Rect::new(300, 300, 60, 60));
        regions.process(&h.tracker);

        assert_eq!(regions.len(), 2);
        assert!(regions.get(b).is_none());
        let ids: Vec<_> = regions.iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_tracker_clear_freezes_regions() {
        let mut h = harness(&TrackerConfig::default());
        h.detector.set(vec![Vector2d::new(100., 100.), Vector2d::new(400., 300.)]);
        h.solver.set(vec![(Vector2d::new(4., 4.), true), (Vector2d::new(-6., 2.), true)]);
        h.tracker.process(&blank_frame());

        let mut regions = TrackedRegionSet::default();
        let a = regions.append(Rect::new(80, 80, 60, 60));
        let b = regions.append(Rect::new(380, 280, 60, 60));
        assert_ne!(h.tracker.query_flow(&Rect::new(80, 80, 60, 60)), Vector2d::zeros());

        h.tracker.clear();
        for object in regions.iter() {
            assert_eq!(h.tracker.query_flow(&object.rect()), Vector2d::zeros());
        }
        regions.process(&h.tracker);
        assert_eq!(regions.get(a).unwrap().rect(), Rect::new(80, 80, 60, 60));
        assert_eq!(regions.get(b).unwrap().rect(), Rect::new(380, 280, 60, 60));
    }

    #[test]
    fn test_clear_empties_set() {
        let mut regions = TrackedRegionSet::default();
        regions.append(Rect::new(0, 0, 1, 1));
        regions.append(Rect::new(0, 0, 1, 1));
        regions.clear();
        assert!(regions.is_empty());
        assert_eq!(regions.len(), 0);
    }
}
