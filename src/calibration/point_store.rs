//! Scene points created while localizing calibration frames.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::map::{Frame, Observation, PointId, ScenePoint};

/// Arena of calibration scene points, deduplicated by reference-map point.
///
/// Every reference point maps to at most one calibration point, no matter how
/// many cameras or frame sets observe it. Concurrent localizers share the
/// store behind a mutex and only hold the lock for [`Self::find_or_create`]
/// plus [`Self::attach`].
///
/// A point that loses its last observation is orphaned; its slot is handed
/// out again by the next [`Self::find_or_create`] miss.
#[derive(Debug, Clone, Default)]
pub struct ScenePointStore {
    points: Vec<ScenePoint>,
    by_reference: HashMap<PointId, PointId>,
    free: Vec<PointId>,
}

impl ScenePointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted points, restoring the reference index.
    pub fn from_points(points: Vec<ScenePoint>) -> Self {
        let mut by_reference = HashMap::new();
        let mut free = Vec::new();
        for (i, p) in points.iter().enumerate() {
            let id = PointId::new(i as u32);
            match p.reference {
                Some(_) if p.observations.is_empty() => free.push(id),
                Some(r) => {
                    by_reference.insert(r, id);
                }
                None => {}
            }
        }
        Self {
            points,
            by_reference,
            free,
        }
    }

    /// Arena size, orphaned slots included.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Slots waiting to be reused.
    pub fn orphan_count(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ScenePoint] {
        &self.points
    }

    pub fn get(&self, id: PointId) -> Option<&ScenePoint> {
        self.points.get(id.index())
    }

    pub fn position(&self, id: PointId) -> Option<Vector3<f64>> {
        self.get(id).map(|p| p.position)
    }

    pub fn set_position(&mut self, id: PointId, position: Vector3<f64>) {
        if let Some(p) = self.points.get_mut(id.index()) {
            p.position = position;
        }
    }

    /// The calibration point standing for `reference`, created on first use
    /// at the reference position.
    pub fn find_or_create(&mut self, reference: PointId, position: Vector3<f64>) -> PointId {
        if let Some(&id) = self.by_reference.get(&reference) {
            return id;
        }
        let point = ScenePoint::from_reference(position, reference);
        let id = match self.free.pop() {
            Some(id) => {
                self.points[id.index()] = point;
                id
            }
            None => {
                self.points.push(point);
                PointId::new(self.points.len() as u32 - 1)
            }
        };
        self.by_reference.insert(reference, id);
        id
    }

    pub fn attach(&mut self, id: PointId, obs: Observation) {
        if let Some(p) = self.points.get_mut(id.index()) {
            p.add_observation(obs);
        }
    }

    /// Remove one recorded observation, orphaning the point if it was the last.
    pub fn detach(&mut self, id: PointId, obs: &Observation) {
        let Some(p) = self.points.get_mut(id.index()) else {
            return;
        };
        if !p.remove_observation(obs) || !p.observations.is_empty() {
            return;
        }
        if let Some(reference) = p.reference {
            if self.by_reference.get(&reference) == Some(&id) {
                self.by_reference.remove(&reference);
                self.free.push(id);
            }
        }
    }

    /// Drop exactly the observations made by the associated features of `frame`.
    pub fn detach_frame(&mut self, frame: &Frame) {
        for feature in &frame.features {
            let Some(id) = feature.point else { continue };
            let obs = Observation {
                camera_id: frame.camera_id,
                timestamp_ns: frame.timestamp_ns,
                feature_index: feature.index,
            };
            self.detach(id, &obs);
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.by_reference.clear();
        self.free.clear();
    }

    pub fn into_points(self) -> Vec<ScenePoint> {
        self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Descriptor;
    use crate::map::Feature2D;
    use nalgebra::Vector2;

    fn obs(camera_id: usize, timestamp_ns: u64) -> Observation {
        Observation {
            camera_id,
            timestamp_ns,
            feature_index: 0,
        }
    }

    fn linked_frame(camera_id: usize, timestamp_ns: u64, links: &[(usize, PointId)]) -> Frame {
        let mut frame = Frame::new(camera_id, timestamp_ns);
        for &(index, id) in links {
            let mut feat = Feature2D::new(Vector2::zeros(), Descriptor::Binary(vec![0]), index);
            feat.point = Some(id);
            frame.features.push(feat);
        }
        frame
    }

    #[test]
    fn test_one_point_per_reference() {
        let mut store = ScenePointStore::new();
        let a = store.find_or_create(PointId::new(7), Vector3::new(1.0, 0.0, 0.0));
        let b = store.find_or_create(PointId::new(3), Vector3::new(0.0, 1.0, 0.0));
        let a2 = store.find_or_create(PointId::new(7), Vector3::new(9.0, 9.0, 9.0));

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.position(a), Some(Vector3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_detach_frame() {
        let mut store = ScenePointStore::new();
        let a = store.find_or_create(PointId::new(1), Vector3::zeros());
        store.attach(a, obs(0, 10));
        store.attach(a, obs(1, 10));
        store.attach(a, obs(0, 20));

        store.detach_frame(&linked_frame(0, 10, &[(0, a)]));

        let remaining: Vec<_> = store.get(a).unwrap().observations.iter().map(|o| (o.camera_id, o.timestamp_ns)).collect();
        assert_eq!(remaining, vec![(1, 10), (0, 20)]);
    }

    #[test]
    fn test_detach_frame_leaves_same_instant_duplicates() {
        let mut store = ScenePointStore::new();
        let a = store.find_or_create(PointId::new(1), Vector3::zeros());
        let kept = Observation {
            camera_id: 0,
            timestamp_ns: 7,
            feature_index: 3,
        };
        // Two frames at the same instant linked through the same feature.
        store.attach(a, kept);
        store.attach(a, kept);
        store.attach(
            a,
            Observation {
                feature_index: 5,
                ..kept
            },
        );

        store.detach_frame(&linked_frame(0, 7, &[(3, a)]));

        let p = store.get(a).unwrap();
        assert_eq!(p.num_observations(), 2);
        assert_eq!(p.observations.iter().filter(|o| **o == kept).count(), 1);
        assert_eq!(store.orphan_count(), 0);
    }

    #[test]
    fn test_orphaned_slots_are_reused() {
        let mut store = ScenePointStore::new();
        let a = store.find_or_create(PointId::new(1), Vector3::zeros());
        let b = store.find_or_create(PointId::new(2), Vector3::zeros());
        store.attach(a, obs(0, 10));
        store.attach(b, obs(0, 10));
        store.attach(b, obs(1, 10));

        store.detach(a, &obs(0, 10));
        store.detach(b, &obs(0, 10));
        assert_eq!(store.orphan_count(), 1);

        let c = store.find_or_create(PointId::new(9), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(c, a);
        assert_eq!(store.len(), 2);
        assert_eq!(store.orphan_count(), 0);
        assert_eq!(store.get(c).unwrap().reference, Some(PointId::new(9)));
        assert_eq!(store.position(c), Some(Vector3::new(1.0, 2.0, 3.0)));
        assert!(store.get(c).unwrap().observations.is_empty());

        // The released reference gets a fresh slot.
        let a2 = store.find_or_create(PointId::new(1), Vector3::zeros());
        assert_ne!(a2, c);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_repeated_rejections_do_not_grow_store() {
        let mut store = ScenePointStore::new();
        for round in 0..20u64 {
            let links: Vec<(usize, PointId)> = (0..10u32)
                .map(|r| {
                    let id = store.find_or_create(PointId::new(round as u32 * 10 + r), Vector3::zeros());
                    store.attach(
                        id,
                        Observation {
                            camera_id: 0,
                            timestamp_ns: round,
                            feature_index: r as usize,
                        },
                    );
                    (r as usize, id)
                })
                .collect();
            store.detach_frame(&linked_frame(0, round, &links));
        }
        assert_eq!(store.len(), 10);
        assert_eq!(store.orphan_count(), 10);
    }

    #[test]
    fn test_from_points_restores_index() {
        let mut store = ScenePointStore::new();
        let a = store.find_or_create(PointId::new(4), Vector3::zeros());
        let b = store.find_or_create(PointId::new(8), Vector3::zeros());
        store.attach(a, obs(0, 1));
        store.attach(b, obs(0, 1));

        let mut restored = ScenePointStore::from_points(store.into_points());
        let again = restored.find_or_create(PointId::new(8), Vector3::zeros());

        assert_eq!(again, PointId::new(1));
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.orphan_count(), 0);
    }

    #[test]
    fn test_concurrent_attach_keeps_one_point_per_reference() {
        use parking_lot::Mutex;
        use rayon::prelude::*;

        let store = Mutex::new(ScenePointStore::new());
        let ids: Vec<Vec<PointId>> = (0..8usize)
            .into_par_iter()
            .map(|camera| {
                (0..50u32)
                    .map(|r| {
                        let mut guard = store.lock();
                        let id = guard.find_or_create(PointId::new(r), Vector3::new(r as f64, 0.0, 0.0));
                        guard.attach(id, obs(camera, 1));
                        id
                    })
                    .collect()
            })
            .collect();

        let store = store.into_inner();
        assert_eq!(store.len(), 50);
        for per_camera in &ids[1..] {
            assert_eq!(per_camera, &ids[0]);
        }
        for p in store.points() {
            assert_eq!(p.num_observations(), 8);
            assert_eq!(store.position(ids[0][p.position.x as usize]), Some(p.position));
        }
    }
}
