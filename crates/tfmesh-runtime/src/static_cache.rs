//! [`StaticEdgeCache`] – calibration edges fetched once, republished forever.
//!
//! Each registered key is an `(origin, target)` frame-name pair that starts
//! empty.  [`StaticEdgeCache::try_fetch`] asks the [`TransformLookup`]
//! collaborator for every key still empty; the first successful answer is
//! frozen into a fixed [`Edge`] and never replaced.  [`StaticEdgeCache::snapshot`]
//! copies out whatever is present for the publish timer.
//!
//! The lookup runs outside the lock.  The lock only covers the store-if-absent
//! decision and the copy-out, so a slow lookup never stalls a publish tick.

use std::sync::Arc;

use parking_lot::Mutex;
use tfmesh_geometry::{LookupError, LookupTime, StampedTransform, TransformLookup};
use tfmesh_types::{Edge, FrameKind, ReferenceFrame, Transform3D};
use tracing::{debug, info, warn};

use crate::naming::FrameNames;

/// Result of one [`StaticEdgeCache::try_fetch`] round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every registered key holds an edge.
    Success,
    /// The transform graph does not have enough data yet.  Retry later.
    NotYetAvailable,
    /// The frames are not linked at all (yet).  Retry later.
    TransientError,
}

#[derive(Debug)]
struct Slot {
    origin: String,
    origin_kind: FrameKind,
    target: String,
    target_kind: FrameKind,
    edge: Option<Edge>,
}

/// Mutex-guarded, insertion-ordered store of calibration edges.
pub struct StaticEdgeCache {
    robot: String,
    lookup: Arc<dyn TransformLookup>,
    slots: Mutex<Vec<Slot>>,
}

impl StaticEdgeCache {
    /// Empty cache with no keys.
    pub fn new(robot: impl Into<String>, lookup: Arc<dyn TransformLookup>) -> Self {
        Self {
            robot: robot.into(),
            lookup,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Cache holding the single fiducial → body key of an agent.
    pub fn for_agent(
        robot: impl Into<String>,
        names: &FrameNames,
        lookup: Arc<dyn TransformLookup>,
    ) -> Self {
        let cache = Self::new(robot, lookup);
        cache.register(&names.fiducial, FrameKind::Fiducial, &names.body, FrameKind::Body);
        cache
    }

    /// Add an empty key.  Registering an existing key is a no-op.
    pub fn register(
        &self,
        origin: &str,
        origin_kind: FrameKind,
        target: &str,
        target_kind: FrameKind,
    ) {
        let mut slots = self.slots.lock();
        if slots.iter().any(|s| s.origin == origin && s.target == target) {
            return;
        }
        slots.push(Slot {
            origin: origin.to_string(),
            origin_kind,
            target: target.to_string(),
            target_kind,
            edge: None,
        });
    }

    /// Try to populate every empty key.
    ///
    /// Returns [`FetchOutcome::Success`] once all keys hold an edge, without
    /// consulting the lookup collaborator again.  Otherwise the outcome
    /// reflects the first key that failed this round.
    pub fn try_fetch(&self) -> FetchOutcome {
        let pending: Vec<(String, FrameKind, String, FrameKind)> = self
            .slots
            .lock()
            .iter()
            .filter(|s| s.edge.is_none())
            .map(|s| (s.origin.clone(), s.origin_kind, s.target.clone(), s.target_kind))
            .collect();

        let mut outcome = FetchOutcome::Success;
        for (origin, origin_kind, target, target_kind) in pending {
            match self.lookup.lookup(&origin, &target, LookupTime::Latest) {
                Ok(stamped) => {
                    let edge = self.fixed_edge(&origin, origin_kind, &target, target_kind, stamped);
                    if self.store(&origin, &target, edge) {
                        info!(origin = %origin, target = %target, "static edge fetched and cached");
                    }
                }
                Err(err @ (LookupError::NotFound(_) | LookupError::Extrapolation { .. })) => {
                    warn!(origin = %origin, target = %target, error = %err, "could not find static edge");
                    if outcome == FetchOutcome::Success {
                        outcome = FetchOutcome::NotYetAvailable;
                    }
                }
                Err(err @ LookupError::Connectivity { .. }) => {
                    debug!(origin = %origin, target = %target, error = %err, "static edge frames not connected");
                    if outcome == FetchOutcome::Success {
                        outcome = FetchOutcome::TransientError;
                    }
                }
            }
        }
        outcome
    }

    /// Every cached edge, in registration order.
    pub fn snapshot(&self) -> Vec<Edge> {
        self.slots
            .lock()
            .iter()
            .filter_map(|s| s.edge.clone())
            .collect()
    }

    /// `true` once every registered key holds an edge.
    pub fn is_populated(&self) -> bool {
        self.slots.lock().iter().all(|s| s.edge.is_some())
    }

    /// Number of registered keys, populated or not.
    pub fn key_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Store-if-absent.  Returns `false` when another fetch got there first.
    fn store(&self, origin: &str, target: &str, edge: Edge) -> bool {
        let mut slots = self.slots.lock();
        match slots
            .iter_mut()
            .find(|s| s.origin == origin && s.target == target)
        {
            Some(slot) if slot.edge.is_none() => {
                slot.edge = Some(edge);
                true
            }
            _ => false,
        }
    }

    fn fixed_edge(
        &self,
        origin: &str,
        origin_kind: FrameKind,
        target: &str,
        target_kind: FrameKind,
        stamped: StampedTransform,
    ) -> Edge {
        Edge {
            origin: ReferenceFrame::new(origin, &self.robot, origin_kind, stamped.stamp),
            target: ReferenceFrame::new(target, &self.robot, target_kind, stamped.stamp),
            transform: Transform3D::new(
                stamped.transform.translation,
                stamped.transform.rotation.normalize(),
            ),
            is_fixed: true,
            is_static: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tfmesh_geometry::{Quaternion, Transform3D, Vec3};

    /// Lookup that replays a fixed script of answers, then keeps returning
    /// the last one.
    struct ScriptedLookup {
        script: Mutex<VecDeque<Result<StampedTransform, LookupError>>>,
        last: Mutex<Option<Result<StampedTransform, LookupError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedLookup {
        fn new(script: Vec<Result<StampedTransform, LookupError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TransformLookup for ScriptedLookup {
        fn lookup(
            &self,
            _origin: &str,
            _target: &str,
            _at: LookupTime,
        ) -> Result<StampedTransform, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            let mut last = self.last.lock();
            if let Some(answer) = next {
                *last = Some(answer);
            }
            last.clone()
                .unwrap_or_else(|| Err(LookupError::NotFound("empty script".to_string())))
        }
    }

    fn names() -> FrameNames {
        FrameNames::new("autobot01", "403")
    }

    fn calibration(z: f64) -> StampedTransform {
        StampedTransform {
            transform: Transform3D::new(Vec3::new(0.0, 0.0, z), Quaternion::identity()),
            stamp: Utc::now(),
        }
    }

    fn connectivity() -> Result<StampedTransform, LookupError> {
        Err(LookupError::Connectivity {
            origin: "tag/403".to_string(),
            target: "autobot01/footprint".to_string(),
        })
    }

    #[test]
    fn empty_cache_snapshot_is_empty() {
        let lookup = Arc::new(ScriptedLookup::new(vec![]));
        let cache = StaticEdgeCache::for_agent("autobot01", &names(), lookup);
        assert_eq!(cache.key_count(), 1);
        assert!(cache.snapshot().is_empty());
        assert!(!cache.is_populated());
    }

    #[test]
    fn successful_fetch_builds_fixed_edge() {
        let lookup = Arc::new(ScriptedLookup::new(vec![Ok(calibration(0.12))]));
        let cache = StaticEdgeCache::for_agent("autobot01", &names(), lookup);

        assert_eq!(cache.try_fetch(), FetchOutcome::Success);

        let edges = cache.snapshot();
        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert!(edge.is_fixed);
        assert!(!edge.is_static);
        assert_eq!(edge.origin.name, "tag/403");
        assert_eq!(edge.origin.kind, FrameKind::Fiducial);
        assert_eq!(edge.target.name, "autobot01/footprint");
        assert_eq!(edge.target.kind, FrameKind::Body);
        assert_eq!(edge.origin.robot, "autobot01");
        assert_eq!(edge.target.robot, "autobot01");
        assert!((edge.transform.translation.z - 0.12).abs() < 1e-12);
    }

    #[test]
    fn cached_rotation_is_normalized() {
        let skewed = StampedTransform {
            transform: Transform3D::new(Vec3::zero(), Quaternion::new(2.0, 0.0, 0.0, 2.0)),
            stamp: Utc::now(),
        };
        let lookup = Arc::new(ScriptedLookup::new(vec![Ok(skewed)]));
        let cache = StaticEdgeCache::for_agent("autobot01", &names(), lookup);
        assert_eq!(cache.try_fetch(), FetchOutcome::Success);

        let rotation = cache.snapshot()[0].transform.rotation;
        assert!((rotation.norm() - 1.0).abs() < 1e-12);
        assert!((rotation.w - rotation.z).abs() < 1e-12);
    }

    #[test]
    fn not_found_and_extrapolation_are_not_yet_available() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            Err(LookupError::NotFound("tag/403".to_string())),
            Err(LookupError::Extrapolation {
                origin: "tag/403".to_string(),
                target: "autobot01/footprint".to_string(),
            }),
        ]));
        let cache = StaticEdgeCache::for_agent("autobot01", &names(), lookup);
        assert_eq!(cache.try_fetch(), FetchOutcome::NotYetAvailable);
        assert_eq!(cache.try_fetch(), FetchOutcome::NotYetAvailable);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn connectivity_three_times_then_success_populates_once() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            connectivity(),
            connectivity(),
            connectivity(),
            Ok(calibration(0.1)),
            Ok(calibration(9.9)),
        ]));
        let cache = StaticEdgeCache::for_agent("autobot01", &names(), Arc::clone(&lookup) as Arc<dyn TransformLookup>);

        for _ in 0..3 {
            assert_eq!(cache.try_fetch(), FetchOutcome::TransientError);
            assert!(cache.snapshot().is_empty(), "failed fetch must not store");
        }
        assert_eq!(cache.try_fetch(), FetchOutcome::Success);
        assert_eq!(lookup.calls(), 4);

        let first = cache.snapshot();
        for _ in 0..5 {
            assert_eq!(cache.try_fetch(), FetchOutcome::Success);
        }
        // Populated keys are never looked up again.
        assert_eq!(lookup.calls(), 4);
        assert_eq!(cache.snapshot(), first);
        assert!((first[0].transform.translation.z - 0.1).abs() < 1e-12);
    }

    #[test]
    fn store_never_replaces_existing_edge() {
        let lookup = Arc::new(ScriptedLookup::new(vec![Ok(calibration(0.1))]));
        let cache = StaticEdgeCache::for_agent("autobot01", &names(), lookup);
        assert_eq!(cache.try_fetch(), FetchOutcome::Success);
        let original = cache.snapshot();

        let n = names();
        let mut other = original[0].clone();
        other.transform.translation.z = 42.0;
        assert!(!cache.store(&n.fiducial, &n.body, other));
        assert_eq!(cache.snapshot(), original);
    }

    #[test]
    fn register_is_idempotent_and_keeps_order() {
        let lookup = Arc::new(ScriptedLookup::new(vec![Ok(calibration(0.1))]));
        let cache = StaticEdgeCache::new("autobot01", lookup);
        cache.register("tag/1", FrameKind::Fiducial, "autobot01/footprint", FrameKind::Body);
        cache.register("tag/2", FrameKind::Fiducial, "autobot01/footprint", FrameKind::Body);
        cache.register("tag/1", FrameKind::Fiducial, "autobot01/footprint", FrameKind::Body);
        assert_eq!(cache.key_count(), 2);

        assert_eq!(cache.try_fetch(), FetchOutcome::Success);
        let names: Vec<_> = cache.snapshot().into_iter().map(|e| e.origin.name).collect();
        assert_eq!(names, vec!["tag/1", "tag/2"]);
    }

    #[test]
    fn concurrent_fetch_and_snapshot_never_tear() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            connectivity(),
            connectivity(),
            Ok(calibration(0.25)),
        ]));
        let cache = Arc::new(StaticEdgeCache::for_agent("autobot01", &names(), lookup));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        for edge in cache.snapshot() {
                            assert!((edge.transform.translation.z - 0.25).abs() < 1e-12);
                            assert!(edge.is_fixed);
                        }
                    }
                })
            })
            .collect();
        for _ in 0..10 {
            cache.try_fetch();
        }
        for reader in readers {
            reader.join().expect("reader thread");
        }
        assert!(cache.is_populated());
    }
}
