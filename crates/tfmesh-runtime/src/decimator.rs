//! [`OdometryDecimator`] – distance-gated odometry edges.
//!
//! Turns a dense world-frame pose stream into a sparse chain of body-frame
//! edges.  A new edge is emitted only once the agent has moved at least
//! `min_distance` away from the *last emitted* pose; suppressed samples do
//! not advance the reference, so slow creeping motion still accumulates into
//! an edge eventually.
//!
//! Each edge relates the body frame at two instants:
//!
//! ```text
//! translation = conj(q_last) ⊗ (t_now − t_last)
//! rotation    = normalize(conj(q_last) ∘ q_now)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tfmesh_types::{Edge, FrameKind, Pose, ReferenceFrame};
use tracing::{trace, warn};

/// Minimum displacement before an odometry edge is added.
pub const MIN_DIST_ODOM: f64 = 0.2;

/// Stateful filter from poses to odometry edges.
///
/// `observe` takes `&mut self`: the threshold check and the reference update
/// happen as one step.  Hosts delivering samples from several threads share
/// the decimator through [`SharedDecimator`].
#[derive(Debug)]
pub struct OdometryDecimator {
    robot: String,
    body_frame: String,
    min_distance: f64,
    last_emitted: Option<Pose>,
}

impl OdometryDecimator {
    pub fn new(robot: impl Into<String>, body_frame: impl Into<String>, min_distance: f64) -> Self {
        Self {
            robot: robot.into(),
            body_frame: body_frame.into(),
            min_distance,
            last_emitted: None,
        }
    }

    /// Feed one sample.  Returns an edge when the motion since the last
    /// emitted pose reaches the threshold.
    ///
    /// The first valid sample only seeds the reference.  Samples with
    /// non-finite components are dropped without touching the reference.
    pub fn observe(&mut self, pose: Pose) -> Option<Edge> {
        if let Err(e) = pose.validate() {
            warn!(error = %e, "dropping odometry sample");
            return None;
        }

        let Some(last) = self.last_emitted else {
            self.last_emitted = Some(pose);
            return None;
        };

        let relative = last.transform().relative_to(pose.transform());
        let dist = relative.translation.norm();
        if dist < self.min_distance {
            trace!(dist, threshold = self.min_distance, "odometry sample below threshold");
            return None;
        }

        let edge = Edge {
            origin: ReferenceFrame::new(&self.body_frame, &self.robot, FrameKind::Body, last.timestamp),
            target: ReferenceFrame::new(&self.body_frame, &self.robot, FrameKind::Body, pose.timestamp),
            transform: relative,
            is_fixed: false,
            is_static: false,
        };
        self.last_emitted = Some(pose);
        Some(edge)
    }

    /// The pose the next sample is measured against.
    pub fn last_emitted(&self) -> Option<&Pose> {
        self.last_emitted.as_ref()
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }
}

/// Mutex-wrapped decimator for concurrent sample delivery.
#[derive(Debug, Clone)]
pub struct SharedDecimator(Arc<Mutex<OdometryDecimator>>);

impl SharedDecimator {
    pub fn new(decimator: OdometryDecimator) -> Self {
        Self(Arc::new(Mutex::new(decimator)))
    }

    pub fn observe(&self, pose: Pose) -> Option<Edge> {
        self.0.lock().observe(pose)
    }

    pub fn last_emitted(&self) -> Option<Pose> {
        self.0.lock().last_emitted().copied()
    }
}
