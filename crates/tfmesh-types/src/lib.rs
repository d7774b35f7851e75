use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use tfmesh_geometry::{LookupError, Quaternion, Transform3D, Vec3};

/// Semantic role of a frame within an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// The agent's chassis / footprint frame.
    Body,
    /// A visual marker rigidly attached to the agent.
    Fiducial,
}

/// One instance of a coordinate frame: a named frame owned by an agent,
/// captured at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    pub name: String,
    /// Agent identifier (hostname).
    pub robot: String,
    pub kind: FrameKind,
    pub time: DateTime<Utc>,
}

impl ReferenceFrame {
    pub fn new(
        name: impl Into<String>,
        robot: impl Into<String>,
        kind: FrameKind,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            robot: robot.into(),
            kind,
            time,
        }
    }
}

/// A timestamped world-frame pose, as delivered by odometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quaternion,
    pub timestamp: DateTime<Utc>,
}

impl Pose {
    pub fn new(translation: Vec3, rotation: Quaternion, timestamp: DateTime<Utc>) -> Self {
        Self {
            translation,
            rotation,
            timestamp,
        }
    }

    /// The pose as a rigid-body transform (world → body).
    pub fn transform(&self) -> Transform3D {
        Transform3D::new(self.translation, self.rotation)
    }

    /// Reject samples carrying NaN or infinite components.
    pub fn validate(&self) -> Result<(), TfError> {
        if self.translation.is_finite() && self.rotation.is_finite() {
            Ok(())
        } else {
            Err(TfError::InvalidPose(format!(
                "non-finite pose sample at {}",
                self.timestamp
            )))
        }
    }
}

/// The unit of dissemination: one relative-pose relationship between two
/// frame instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub origin: ReferenceFrame,
    pub target: ReferenceFrame,
    pub transform: Transform3D,
    /// `true` only for the calibration edge, which never expires.
    pub is_fixed: bool,
    /// Reserved; never set by this crate.
    pub is_static: bool,
}

/// An [`Edge`] wrapped with provenance, ready for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMessage {
    pub id: Uuid,
    /// Agent that produced the edge.
    pub robot: String,
    pub published_at: DateTime<Utc>,
    pub edge: Edge,
}

impl EdgeMessage {
    pub fn new(robot: impl Into<String>, edge: Edge) -> Self {
        Self {
            id: Uuid::new_v4(),
            robot: robot.into(),
            published_at: Utc::now(),
            edge,
        }
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "tfmesh-runtime::publisher"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A raw odometry sample published on a named odometry topic.
    Odometry { topic: String, pose: Pose },
    /// An edge addressed to a group member namespace.
    Edge {
        group: String,
        destination: String,
        message: EdgeMessage,
    },
    /// Operational alerts (shutdown requests, component faults).
    Alert { component: String, message: String },
}

/// Error type spanning configuration, lookup and transport failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TfError {
    #[error("Configuration Missing: {0}")]
    ConfigurationMissing(String),

    #[error("Transform Lookup Failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Invalid Pose: {0}")]
    InvalidPose(String),
}
