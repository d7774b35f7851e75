//! Local transform buffer.
//!
//! [`TfBuffer`] keeps the latest stamped transform for every parent → child
//! pair it has been told about and answers "where is frame B relative to
//! frame A" by composing a chain of edges found with BFS.  Edges are
//! traversable in both directions; walking an edge backwards applies its
//! inverse.
//!
//! The buffer is the in-process implementation of [`TransformLookup`], the
//! seam the static-edge cache queries.  A host wired to a real transform
//! service implements the same trait.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use tfmesh_geometry::buffer::{LookupTime, TfBuffer, TransformLookup};
//! use tfmesh_geometry::transform::{Quaternion, Transform3D, Vec3};
//!
//! let mut tf = TfBuffer::new();
//! tf.set_transform("tag/7", "bot/footprint",
//!     Transform3D::new(Vec3::new(0.0, 0.0, -0.1), Quaternion::identity()), Utc::now());
//!
//! let stamped = tf.lookup("bot/footprint", "tag/7", LookupTime::Latest).unwrap();
//! assert!((stamped.transform.translation.z - 0.1).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::Transform3D;

// ────────────────────────────────────────────────────────────────────────────
// Lookup contract
// ────────────────────────────────────────────────────────────────────────────

/// Point in time a lookup is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTime {
    /// The most recent time at which the whole chain is known.
    Latest,
    /// A specific instant.
    At(DateTime<Utc>),
}

/// A transform together with the time it is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampedTransform {
    pub transform: Transform3D,
    pub stamp: DateTime<Utc>,
}

/// Why a lookup could not be answered.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupError {
    /// One of the frames has never been seen.
    #[error("frame [{0}] does not exist in the transform buffer")]
    NotFound(String),

    /// The frames are connected but not with data recent enough for the
    /// requested time.
    #[error("lookup of [{origin}] -> [{target}] would require extrapolation into the future")]
    Extrapolation { origin: String, target: String },

    /// Both frames exist but no chain of edges joins them.
    #[error("frames [{origin}] and [{target}] are not connected")]
    Connectivity { origin: String, target: String },
}

/// Answers "where is `target` relative to `origin` at `at`".
///
/// Implementations must return promptly; callers poll on a timer rather
/// than block.
pub trait TransformLookup: Send + Sync {
    fn lookup(
        &self,
        origin: &str,
        target: &str,
        at: LookupTime,
    ) -> Result<StampedTransform, LookupError>;
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct StampedEdge {
    transform: Transform3D,
    stamp: DateTime<Utc>,
}

/// A directed graph of named frames and the latest stamped [`Transform3D`]
/// relating each connected pair.
#[derive(Debug, Default)]
pub struct TfBuffer {
    /// `edges[from][to]`; every insert also stores the inverse direction.
    edges: HashMap<String, HashMap<String, StampedEdge>>,
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform placing `child_frame` in
    /// `parent_frame`, valid at `stamp`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: DateTime<Utc>,
    ) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), StampedEdge { transform, stamp });
        self.edges
            .entry(child_frame.to_string())
            .or_default()
            .insert(
                parent_frame.to_string(),
                StampedEdge {
                    transform: transform.inverse(),
                    stamp,
                },
            );
    }

    /// Whether `frame` appears in any edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame)
    }

    /// Shortest chain from `origin` to `target`, composed, stamped with the
    /// oldest edge on the chain.
    fn resolve(&self, origin: &str, target: &str) -> Option<(Transform3D, Option<DateTime<Utc>>)> {
        if origin == target {
            return Some((Transform3D::identity(), None));
        }

        let mut queue: VecDeque<(&str, Transform3D, Option<DateTime<Utc>>)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((origin, Transform3D::identity(), None));
        visited.insert(origin);

        while let Some((current, accumulated, oldest)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(current) else {
                continue;
            };
            for (next, edge) in neighbours {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let composed = accumulated.compose(edge.transform);
                let stamp = Some(oldest.map_or(edge.stamp, |o| o.min(edge.stamp)));
                if next == target {
                    return Some((composed, stamp));
                }
                queue.push_back((next.as_str(), composed, stamp));
            }
        }
        None
    }
}

impl TransformLookup for TfBuffer {
    fn lookup(
        &self,
        origin: &str,
        target: &str,
        at: LookupTime,
    ) -> Result<StampedTransform, LookupError> {
        for frame in [origin, target] {
            if !self.has_frame(frame) {
                return Err(LookupError::NotFound(frame.to_string()));
            }
        }

        let (transform, chain_stamp) =
            self.resolve(origin, target)
                .ok_or_else(|| LookupError::Connectivity {
                    origin: origin.to_string(),
                    target: target.to_string(),
                })?;

        let stamp = match (at, chain_stamp) {
            (LookupTime::Latest, Some(s)) => s,
            (LookupTime::Latest, None) => Utc::now(),
            (LookupTime::At(t), None) => t,
            (LookupTime::At(t), Some(s)) if t <= s => t,
            (LookupTime::At(_), Some(_)) => {
                return Err(LookupError::Extrapolation {
                    origin: origin.to_string(),
                    target: target.to_string(),
                });
            }
        };

        Ok(StampedTransform { transform, stamp })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
