//! Collaborator seams.
//!
//! The edge-publishing core never speaks to a transport or a sensor driver
//! directly.  It hands finished messages to a [`Disseminator`] and pulls pose
//! samples from an [`OdometrySource`].  The bus-backed implementations live
//! in [`group`][crate::group] and [`odometry`][crate::odometry]; a host with
//! a different transport implements the same traits.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tfmesh_types::{EdgeMessage, Pose, TfError};

/// Delivers edge messages to the members of a named group.
///
/// # Contract
///
/// * One delivery attempt per call.  Callers do not retry; periodic traffic
///   simply recurs on the next tick.
/// * `destination` is an already-sanitised namespace (the shared map id).
/// * Returns the number of members the message was handed to.
pub trait Disseminator: Send + Sync {
    fn publish(&self, message: EdgeMessage, destination: &str) -> Result<usize, TfError>;
}

/// A live feed of timestamped world-frame poses.
///
/// The stream may be bursty or have gaps; it ends when the source shuts down.
#[async_trait]
pub trait OdometrySource: Send + Sync {
    async fn odometry_stream(&self) -> BoxStream<'static, Pose>;
}
