//! Odometry on the bus.
//!
//! [`OdometryIngest`] publishes pose samples under a named odometry topic
//! (e.g. `/autobot01/deadreckoning_node/odom`) and [`BusOdometrySource`]
//! turns the samples of one such topic back into a stream for the
//! decimator.  Several agents may share one bus; each source only yields its
//! own topic.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tfmesh_types::{Event, EventPayload, Pose, TfError};
use tokio::sync::broadcast;
use tracing::warn;

use crate::adapter::OdometrySource;
use crate::bus::{EventBus, Topic, TopicReceiver};

const SOURCE: &str = "tfmesh-middleware::odometry";

/// Default odometry topic for an agent.
pub fn default_odometry_topic(hostname: &str) -> String {
    format!("/{hostname}/deadreckoning_node/odom")
}

/// Publishes pose samples onto [`Topic::Odometry`].
#[derive(Clone)]
pub struct OdometryIngest {
    bus: Arc<EventBus>,
    topic: String,
}

impl OdometryIngest {
    pub fn new(bus: Arc<EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Validate and publish one sample.
    ///
    /// # Errors
    ///
    /// [`TfError::InvalidPose`] for non-finite samples, [`TfError::Transport`]
    /// when no consumer is subscribed.
    pub fn ingest(&self, pose: Pose) -> Result<usize, TfError> {
        pose.validate()?;
        let event = Event::new(
            SOURCE,
            EventPayload::Odometry {
                topic: self.topic.clone(),
                pose,
            },
        );
        self.bus.publish_to(Topic::Odometry, event)
    }
}

/// [`OdometrySource`] reading one topic from the bus.
pub struct BusOdometrySource {
    bus: Arc<EventBus>,
    topic: String,
}

impl BusOdometrySource {
    pub fn new(bus: Arc<EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Subscribe now and return the stream.  Samples published after this
    /// call are never missed (modulo lag on a full channel).
    pub fn subscribe(&self) -> BoxStream<'static, Pose> {
        let receiver = self.bus.subscribe_to(Topic::Odometry);
        pose_stream(receiver, self.topic.clone())
    }
}

#[async_trait]
impl OdometrySource for BusOdometrySource {
    async fn odometry_stream(&self) -> BoxStream<'static, Pose> {
        self.subscribe()
    }
}

fn pose_stream(receiver: TopicReceiver, topic: String) -> BoxStream<'static, Pose> {
    stream::unfold((receiver, topic), |(mut receiver, topic)| async move {
        loop {
            match receiver.recv().await {
                Ok(Event {
                    payload: EventPayload::Odometry { topic: t, pose },
                    ..
                }) if t == topic => return Some((pose, (receiver, topic))),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %topic, lagged_by = n, "odometry stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tfmesh_types::{Quaternion, Vec3};

    fn pose(x: f64) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity(), Utc::now())
    }

    #[test]
    fn default_topic_follows_hostname() {
        assert_eq!(
            default_odometry_topic("autobot07"),
            "/autobot07/deadreckoning_node/odom"
        );
    }

    #[tokio::test]
    async fn source_yields_only_its_topic() {
        let bus = Arc::new(EventBus::default());
        let source = BusOdometrySource::new(Arc::clone(&bus), "/autobot01/odom");
        let mut stream = source.odometry_stream().await;

        let mine = OdometryIngest::new(Arc::clone(&bus), "/autobot01/odom");
        let theirs = OdometryIngest::new(Arc::clone(&bus), "/autobot02/odom");

        theirs.ingest(pose(9.0)).unwrap();
        mine.ingest(pose(1.0)).unwrap();

        let got = stream.next().await.expect("sample");
        assert!((got.translation.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ingest_rejects_non_finite_pose() {
        let bus = Arc::new(EventBus::default());
        let _source = BusOdometrySource::new(Arc::clone(&bus), "/a/odom").subscribe();
        let ingest = OdometryIngest::new(bus, "/a/odom");
        let bad = Pose::new(
            Vec3::new(0.0, f64::INFINITY, 0.0),
            Quaternion::identity(),
            Utc::now(),
        );
        assert!(matches!(ingest.ingest(bad), Err(TfError::InvalidPose(_))));
    }

    #[tokio::test]
    async fn stream_ends_when_bus_is_dropped() {
        let bus = Arc::new(EventBus::default());
        let mut stream = BusOdometrySource::new(Arc::clone(&bus), "/a/odom").subscribe();
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
