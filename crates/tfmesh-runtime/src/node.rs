//! [`TfNode`] – one agent's edge publisher.
//!
//! Wires the pieces together for a single agent:
//!
//! - one fetch and one publish at startup, then a fetch timer populating
//!   the [`StaticEdgeCache`] until it succeeds,
//! - a publish timer re-announcing every cached calibration edge,
//! - the odometry path, where each sample goes through the
//!   [`OdometryDecimator`] and any resulting edge is published at once.
//!
//! All edges go to the map namespace through the same [`EdgePublisher`].
//! Without a fiducial marker id the two timers are never started.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tfmesh_geometry::TransformLookup;
use tfmesh_middleware::{Disseminator, OdometrySource, default_odometry_topic};
use tfmesh_types::{Edge, Pose};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::decimator::{MIN_DIST_ODOM, OdometryDecimator};
use crate::naming::{FrameNames, body_frame, sanitize_hostname};
use crate::publisher::EdgePublisher;
use crate::scheduler::PeriodicTimer;
use crate::static_cache::{FetchOutcome, StaticEdgeCache};

/// Static-edge fetch period.
pub const DEFAULT_FETCH_PERIOD: Duration = Duration::from_secs(60);
/// Static-edge publish period.
pub const DEFAULT_PUBLISH_PERIOD: Duration = Duration::from_secs(10);

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Runtime settings for one [`TfNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Agent hostname, also the provenance id on every message.
    pub hostname: String,
    /// Destination namespace, already sanitized.
    pub map: String,
    /// Fiducial marker id; `None` disables the static-edge subsystem.
    pub marker_id: Option<String>,
    pub odometry_topic: String,
    pub min_dist_odom: f64,
    pub fetch_period: Duration,
    pub publish_period: Duration,
}

impl NodeConfig {
    /// Defaults for everything but the three identifiers.  `map` is
    /// sanitized here.
    pub fn new(hostname: impl Into<String>, map: &str, marker_id: Option<String>) -> Self {
        let hostname = hostname.into();
        Self {
            odometry_topic: default_odometry_topic(&hostname),
            map: sanitize_hostname(map),
            marker_id,
            min_dist_odom: MIN_DIST_ODOM,
            fetch_period: DEFAULT_FETCH_PERIOD,
            publish_period: DEFAULT_PUBLISH_PERIOD,
            hostname,
        }
    }

    /// Frame names, when a marker is attached.
    pub fn frame_names(&self) -> Option<FrameNames> {
        self.marker_id
            .as_deref()
            .map(|id| FrameNames::new(&self.hostname, id))
    }
}

/// Counters reported when the node stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub odometry_samples: u64,
    pub odometry_edges: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// TfNode
// ────────────────────────────────────────────────────────────────────────────

pub struct TfNode {
    config: NodeConfig,
    publisher: EdgePublisher,
    decimator: OdometryDecimator,
    cache: Option<Arc<StaticEdgeCache>>,
    timers: Vec<PeriodicTimer>,
    shutdown: CancellationToken,
    stats: NodeStats,
}

impl TfNode {
    pub fn new(
        config: NodeConfig,
        lookup: Arc<dyn TransformLookup>,
        transport: Arc<dyn Disseminator>,
    ) -> Self {
        let cache = config
            .frame_names()
            .map(|names| Arc::new(StaticEdgeCache::for_agent(&config.hostname, &names, lookup)));
        let decimator = OdometryDecimator::new(
            &config.hostname,
            body_frame(&config.hostname),
            config.min_dist_odom,
        );
        Self {
            publisher: EdgePublisher::new(&config.hostname, transport),
            decimator,
            cache,
            timers: Vec::new(),
            shutdown: CancellationToken::new(),
            stats: NodeStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// `None` when no fiducial marker is configured.
    pub fn static_cache(&self) -> Option<&Arc<StaticEdgeCache>> {
        self.cache.as_ref()
    }

    /// Cancelling this token makes [`run`][Self::run] return.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Fetch and publish the static edges once, right now, then start the
    /// timers for the following rounds.  The fetch timer is skipped when
    /// the first fetch already succeeded.
    ///
    /// No-op without a marker id or when already started.  Must be called
    /// from within a Tokio runtime.
    pub fn start_static_timers(&mut self) {
        let Some(cache) = self.cache.clone() else {
            info!(robot = %self.config.hostname, "no fiducial marker configured; static edges disabled");
            return;
        };
        if !self.timers.is_empty() {
            return;
        }

        let fetched = cache.try_fetch() == FetchOutcome::Success;
        publish_snapshot(&cache, &self.publisher, &self.config.map);

        if fetched {
            info!("all static edges fetched");
        } else {
            let fetch_cache = Arc::clone(&cache);
            self.timers.push(PeriodicTimer::spawn_after(
                "static-fetch",
                self.config.fetch_period,
                move |timer| {
                    if fetch_cache.try_fetch() == FetchOutcome::Success {
                        info!("all static edges fetched");
                        timer.cancel();
                    }
                },
            ));
        }

        let publisher = self.publisher.clone();
        let map = self.config.map.clone();
        self.timers.push(PeriodicTimer::spawn_after(
            "static-publish",
            self.config.publish_period,
            move |_| publish_snapshot(&cache, &publisher, &map),
        ));
    }

    /// Feed one odometry sample; publish and return the edge it yields, if
    /// any.
    pub fn handle_odometry(&mut self, pose: Pose) -> Option<Edge> {
        self.stats.odometry_samples += 1;
        let edge = self.decimator.observe(pose)?;
        self.stats.odometry_edges += 1;
        debug!(
            dist = edge.transform.translation.norm(),
            destination = %self.config.map,
            "odometry edge"
        );
        self.publisher.publish_or_log(edge.clone(), &self.config.map);
        Some(edge)
    }

    /// Run until the odometry stream ends or the shutdown token is
    /// cancelled, then stop the timers.
    pub async fn run(mut self, mut odometry: BoxStream<'static, Pose>) -> NodeStats {
        self.start_static_timers();
        info!(
            robot = %self.config.hostname,
            destination = %self.config.map,
            topic = %self.config.odometry_topic,
            "tf node running"
        );

        let token = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = odometry.next() => match next {
                    Some(pose) => {
                        self.handle_odometry(pose);
                    }
                    None => {
                        info!("odometry stream ended");
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
        info!(
            samples = self.stats.odometry_samples,
            edges = self.stats.odometry_edges,
            "tf node stopped"
        );
        self.stats
    }

    /// [`run`][Self::run] over the stream of an [`OdometrySource`].
    pub async fn run_with_source(self, source: &dyn OdometrySource) -> NodeStats {
        let stream = source.odometry_stream().await;
        self.run(stream).await
    }

    /// Cancel both timers and wait for them to stop.  Idempotent.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        for timer in self.timers.drain(..) {
            timer.shutdown().await;
        }
    }
}

fn publish_snapshot(cache: &StaticEdgeCache, publisher: &EdgePublisher, map: &str) {
    for edge in cache.snapshot() {
        publisher.publish_or_log(edge, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use futures_util::stream;
    use std::error::Error;
    use tfmesh_geometry::TfBuffer;
    use tfmesh_middleware::{
        BusOdometrySource, CommunicationGroup, DEFAULT_TF_GROUP, EventBus, GroupSubscriber,
        OdometryIngest,
    };
    use tfmesh_types::{EdgeMessage, FrameKind, Quaternion, Transform3D, Vec3};

    fn stamp(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
    }

    fn pose(x: f64, secs: i64) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity(), stamp(secs))
    }

    fn calibrated_buffer() -> Arc<TfBuffer> {
        let mut buffer = TfBuffer::new();
        buffer.set_transform(
            "tag/403",
            "autobot01/footprint",
            Transform3D::new(Vec3::new(0.0, 0.0, -0.1), Quaternion::identity()),
            stamp(0),
        );
        Arc::new(buffer)
    }

    struct Harness {
        bus: Arc<EventBus>,
        group: Arc<CommunicationGroup>,
        subscriber: GroupSubscriber,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::default());
        let group = Arc::new(CommunicationGroup::new(DEFAULT_TF_GROUP, Arc::clone(&bus)));
        let subscriber = group.subscribe(Some("tt21"));
        Harness {
            bus,
            group,
            subscriber,
        }
    }

    async fn next_message(sub: &mut GroupSubscriber) -> Option<EdgeMessage> {
        tokio::time::timeout(Duration::from_secs(15), sub.recv())
            .await
            .ok()
            .flatten()
            .map(|(_, message)| message)
    }

    #[test]
    fn config_defaults_and_sanitized_map() {
        let config = NodeConfig::new("autobot01", "tt-21!", Some("403".to_string()));
        assert_eq!(config.map, "tt21");
        assert_eq!(config.odometry_topic, "/autobot01/deadreckoning_node/odom");
        assert_eq!(config.min_dist_odom, 0.2);
        assert_eq!(config.fetch_period, Duration::from_secs(60));
        assert_eq!(config.publish_period, Duration::from_secs(10));
        let names = config.frame_names().expect("marker configured");
        assert_eq!(names.fiducial, "tag/403");
        assert_eq!(names.body, "autobot01/footprint");
    }

    #[test]
    fn no_marker_means_no_static_cache() {
        let h = harness();
        let node = TfNode::new(
            NodeConfig::new("autobot01", "tt21", None),
            calibrated_buffer(),
            h.group,
        );
        assert!(node.static_cache().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn odometry_path_publishes_decimated_edges() -> Result<(), Box<dyn Error>> {
        let mut h = harness();
        let node = TfNode::new(
            NodeConfig::new("autobot01", "tt21", None),
            calibrated_buffer(),
            h.group.clone(),
        );
        let samples = stream::iter(vec![pose(0.0, 0), pose(0.1, 1), pose(0.3, 2)]).boxed();
        let stats = node.run(samples).await;

        assert_eq!(
            stats,
            NodeStats {
                odometry_samples: 3,
                odometry_edges: 1
            }
        );
        let message = next_message(&mut h.subscriber).await.ok_or("no edge")?;
        assert_eq!(message.robot, "autobot01");
        assert!((message.edge.transform.translation.x - 0.3).abs() < 1e-9);
        assert_eq!(message.edge.origin.time, stamp(0));
        assert_eq!(message.edge.target.time, stamp(2));
        assert!(!message.edge.is_fixed);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn static_edge_is_fetched_once_and_republished() -> Result<(), Box<dyn Error>> {
        let mut h = harness();
        let config = NodeConfig::new("autobot01", "tt21", Some("403".to_string()));
        let node = TfNode::new(config, calibrated_buffer(), h.group.clone());
        let cache = Arc::clone(node.static_cache().ok_or("cache")?);
        let token = node.shutdown_token();

        let source = BusOdometrySource::new(Arc::clone(&h.bus), "/autobot01/deadreckoning_node/odom");
        let stream = source.subscribe();
        let task = tokio::spawn(node.run(stream));

        let first = next_message(&mut h.subscriber).await.ok_or("no static edge")?;
        assert!(first.edge.is_fixed);
        assert!(!first.edge.is_static);
        assert_eq!(first.edge.origin.name, "tag/403");
        assert_eq!(first.edge.origin.kind, FrameKind::Fiducial);
        assert_eq!(first.edge.target.name, "autobot01/footprint");
        assert!(cache.is_populated());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = next_message(&mut h.subscriber).await.ok_or("no republish")?;
        assert_eq!(second.edge, first.edge, "cached edge never changes");
        assert_ne!(second.id, first.id);

        let ingest = OdometryIngest::new(Arc::clone(&h.bus), "/autobot01/deadreckoning_node/odom");
        ingest.ingest(pose(0.0, 0))?;
        ingest.ingest(pose(1.0, 1))?;
        let odom = next_message(&mut h.subscriber).await.ok_or("no odometry edge")?;
        assert!(!odom.edge.is_fixed);

        token.cancel();
        let stats = task.await?;
        assert_eq!(stats.odometry_edges, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn missing_calibration_keeps_retrying_without_publishing() -> Result<(), Box<dyn Error>> {
        let mut h = harness();
        let mut config = NodeConfig::new("autobot01", "tt21", Some("999".to_string()));
        config.fetch_period = Duration::from_secs(5);
        let mut node = TfNode::new(config, calibrated_buffer(), h.group.clone());
        node.start_static_timers();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let cache = node.static_cache().ok_or("cache")?;
        assert!(!cache.is_populated());
        assert!(next_message(&mut h.subscriber).await.is_none());

        node.shutdown().await;
        assert!(node.shutdown_token().is_cancelled());
        Ok(())
    }

    /// Lookup that takes a while to answer, like a remote transform service.
    struct SlowLookup(Arc<TfBuffer>);

    impl TransformLookup for SlowLookup {
        fn lookup(
            &self,
            origin: &str,
            target: &str,
            at: tfmesh_geometry::LookupTime,
        ) -> Result<tfmesh_geometry::StampedTransform, tfmesh_geometry::LookupError> {
            std::thread::sleep(Duration::from_millis(20));
            self.0.lookup(origin, target, at)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn static_edge_is_published_at_startup() -> Result<(), Box<dyn Error>> {
        let mut h = harness();
        let config = NodeConfig::new("autobot01", "tt21", Some("403".to_string()));
        let mut node = TfNode::new(
            config,
            Arc::new(SlowLookup(calibrated_buffer())),
            h.group.clone(),
        );
        node.start_static_timers();

        let (_, message) = tokio::time::timeout(Duration::from_secs(2), h.subscriber.recv())
            .await?
            .ok_or("bus closed")?;
        assert!(message.edge.is_fixed);
        assert_eq!(message.edge.origin.name, "tag/403");

        assert_eq!(node.timers.len(), 1, "no fetch timer after a successful first fetch");
        node.shutdown().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_fetch_keeps_fetch_timer() {
        let h = harness();
        let mut node = TfNode::new(
            NodeConfig::new("autobot01", "tt21", Some("999".to_string())),
            calibrated_buffer(),
            h.group.clone(),
        );
        node.start_static_timers();
        assert_eq!(node.timers.len(), 2);
        node.shutdown().await;
    }
}
