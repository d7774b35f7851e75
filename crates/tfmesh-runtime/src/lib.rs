//! `tfmesh-runtime` – the per-agent edge publishing engine
//!
//! Everything between "a pose sample arrived" and "an edge went out".
//!
//! # Modules
//!
//! - [`naming`] – frame-name conventions and hostname sanitizing.
//! - [`static_cache`] – [`StaticEdgeCache`][static_cache::StaticEdgeCache]:
//!   calibration edges looked up once through a
//!   [`TransformLookup`][tfmesh_geometry::TransformLookup] and republished
//!   from a snapshot forever after.
//! - [`decimator`] – [`OdometryDecimator`][decimator::OdometryDecimator]:
//!   distance-gated body-frame edges from a dense pose stream.
//! - [`publisher`] – [`EdgePublisher`][publisher::EdgePublisher]: wraps edges
//!   with provenance and hands them to a
//!   [`Disseminator`][tfmesh_middleware::Disseminator].
//! - [`scheduler`] – [`PeriodicTimer`][scheduler::PeriodicTimer] with a
//!   cancellable [`TimerHandle`][scheduler::TimerHandle].
//! - [`node`] – [`TfNode`][node::TfNode]: the timers and the odometry path of
//!   one agent, driven until its stream ends or it is shut down.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod decimator;
pub mod naming;
pub mod node;
pub mod publisher;
pub mod scheduler;
pub mod static_cache;
pub mod telemetry;

pub use decimator::{MIN_DIST_ODOM, OdometryDecimator, SharedDecimator};
pub use naming::{FrameNames, MARKER_ID_NOT_SET, body_frame, marker_id, sanitize_hostname};
pub use node::{NodeConfig, NodeStats, TfNode};
pub use publisher::EdgePublisher;
pub use scheduler::{PeriodicTimer, TimerHandle};
pub use static_cache::{FetchOutcome, StaticEdgeCache};
pub use telemetry::{TracerProviderGuard, init_tracing};
