//! `tfmesh-middleware` – transport plumbing
//!
//! Routes pose samples in and transform edges out without caring what the
//! edges mean.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`adapter`] – The [`Disseminator`] and [`OdometrySource`] seams the
//!   runtime talks to.
//! - [`group`] – [`CommunicationGroup`]: named group publishing with a
//!   destination namespace per message.
//! - [`odometry`] – Pose-sample ingest and per-topic odometry streams.

pub mod adapter;
pub mod bus;
pub mod group;
pub mod odometry;

pub use adapter::{Disseminator, OdometrySource};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use group::{CommunicationGroup, DEFAULT_TF_GROUP, GroupSubscriber};
pub use odometry::{BusOdometrySource, OdometryIngest, default_odometry_topic};
