//! Named communication groups over the transform-graph lane.
//!
//! A [`CommunicationGroup`] is the bus-backed [`Disseminator`]: every message
//! published through it is tagged with the group name and a destination
//! namespace and routed on [`Topic::TransformGraph`].  Members read it back
//! through a [`GroupSubscriber`], which drops traffic for other groups or
//! other destinations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tfmesh_types::{EdgeMessage, Event, EventPayload, TfError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::adapter::Disseminator;
use crate::bus::{EventBus, Topic, TopicReceiver};

/// Group every agent publishes its transform edges to.
pub const DEFAULT_TF_GROUP: &str = "/autolab/tf";

const SOURCE: &str = "tfmesh-middleware::group";

/// Publisher side of a named group.
#[derive(Debug)]
pub struct CommunicationGroup {
    name: String,
    bus: Arc<EventBus>,
    closed: AtomicBool,
}

impl CommunicationGroup {
    pub fn new(name: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            name: name.into(),
            bus,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join the group as a receiver.  `destination = None` receives traffic
    /// for every namespace.
    pub fn subscribe(&self, destination: Option<&str>) -> GroupSubscriber {
        GroupSubscriber {
            group: self.name.clone(),
            destination: destination.map(str::to_string),
            receiver: self.bus.subscribe_to(Topic::TransformGraph),
        }
    }

    /// Leave the group.  Later publishes fail with [`TfError::Transport`].
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(group = %self.name, "communication group shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Disseminator for CommunicationGroup {
    fn publish(&self, message: EdgeMessage, destination: &str) -> Result<usize, TfError> {
        if self.is_closed() {
            return Err(TfError::Transport(format!("group {} is shut down", self.name)));
        }
        let event = Event::new(
            SOURCE,
            EventPayload::Edge {
                group: self.name.clone(),
                destination: destination.to_string(),
                message,
            },
        );
        self.bus.publish_to(Topic::TransformGraph, event)
    }
}

/// Receiver side of a named group.
pub struct GroupSubscriber {
    group: String,
    destination: Option<String>,
    receiver: TopicReceiver,
}

impl GroupSubscriber {
    /// Wait for the next edge addressed to this subscriber.
    ///
    /// Returns the destination namespace alongside the message, or `None`
    /// once the bus is closed.
    pub async fn recv(&mut self) -> Option<(String, EdgeMessage)> {
        loop {
            match self.receiver.recv().await {
                Ok(Event {
                    payload:
                        EventPayload::Edge {
                            group,
                            destination,
                            message,
                        },
                    ..
                }) => {
                    if group != self.group {
                        continue;
                    }
                    if self.destination.as_ref().is_some_and(|d| *d != destination) {
                        continue;
                    }
                    return Some((destination, message));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(group = %self.group, lagged_by = n, "group subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
