//! [`EdgePublisher`] – provenance wrapping and hand-off to the transport.

use std::sync::Arc;

use tfmesh_middleware::Disseminator;
use tfmesh_types::{Edge, EdgeMessage, TfError};
use tracing::{debug, warn};

/// Wraps edges with the agent's provenance and passes them to a
/// [`Disseminator`].  One attempt per edge; nothing is retried here.
#[derive(Clone)]
pub struct EdgePublisher {
    robot: String,
    transport: Arc<dyn Disseminator>,
}

impl EdgePublisher {
    pub fn new(robot: impl Into<String>, transport: Arc<dyn Disseminator>) -> Self {
        Self {
            robot: robot.into(),
            transport,
        }
    }

    /// Publish `edge` to the `destination` namespace.
    ///
    /// # Errors
    ///
    /// Whatever the transport reports, unchanged.
    pub fn publish(&self, edge: Edge, destination: &str) -> Result<usize, TfError> {
        let message = EdgeMessage::new(&self.robot, edge);
        let id = message.id;
        let delivered = self.transport.publish(message, destination)?;
        debug!(%id, destination, delivered, "edge published");
        Ok(delivered)
    }

    /// [`publish`][Self::publish], logging instead of returning failures.
    /// Periodic callers use this: the next tick is the retry.
    pub fn publish_or_log(&self, edge: Edge, destination: &str) {
        let origin = edge.origin.name.clone();
        let target = edge.target.name.clone();
        if let Err(e) = self.publish(edge, destination) {
            warn!(origin = %origin, target = %target, destination, error = %e, "edge publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tfmesh_types::{FrameKind, ReferenceFrame, Transform3D};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, EdgeMessage)>>,
        fail: bool,
    }

    impl Disseminator for RecordingTransport {
        fn publish(&self, message: EdgeMessage, destination: &str) -> Result<usize, TfError> {
            if self.fail {
                return Err(TfError::Transport("link down".to_string()));
            }
            self.sent.lock().push((destination.to_string(), message));
            Ok(1)
        }
    }

    fn edge() -> Edge {
        let frame = ReferenceFrame::new("autobot01/footprint", "autobot01", FrameKind::Body, Utc::now());
        Edge {
            origin: frame.clone(),
            target: frame,
            transform: Transform3D::identity(),
            is_fixed: false,
            is_static: false,
        }
    }

    #[test]
    fn publish_wraps_edge_with_provenance() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = EdgePublisher::new("autobot01", Arc::clone(&transport) as Arc<dyn Disseminator>);

        let e = edge();
        assert_eq!(publisher.publish(e.clone(), "tt21").unwrap(), 1);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tt21");
        assert_eq!(sent[0].1.robot, "autobot01");
        assert_eq!(sent[0].1.edge, e, "edge passes through untouched");
    }

    #[test]
    fn transport_failure_is_returned_not_retried() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let publisher = EdgePublisher::new("autobot01", Arc::clone(&transport) as Arc<dyn Disseminator>);
        assert!(matches!(
            publisher.publish(edge(), "tt21"),
            Err(TfError::Transport(_))
        ));
        // Must not panic or retry.
        publisher.publish_or_log(edge(), "tt21");
        assert!(transport.sent.lock().is_empty());
    }
}
