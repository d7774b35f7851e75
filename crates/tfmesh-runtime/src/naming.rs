//! Canonical frame names.

/// Marker id meaning "no fiducial attached"; disables the static-edge
/// subsystem.
pub const MARKER_ID_NOT_SET: &str = "__NOTSET__";

/// Frame identifiers for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNames {
    /// `<hostname>/footprint`
    pub body: String,
    /// `tag/<markerId>`
    pub fiducial: String,
}

impl FrameNames {
    pub fn new(hostname: &str, marker_id: &str) -> Self {
        Self {
            body: body_frame(hostname),
            fiducial: format!("tag/{marker_id}"),
        }
    }
}

pub fn body_frame(hostname: &str) -> String {
    format!("{hostname}/footprint")
}

/// Strip everything but ASCII letters and digits.
///
/// Applied to any identifier used to qualify a namespace (the destination
/// map id) so punctuation cannot collide with or escape the routing scheme.
pub fn sanitize_hostname(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// `None` for a missing, blank or sentinel marker id.
pub fn marker_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|id| !id.is_empty() && *id != MARKER_ID_NOT_SET)
        .map(str::to_string)
}
