//! Node configuration – reads `~/.tfmesh/config.toml` (or `$TFMESH_CONFIG`),
//! then applies `TFMESH_*` environment overrides.
//!
//! ```toml
//! veh = "autobot01"
//! map = "tt21"
//! tag_id = "403"            # "__NOTSET__" disables static edges
//! min_dist_odom = 0.2
//!
//! [[static_transforms]]
//! parent = "tag/403"
//! child = "autobot01/footprint"
//! translation = [0.0, 0.0, -0.1]
//! rotation = [1.0, 0.0, 0.0, 0.0]   # w, x, y, z
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tfmesh_geometry::TfBuffer;
use tfmesh_middleware::DEFAULT_TF_GROUP;
use tfmesh_runtime::{MIN_DIST_ODOM, NodeConfig, marker_id};
use tfmesh_types::{Quaternion, TfError, Transform3D, Vec3};

/// One calibration transform seeded into the local lookup buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransformEntry {
    pub parent: String,
    pub child: String,
    pub translation: [f64; 3],
    /// `[w, x, y, z]`; identity when omitted.
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
}

impl StaticTransformEntry {
    pub fn transform(&self) -> Transform3D {
        let [x, y, z] = self.translation;
        let [w, qx, qy, qz] = self.rotation;
        Transform3D::new(Vec3::new(x, y, z), Quaternion::new(w, qx, qy, qz).normalize())
    }
}

/// File-level configuration.  The three identifiers are optional here so a
/// partial file can be completed from the environment; [`Config::resolve`]
/// enforces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    /// Defaults to `/<veh>/deadreckoning_node/odom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometry_topic: Option<String>,
    #[serde(default = "default_min_dist_odom")]
    pub min_dist_odom: f64,
    #[serde(default = "default_fetch_period_secs")]
    pub fetch_period_secs: u64,
    #[serde(default = "default_publish_period_secs")]
    pub publish_period_secs: u64,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub static_transforms: Vec<StaticTransformEntry>,
}

fn identity_rotation() -> [f64; 4] {
    [1.0, 0.0, 0.0, 0.0]
}
fn default_min_dist_odom() -> f64 {
    MIN_DIST_ODOM
}
fn default_fetch_period_secs() -> u64 {
    60
}
fn default_publish_period_secs() -> u64 {
    10
}
fn default_group() -> String {
    DEFAULT_TF_GROUP.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            veh: None,
            map: None,
            tag_id: None,
            odometry_topic: None,
            min_dist_odom: default_min_dist_odom(),
            fetch_period_secs: default_fetch_period_secs(),
            publish_period_secs: default_publish_period_secs(),
            group: default_group(),
            static_transforms: Vec::new(),
        }
    }
}

impl Config {
    /// Validate and turn into the runtime configuration.
    ///
    /// # Errors
    ///
    /// [`TfError::ConfigurationMissing`] naming the first missing identifier
    /// (`veh`, `map`, `tag_id`) or the first out-of-range value.
    pub fn resolve(&self) -> Result<NodeConfig, TfError> {
        let veh = required(&self.veh, "veh")?;
        let map = required(&self.map, "map")?;
        let tag_id = required(&self.tag_id, "tag_id")?;

        if !self.min_dist_odom.is_finite() || self.min_dist_odom < 0.0 {
            return Err(TfError::ConfigurationMissing(format!(
                "min_dist_odom must be a non-negative number, got {}",
                self.min_dist_odom
            )));
        }
        if self.fetch_period_secs == 0 || self.publish_period_secs == 0 {
            return Err(TfError::ConfigurationMissing(
                "fetch_period_secs and publish_period_secs must be positive".to_string(),
            ));
        }

        let mut node = NodeConfig::new(veh, map, marker_id(Some(tag_id)));
        if let Some(topic) = self.odometry_topic.as_deref().filter(|t| !t.is_empty()) {
            node.odometry_topic = topic.to_string();
        }
        node.min_dist_odom = self.min_dist_odom;
        node.fetch_period = Duration::from_secs(self.fetch_period_secs);
        node.publish_period = Duration::from_secs(self.publish_period_secs);
        Ok(node)
    }

    /// Local lookup buffer holding every `[[static_transforms]]` entry,
    /// stamped now.
    pub fn build_buffer(&self) -> TfBuffer {
        let now = Utc::now();
        let mut buffer = TfBuffer::new();
        for entry in &self.static_transforms {
            buffer.set_transform(&entry.parent, &entry.child, entry.transform(), now);
        }
        buffer
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, TfError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TfError::ConfigurationMissing(name.to_string()))
}

/// Process exit code for a configuration failure: 1 for `veh`, 2 for `map`,
/// 3 for `tag_id`, 1 for anything else.
pub fn exit_code(err: &TfError) -> i32 {
    match err {
        TfError::ConfigurationMissing(name) if name == "map" => 2,
        TfError::ConfigurationMissing(name) if name == "tag_id" => 3,
        _ => 1,
    }
}

/// `$TFMESH_CONFIG`, or `~/.tfmesh/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TFMESH_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tfmesh").join("config.toml")
}

/// Load the config file (defaults when absent) and apply the process
/// environment on top.
pub fn load() -> Result<Config, TfError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TfError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        TfError::Serialization(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| TfError::Serialization(format!("failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `TFMESH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TFMESH_VEH` | `veh` |
/// | `TFMESH_MAP` | `map` |
/// | `TFMESH_TAG_ID` | `tag_id` |
/// | `TFMESH_ODOMETRY_TOPIC` | `odometry_topic` |
/// | `TFMESH_MIN_DIST_ODOM` | `min_dist_odom` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// [`apply_env_overrides`] over an arbitrary variable source.
pub(crate) fn apply_overrides_from(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("TFMESH_VEH") {
        cfg.veh = Some(v);
    }
    if let Some(v) = var("TFMESH_MAP") {
        cfg.map = Some(v);
    }
    if let Some(v) = var("TFMESH_TAG_ID") {
        cfg.tag_id = Some(v);
    }
    if let Some(v) = var("TFMESH_ODOMETRY_TOPIC") {
        cfg.odometry_topic = Some(v);
    }
    if let Some(v) = var("TFMESH_MIN_DIST_ODOM")
        && let Ok(d) = v.parse::<f64>()
    {
        cfg.min_dist_odom = d;
    }
}
