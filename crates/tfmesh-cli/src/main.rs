//! `tfmesh` – distributed transform-edge publisher
//!
//! Runs one agent's [`TfNode`] in-process:
//!
//! 1. Loads `~/.tfmesh/config.toml` plus `TFMESH_*` overrides; exits with
//!    code 1, 2 or 3 when `veh`, `map` or `tag_id` is missing.
//! 2. Seeds a local transform buffer from `[[static_transforms]]`.
//! 3. Reads JSON-lines pose samples from stdin onto the odometry topic.
//! 4. Prints every edge published to the group as one JSON line on stdout.
//! 5. Intercepts **Ctrl-C** to stop the node and leave the group.
//!
//! A pose line looks like
//! `{"translation":{"x":0.3,"y":0.0,"z":0.0},"rotation":{"w":1.0,"x":0.0,"y":0.0,"z":0.0}}`;
//! `rotation` defaults to identity and `timestamp` (RFC 3339) to now.

mod config;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tfmesh_middleware::{
    BusOdometrySource, CommunicationGroup, Disseminator, EventBus, GroupSubscriber, OdometryIngest,
    Topic,
};
use tfmesh_runtime::{NodeConfig, TfNode};
use tfmesh_types::{Event, EventPayload, Pose, Quaternion, TfError, Vec3};

fn main() {
    let _telemetry = tfmesh_runtime::init_tracing("tfmesh");

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(1);
        }
    };
    let node_config = match cfg.resolve() {
        Ok(node) => node,
        Err(e) => {
            eprintln!("{}: {}", "Missing configuration".red(), e);
            std::process::exit(config::exit_code(&e));
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start Tokio runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg, node_config));
    // The stdin reader sits in a blocking read that abort cannot interrupt.
    runtime.shutdown_timeout(Duration::from_secs(1));
}

async fn run(cfg: config::Config, node_config: NodeConfig) {
    eprintln!(
        "  {} {} → {} {}",
        "tfmesh".bold(),
        node_config.hostname.bold(),
        node_config.map.cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );

    let bus = Arc::new(EventBus::default());
    let group = Arc::new(CommunicationGroup::new(&cfg.group, Arc::clone(&bus)));
    let lookup = Arc::new(cfg.build_buffer());

    // Subscribe before anything is published.
    let printer = tokio::spawn(print_edges(group.subscribe(None)));
    let source = BusOdometrySource::new(Arc::clone(&bus), &node_config.odometry_topic);
    let odometry = source.subscribe();
    let ingest = OdometryIngest::new(Arc::clone(&bus), &node_config.odometry_topic);

    let node = TfNode::new(node_config, lookup, Arc::clone(&group) as Arc<dyn Disseminator>);
    let shutdown = node.shutdown_token();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_bus = Arc::clone(&bus);
    let ctrlc_token = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let alert = Event::new(
            "tfmesh-cli",
            EventPayload::Alert {
                component: "cli".to_string(),
                message: "operator Ctrl-C".to_string(),
            },
        );
        let _ = ctrlc_bus.publish_to(Topic::SystemAlerts, alert);
        ctrlc_token.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let reader = tokio::spawn(read_poses(ingest));

    let stats = node.run(odometry).await;
    group.shutdown();
    reader.abort();
    printer.abort();

    eprintln!(
        "  {} {} samples, {} odometry edges",
        "✓".green().bold(),
        stats.odometry_samples,
        stats.odometry_edges
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// stdin → odometry topic
// ─────────────────────────────────────────────────────────────────────────────

/// One stdin line.
#[derive(Debug, Deserialize)]
struct PoseLine {
    translation: Vec3,
    #[serde(default)]
    rotation: Quaternion,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl PoseLine {
    fn into_pose(self) -> Pose {
        Pose::new(
            self.translation,
            self.rotation,
            self.timestamp.unwrap_or_else(Utc::now),
        )
    }
}

fn parse_pose(line: &str) -> Result<Pose, TfError> {
    serde_json::from_str::<PoseLine>(line)
        .map(PoseLine::into_pose)
        .map_err(|e| TfError::Serialization(e.to_string()))
}

async fn read_poses(ingest: OdometryIngest) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if let Err(e) = parse_pose(&line).and_then(|pose| ingest.ingest(pose)) {
                    warn!(error = %e, "rejected pose sample");
                }
            }
            Ok(None) => {
                info!("stdin closed; static edges keep publishing until Ctrl-C");
                break;
            }
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// group → stdout
// ─────────────────────────────────────────────────────────────────────────────

async fn print_edges(mut subscriber: GroupSubscriber) {
    while let Some((destination, message)) = subscriber.recv().await {
        let line = serde_json::json!({ "destination": destination, "message": message });
        println!("{line}");
    }
}
