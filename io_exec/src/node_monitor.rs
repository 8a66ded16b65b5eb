//! # Node monitor
//!
//! Tracks the heartbeats of the field bus nodes. The set of monitored nodes is fixed when the
//! monitor is built, a monitored node which has never sent a heartbeat fails every check.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

use crate::field_bus::{Health, Mode, NodeId};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// A node which hasn't sent a heartbeat for this long is disconnected.
pub const NODE_TIMEOUT: Duration = Duration::from_secs(5);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The last heartbeat received from a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord {
    pub last_heartbeat: Instant,
    pub uptime_s: u32,
    pub health: Health,
    pub mode: Mode,
}

pub struct NodeMonitor {
    monitored: BTreeSet<NodeId>,

    records: BTreeMap<NodeId, NodeRecord>,

    /// Every node seen on the bus, including unmonitored ones.
    detected: BTreeSet<NodeId>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NodeMonitor {
    pub fn new<I: IntoIterator<Item = NodeId>>(monitored: I) -> Self {
        Self {
            monitored: monitored.into_iter().collect(),
            records: BTreeMap::new(),
            detected: BTreeSet::new(),
        }
    }

    /// Record a heartbeat.
    pub fn on_heartbeat(
        &mut self,
        node_id: NodeId,
        uptime_s: u32,
        health: Health,
        mode: Mode,
        now: Instant,
    ) {
        if self.detected.insert(node_id) {
            info!(
                "Detected node {} ({:?}, {:?}, up {} s)",
                node_id, health, mode, uptime_s
            );
        }

        if !self.monitored.contains(&node_id) {
            return;
        }

        if let Some(prev) = self.records.get(&node_id) {
            if prev.health != health || prev.mode != mode {
                debug!(
                    "Node {} changed from ({:?}, {:?}) to ({:?}, {:?})",
                    node_id, prev.health, prev.mode, health, mode
                );
            }
        }

        self.records.insert(
            node_id,
            NodeRecord {
                last_heartbeat: now,
                uptime_s,
                health,
                mode,
            },
        );
    }

    /// Check that every monitored node has sent a heartbeat within `timeout`.
    ///
    /// Returns whether all are connected and the ids of those which are not.
    pub fn is_connected(&self, timeout: Duration) -> (bool, Vec<NodeId>) {
        self.is_connected_at(Instant::now(), timeout)
    }

    /// As [`NodeMonitor::is_connected`], with an explicit current time.
    pub fn is_connected_at(&self, now: Instant, timeout: Duration) -> (bool, Vec<NodeId>) {
        self.check(|r| now.saturating_duration_since(r.last_heartbeat) <= timeout)
    }

    /// Check that every monitored node last reported nominal health.
    pub fn is_healthy(&self) -> (bool, Vec<NodeId>) {
        self.check(|r| r.health == Health::Nominal)
    }

    /// Check that every monitored node last reported operational mode.
    pub fn is_operational(&self) -> (bool, Vec<NodeId>) {
        self.check(|r| r.mode == Mode::Operational)
    }

    /// Run all three checks, returning the union of the failing nodes.
    pub fn all_ok_at(&self, now: Instant, timeout: Duration) -> (bool, Vec<NodeId>) {
        let mut failed: BTreeSet<NodeId> = BTreeSet::new();
        failed.extend(self.is_connected_at(now, timeout).1);
        failed.extend(self.is_healthy().1);
        failed.extend(self.is_operational().1);

        (failed.is_empty(), failed.into_iter().collect())
    }

    /// Every node which has sent at least one heartbeat.
    pub fn detected_nodes(&self) -> Vec<NodeId> {
        self.detected.iter().copied().collect()
    }

    pub fn record(&self, node_id: NodeId) -> Option<&NodeRecord> {
        self.records.get(&node_id)
    }

    fn check<F: Fn(&NodeRecord) -> bool>(&self, pred: F) -> (bool, Vec<NodeId>) {
        let failed: Vec<NodeId> = self
            .monitored
            .iter()
            .filter(|id| !self.records.get(*id).map(|r| pred(r)).unwrap_or(false))
            .copied()
            .collect();

        (failed.is_empty(), failed)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Format a list of node ids for logging, e.g. `[1, 4]`.
pub fn format_ids(ids: &[NodeId]) -> String {
    format!("{:?}", ids)
}
