//! # Joint angle reader
//!
//! Assembles one snapshot of every joint's angle per cycle. Servo joints are read in one bulk
//! transaction, hydraulic joints come from the latest field bus samples.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::{
    field_bus::{NodeId, SubjectId},
    servo::{ServoBus, ServoId},
};
use comms_if::{
    joint::{all_joints, JointKey},
    msg::{HeadAngle, LegAngle},
};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Angle of every joint, `None` if no valid reading was available.
pub type AngleMap = BTreeMap<JointKey, Option<f32>>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct AngleReader {
    /// Servo id of each servo joint.
    servo_ids: BTreeMap<JointKey, ServoId>,

    /// The joint each (node, subject) pair reports.
    sources: BTreeMap<(NodeId, SubjectId), JointKey>,

    /// Samples older than this are not used.
    sample_timeout: Duration,

    /// Latest field bus sample of each hydraulic joint.
    samples: BTreeMap<JointKey, (f32, Instant)>,

    snapshot: AngleMap,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AngleReader {
    pub fn new(
        servo_ids: BTreeMap<JointKey, ServoId>,
        sources: BTreeMap<(NodeId, SubjectId), JointKey>,
        sample_timeout: Duration,
    ) -> Self {
        Self {
            servo_ids,
            sources,
            sample_timeout,
            samples: BTreeMap::new(),
            snapshot: all_joints().into_iter().map(|k| (k, None)).collect(),
        }
    }

    /// Store a scalar sample from the field bus.
    ///
    /// Returns false if the (node, subject) pair isn't a joint angle source.
    pub fn on_field_bus_sample(
        &mut self,
        node_id: NodeId,
        subject_id: SubjectId,
        value: f32,
        now: Instant,
    ) -> bool {
        match self.sources.get(&(node_id, subject_id)) {
            Some(key) => {
                if value.is_finite() {
                    self.samples.insert(*key, (value, now));
                } else {
                    trace!("Dropping non-finite sample for {}", key);
                }
                true
            }
            None => false,
        }
    }

    /// Read every joint, returning the new snapshot.
    ///
    /// If the servo read fails as a whole every servo joint is absent for this cycle.
    pub fn read_all(&mut self, bus: &mut dyn ServoBus, now: Instant) -> &AngleMap {
        let ids: Vec<ServoId> = self.servo_ids.values().copied().collect();

        match bus.bulk_read(&ids) {
            Ok(angles) => {
                for (key, id) in self.servo_ids.iter() {
                    let angle = angles.get(id).copied();
                    if angle.is_none() {
                        trace!("No response from servo {} ({})", id, key);
                    }
                    self.snapshot.insert(*key, angle);
                }
            }
            Err(e) => {
                warn!("Servo read failed: {}", e);
                for key in self.servo_ids.keys() {
                    self.snapshot.insert(*key, None);
                }
            }
        }

        self.refresh_field_bus(now)
    }

    /// Update only the field bus joints of the snapshot.
    pub fn refresh_field_bus(&mut self, now: Instant) -> &AngleMap {
        for key in self.sources.values() {
            let angle = match self.samples.get(key) {
                Some((value, t)) if now.saturating_duration_since(*t) <= self.sample_timeout => {
                    Some(*value)
                }
                _ => None,
            };
            self.snapshot.insert(*key, angle);
        }

        &self.snapshot
    }

    /// Angle of one joint in the latest snapshot.
    pub fn angle(&self, key: JointKey) -> Option<f32> {
        self.snapshot.get(&key).copied().flatten()
    }

    pub fn snapshot(&self) -> &AngleMap {
        &self.snapshot
    }

    /// The latest snapshot as a pair of angle messages.
    pub fn to_msgs(&self) -> (LegAngle, HeadAngle) {
        let mut leg = LegAngle::default();
        let mut head = HeadAngle::default();

        for (key, angle) in self.snapshot.iter() {
            match key {
                JointKey::Leg(limb, joint) => leg.set(*limb, *joint, *angle),
                JointKey::Head(joint) => head.set(*joint, *angle),
            }
        }

        (leg, head)
    }
}
