// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The IRM flow table: port-id allocation plus the alloc-pending /
//! allocated / dealloc-pending / null state machine shared by IRMd and
//! every IPCP.

use crate::bitmap::Bitmap;
use crate::error::FlowError;
use std::collections::HashMap;
use std::time::Instant;

/// QoS cube requested at allocation time. Left as an opaque small integer:
/// the policy that interprets it belongs to a normal IPCP's routing layer,
/// out of scope here.
pub type QosCube = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    AllocPending,
    Allocated,
    DeallocPending,
    Null,
}

impl FlowState {
    fn name(self) -> &'static str {
        match self {
            FlowState::AllocPending => "alloc-pending",
            FlowState::Allocated => "allocated",
            FlowState::DeallocPending => "dealloc-pending",
            FlowState::Null => "null",
        }
    }
}

/// One IRM flow: a port id plus the two endpoint pids and its state.
#[derive(Debug, Clone)]
pub struct IrmFlow {
    pub port_id: u32,
    /// The requesting/accepting user process, cleared by the first
    /// `flow_dealloc` call from that side.
    pub n_pid: Option<i32>,
    /// The serving IPCP process, cleared by the first `flow_dealloc` call
    /// from that side.
    pub n_1_pid: Option<i32>,
    pub qos_cube: QosCube,
    pub state: FlowState,
    pub t0: Instant,
}

impl IrmFlow {
    fn new(port_id: u32, n_pid: i32, n_1_pid: i32, qos_cube: QosCube, now: Instant) -> Self {
        IrmFlow {
            port_id,
            n_pid: Some(n_pid),
            n_1_pid: Some(n_1_pid),
            qos_cube,
            state: FlowState::AllocPending,
            t0: now,
        }
    }

    fn require_state(&self, expected: FlowState) -> Result<(), FlowError> {
        if self.state != expected {
            return Err(FlowError::WrongState(
                self.port_id,
                self.state.name(),
                expected.name(),
            ));
        }
        Ok(())
    }
}

/// Process-wide port-id bitmap plus the live flow table. Both are guarded
/// by one lock upstream (`flows_lock`): inserting a flow and claiming its
/// port id must be atomic with respect to a concurrent allocation.
#[derive(Debug)]
pub struct FlowTable {
    bitmap: Bitmap,
    flows: HashMap<u32, IrmFlow>,
}

/// Default process-wide port-id space. Matches the scale the source's
/// `PROG_MAX_FLOWS` bound targets for a single IRMd instance.
pub const MAX_FLOWS: usize = 8192;

impl FlowTable {
    pub fn new() -> Self {
        FlowTable {
            bitmap: Bitmap::new(MAX_FLOWS),
            flows: HashMap::new(),
        }
    }

    /// Allocates a port id and inserts a new flow in `alloc-pending`.
    pub fn alloc_pending(
        &mut self,
        n_pid: i32,
        n_1_pid: i32,
        qos_cube: QosCube,
        now: Instant,
    ) -> Result<u32, FlowError> {
        let port_id = self.bitmap.alloc().ok_or(FlowError::PortIdsExhausted)?;
        self.flows.insert(
            port_id,
            IrmFlow::new(port_id, n_pid, n_1_pid, qos_cube, now),
        );
        Ok(port_id)
    }

    pub fn get(&self, port_id: u32) -> Option<&IrmFlow> {
        self.flows.get(&port_id)
    }

    /// Drives `alloc-pending → allocated` (response 0) or `→ null`
    /// (nonzero response, port id returned to the bitmap).
    pub fn complete_alloc(&mut self, port_id: u32, accepted: bool) -> Result<(), FlowError> {
        let flow = self
            .flows
            .get_mut(&port_id)
            .ok_or(FlowError::UnknownPortId(port_id))?;
        flow.require_state(FlowState::AllocPending)?;
        if accepted {
            flow.state = FlowState::Allocated;
            Ok(())
        } else {
            flow.state = FlowState::Null;
            self.flows.remove(&port_id);
            self.bitmap.free(port_id);
            Ok(())
        }
    }

    /// First call by either endpoint clears that endpoint's pid and moves
    /// `allocated → dealloc-pending`; the second call (from the other
    /// endpoint, or the sanitiser acting for a dead one) frees the port id.
    pub fn dealloc(&mut self, port_id: u32, by_n_side: bool) -> Result<bool, FlowError> {
        let flow = self
            .flows
            .get_mut(&port_id)
            .ok_or(FlowError::UnknownPortId(port_id))?;

        match flow.state {
            FlowState::Allocated => {
                if by_n_side {
                    flow.n_pid = None;
                } else {
                    flow.n_1_pid = None;
                }
                flow.state = FlowState::DeallocPending;
                Ok(false)
            }
            FlowState::DeallocPending => {
                flow.state = FlowState::Null;
                self.flows.remove(&port_id);
                self.bitmap.free(port_id);
                Ok(true)
            }
            FlowState::AllocPending => {
                // A dealloc racing an in-flight allocation aborts it outright.
                flow.state = FlowState::Null;
                self.flows.remove(&port_id);
                self.bitmap.free(port_id);
                Ok(true)
            }
            FlowState::Null => Err(FlowError::UnknownPortId(port_id)),
        }
    }

    /// Forces full teardown regardless of state, used by the sanitiser
    /// once it has proven both endpoints are dead.
    pub fn force_dealloc(&mut self, port_id: u32) {
        if self.flows.remove(&port_id).is_some() {
            self.bitmap.free(port_id);
        }
    }

    pub fn ages_past(&self, timeout: std::time::Duration, now: Instant) -> Vec<u32> {
        self.flows
            .values()
            .filter(|f| f.state == FlowState::AllocPending && now.duration_since(f.t0) > timeout)
            .map(|f| f.port_id)
            .collect()
    }

    pub fn allocated_count(&self) -> usize {
        self.bitmap.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IrmFlow> {
        self.flows.values()
    }

    pub fn is_full(&self) -> bool {
        self.bitmap.len() >= MAX_FLOWS
    }
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_id_returns_to_bitmap_only_after_two_phase_dealloc() {
        let mut table = FlowTable::new();
        let now = Instant::now();
        let port_id = table.alloc_pending(1, 100, 0, now).unwrap();
        table.complete_alloc(port_id, true).unwrap();

        assert_eq!(table.allocated_count(), 1);
        assert!(!table.dealloc(port_id, true).unwrap());
        assert_eq!(table.allocated_count(), 1, "port id still held mid-teardown");
        assert!(table.dealloc(port_id, false).unwrap());
        assert_eq!(table.allocated_count(), 0);
        assert!(table.get(port_id).is_none());
    }

    #[test]
    fn rejected_alloc_frees_port_id_immediately() {
        let mut table = FlowTable::new();
        let now = Instant::now();
        let port_id = table.alloc_pending(1, 100, 0, now).unwrap();
        table.complete_alloc(port_id, false).unwrap();
        assert_eq!(table.allocated_count(), 0);
    }

    #[test]
    fn sanitiser_ages_out_stale_alloc_pending_flows() {
        let mut table = FlowTable::new();
        let old = Instant::now() - std::time::Duration::from_secs(10);
        let port_id = table.alloc_pending(1, 100, 0, old).unwrap();
        let aged = table.ages_past(std::time::Duration::from_secs(1), Instant::now());
        assert_eq!(aged, vec![port_id]);
    }

    #[test]
    fn dealloc_of_unknown_port_id_errors() {
        let mut table = FlowTable::new();
        assert!(table.dealloc(999, true).is_err());
    }
}
