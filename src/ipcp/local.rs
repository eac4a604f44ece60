// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The loopback (local) IPCP: the mandatory transport used for
//! same-host flows. A single reader thread blocks on a pollable set of
//! ready ring indices and, for each ready fd, moves a buffer index from
//! that flow's rx ring to its pair's tx ring.
//!
//! Since the shared-memory buffer pool's bit-exact layout is an external
//! collaborator contract (spec §1), rings here are modeled as per-port
//! index queues rather than raw shared-memory segments — the pairing and
//! flow-control logic is identical, only the transport of the index
//! differs.

use super::{IpcpFlow, IpcpOps, IpcpRuntime, LocalFlowState};
use crate::error::IpcpError;
use crate::flow::QosCube;
use crate::name::DirHash;
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

/// A pollable set of ring indices ready to be drained — the in-process
/// stand-in for `shm_flow_set`.
#[derive(Default)]
pub struct FlowSet {
    ready: Mutex<Vec<u32>>,
    cond: Condvar,
}

impl FlowSet {
    pub fn notify(&self, port_id: u32) {
        let mut ready = self.ready.lock().unwrap();
        if !ready.contains(&port_id) {
            ready.push(port_id);
        }
        self.cond.notify_one();
    }

    /// Blocks until at least one port id is ready, then drains and
    /// returns all of them.
    pub fn wait_ready(&self) -> Vec<u32> {
        let mut ready = self.ready.lock().unwrap();
        while ready.is_empty() {
            ready = self.cond.wait(ready).unwrap();
        }
        std::mem::take(&mut *ready)
    }
}

pub struct LocalIpcp {
    runtime: IpcpRuntime,
    /// `fd -> paired fd`, established at flow_alloc/flow_alloc_resp time.
    pairs: Mutex<HashMap<u32, u32>>,
    /// Indices written to a port, pending forwarding to its pair.
    rx_rings: Mutex<HashMap<u32, VecDeque<u32>>>,
    /// Indices already forwarded from a port's pair, ready for the local
    /// owner to read.
    tx_rings: Mutex<HashMap<u32, VecDeque<u32>>>,
    flow_set: FlowSet,
}

impl Default for LocalIpcp {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalIpcp {
    pub fn new() -> Self {
        LocalIpcp {
            runtime: IpcpRuntime::new(),
            pairs: Mutex::new(HashMap::new()),
            rx_rings: Mutex::new(HashMap::new()),
            tx_rings: Mutex::new(HashMap::new()),
            flow_set: FlowSet::default(),
        }
    }

    /// Establishes the pairing between two port ids, the loopback
    /// equivalent of wiring up shared-memory rings between endpoints.
    pub fn pair(&self, a: u32, b: u32) {
        self.pairs.lock().unwrap().insert(a, b);
        self.pairs.lock().unwrap().insert(b, a);
        self.rx_rings.lock().unwrap().entry(a).or_default();
        self.rx_rings.lock().unwrap().entry(b).or_default();
        self.tx_rings.lock().unwrap().entry(a).or_default();
        self.tx_rings.lock().unwrap().entry(b).or_default();
        let mut flows = self.runtime.flows.write().unwrap();
        flows.entry(a).or_default().paired_port_id = Some(b);
        flows.entry(b).or_default().paired_port_id = Some(a);
        flows.get_mut(&a).unwrap().state = LocalFlowState::Allocated;
        flows.get_mut(&b).unwrap().state = LocalFlowState::Allocated;
    }

    /// The local application at `port_id` writes `buf_idx` for forwarding
    /// to its pair.
    pub fn write_index(&self, port_id: u32, buf_idx: u32) -> Result<(), IpcpError> {
        let mut rings = self.rx_rings.lock().unwrap();
        let ring = rings
            .get_mut(&port_id)
            .ok_or(IpcpError::WrongState("no ring for port id"))?;
        ring.push_back(buf_idx);
        drop(rings);
        self.flow_set.notify(port_id);
        Ok(())
    }

    /// Reads everything forwarded to `port_id` from its pair so far.
    pub fn read_indices(&self, port_id: u32) -> Vec<u32> {
        let mut rings = self.tx_rings.lock().unwrap();
        match rings.get_mut(&port_id) {
            Some(q) => q.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// One iteration of the data-plane reader: block for ready fds, then
    /// for each, move every pending index from its rx ring to its pair's
    /// tx ring. Returns how many indices were moved.
    pub fn pump_once(&self) -> usize {
        let ready = self.flow_set.wait_ready();
        let mut moved = 0;
        for port_id in ready {
            let Some(peer) = self.pairs.lock().unwrap().get(&port_id).copied() else {
                continue;
            };
            let indices: Vec<u32> = {
                let mut rings = self.rx_rings.lock().unwrap();
                match rings.get_mut(&port_id) {
                    Some(q) => q.drain(..).collect(),
                    None => continue,
                }
            };
            let mut tx_rings = self.tx_rings.lock().unwrap();
            if let Some(q) = tx_rings.get_mut(&peer) {
                for idx in indices {
                    q.push_back(idx);
                    moved += 1;
                }
            }
        }
        moved
    }

    pub fn flow_set(&self) -> &FlowSet {
        &self.flow_set
    }
}

impl IpcpOps for LocalIpcp {
    fn bootstrap(&self, _config: &str) -> Result<(), IpcpError> {
        *self.runtime.state.write().unwrap() = super::IpcpState::Enrolled;
        Ok(())
    }

    fn register(&self, hashes: Vec<DirHash>) -> Result<(), IpcpError> {
        self.runtime.register(hashes);
        Ok(())
    }

    fn unregister(&self, hashes: &[DirHash]) -> Result<(), IpcpError> {
        self.runtime.unregister(hashes);
        Ok(())
    }

    fn flow_alloc(
        &self,
        port_id: u32,
        _n_pid: i32,
        dst_hash: &DirHash,
        _qos: QosCube,
    ) -> Result<(), IpcpError> {
        if !self.runtime.query(dst_hash) {
            return Err(IpcpError::Unreachable);
        }
        let mut flows = self.runtime.flows.write().unwrap();
        flows.entry(port_id).or_insert(IpcpFlow {
            state: LocalFlowState::Pending,
            peer_hash: Some(dst_hash.clone()),
            paired_port_id: None,
        });
        Ok(())
    }

    fn flow_alloc_resp(&self, port_id: u32, _n_pid: i32, accept: bool) -> Result<(), IpcpError> {
        let mut flows = self.runtime.flows.write().unwrap();
        let flow = flows
            .get_mut(&port_id)
            .ok_or(IpcpError::WrongState("no pending flow"))?;
        flow.state = if accept {
            LocalFlowState::Allocated
        } else {
            LocalFlowState::Null
        };
        Ok(())
    }

    fn flow_dealloc(&self, port_id: u32) -> Result<(), IpcpError> {
        self.runtime.flows.write().unwrap().remove(&port_id);
        let peer = self.pairs.lock().unwrap().remove(&port_id);
        if let Some(peer) = peer {
            self.pairs.lock().unwrap().remove(&peer);
        }
        self.rx_rings.lock().unwrap().remove(&port_id);
        self.tx_rings.lock().unwrap().remove(&port_id);
        Ok(())
    }

    fn query(&self, hash: &DirHash) -> Result<bool, IpcpError> {
        Ok(self.runtime.query(hash))
    }
}
