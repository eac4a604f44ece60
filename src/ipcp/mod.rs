// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The generic IPCP runtime: shared state every IPCP type carries, and
//! the [`IpcpOps`] trait each transport implements.
//!
//! IPCP type is modeled as a tagged variant dispatched through one trait
//! rather than a C-style function-pointer table; an operation an IPCP
//! type doesn't support returns [`crate::error::IpcpError::Unsupported`]
//! rather than a null check at the call site.

pub mod local;
pub mod shim_udp;

use crate::error::IpcpError;
use crate::flow::QosCube;
use crate::name::DirHash;
use std::collections::HashMap;
use std::sync::RwLock;

/// Lifecycle of one IPCP process, as seen from inside itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcpState {
    Init,
    Enrolled,
    Shutdown,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFlowState {
    Null,
    Pending,
    Allocated,
}

/// One entry in an IPCP's flow table, indexed by port id.
#[derive(Debug, Clone)]
pub struct IpcpFlow {
    pub state: LocalFlowState,
    pub peer_hash: Option<DirHash>,
    /// The paired local fd this flow's data plane forwards to, once the
    /// loopback or shim pairing has been established.
    pub paired_port_id: Option<u32>,
}

impl Default for IpcpFlow {
    fn default() -> Self {
        IpcpFlow {
            state: LocalFlowState::Null,
            peer_hash: None,
            paired_port_id: None,
        }
    }
}

/// State shared by every IPCP type: lifecycle state, local directory,
/// and flow table. Guarded by one reader-writer lock per the
/// concurrency model (`ipcpi.state_lock`/per-IPCP `lock`).
pub struct IpcpRuntime {
    pub state: RwLock<IpcpState>,
    pub directory: RwLock<HashMap<DirHash, ()>>,
    pub flows: RwLock<HashMap<u32, IpcpFlow>>,
}

impl Default for IpcpRuntime {
    fn default() -> Self {
        IpcpRuntime {
            state: RwLock::new(IpcpState::Init),
            directory: RwLock::new(HashMap::new()),
            flows: RwLock::new(HashMap::new()),
        }
    }
}

impl IpcpRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hashes: Vec<DirHash>) {
        let mut dir = self.directory.write().unwrap();
        for h in hashes {
            dir.insert(h, ());
        }
    }

    pub fn unregister(&self, hashes: &[DirHash]) {
        let mut dir = self.directory.write().unwrap();
        for h in hashes {
            dir.remove(h);
        }
    }

    pub fn query(&self, hash: &DirHash) -> bool {
        self.directory.read().unwrap().contains_key(hash)
    }
}

/// The operations every IPCP type may implement. Any method an IPCP
/// doesn't support returns `IpcpError::Unsupported`.
pub trait IpcpOps: Send + Sync {
    fn bootstrap(&self, config: &str) -> Result<(), IpcpError>;

    fn enroll(&self, dst_layer: &str) -> Result<(), IpcpError> {
        let _ = dst_layer;
        Err(IpcpError::Unsupported)
    }

    fn register(&self, hashes: Vec<DirHash>) -> Result<(), IpcpError>;

    fn unregister(&self, hashes: &[DirHash]) -> Result<(), IpcpError>;

    fn flow_alloc(
        &self,
        port_id: u32,
        n_pid: i32,
        dst_hash: &DirHash,
        qos: QosCube,
    ) -> Result<(), IpcpError>;

    fn flow_alloc_resp(&self, port_id: u32, n_pid: i32, accept: bool) -> Result<(), IpcpError>;

    fn flow_dealloc(&self, port_id: u32) -> Result<(), IpcpError>;

    fn query(&self, hash: &DirHash) -> Result<bool, IpcpError>;
}
