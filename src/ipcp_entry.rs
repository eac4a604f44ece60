// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! IRMd-side bookkeeping for one spawned IPCP process.
//!
//! Distinct from the IPCP's own runtime state ([`crate::ipcp`]): this is
//! what IRMd keeps in its registry about a process it forked, not the
//! process's view of itself.

use crate::name::{DirHashAlgo, Name, algo_by_name};
use std::fmt;

/// The kind of transport an IPCP implements.
///
/// Ordered so `ipcps_by_type_order` puts cheaper-path IPCPs first: locals,
/// then shims, then normals, matching the name-selection rule in §4.1
/// ("locals first, normals last, shims in between").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IpcpType {
    Local = 0,
    ShimUdp = 1,
    ShimEthLlc = 2,
    Normal = 3,
}

/// Bootstrap lifecycle of a spawned IPCP process, as observed by IRMd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcpInitState {
    /// Forked, awaiting its `ipcp_create_r` report.
    Boot,
    /// Reported back successfully; may receive further control RPCs.
    Live,
    /// Torn down; kept only long enough to be reaped and removed.
    Null,
}

pub struct IpcpEntry {
    pub name: Name,
    pub pid: i32,
    pub typ: IpcpType,
    pub dir_hash_algo: Box<dyn DirHashAlgo>,
    pub layer_name: Option<String>,
    pub init_state: IpcpInitState,
}

impl IpcpEntry {
    pub fn new(name: Name, pid: i32, typ: IpcpType, hash_algo_name: &str) -> Self {
        IpcpEntry {
            name,
            pid,
            typ,
            dir_hash_algo: algo_by_name(hash_algo_name),
            layer_name: None,
            init_state: IpcpInitState::Boot,
        }
    }
}

impl fmt::Debug for IpcpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcpEntry")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("typ", &self.typ)
            .field("dir_hash_algo", &self.dir_hash_algo.name())
            .field("layer_name", &self.layer_name)
            .field("init_state", &self.init_state)
            .finish()
    }
}
