// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The registry: names, programs, processes, and IPCP entries.
//!
//! All four tables live behind one lock in [`crate::irmd`] (`reg_lock` in
//! the concurrency model) since program/process binds mutate the registry
//! entry they're bound to in the same step. This module defines the
//! tables and the per-name state machine; it does not itself take locks.

use crate::error::RegistryError;
use crate::ipcp_entry::IpcpEntry;
use crate::name::Name;
use std::collections::HashMap;

/// Lifecycle state of one registered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Idle,
    AutoAccept,
    AutoExec,
    FlowAccept,
    FlowArrived,
    Destroyed,
}

/// A program bindable to one or more names, spawnable on demand.
#[derive(Debug, Clone)]
pub struct ProgramEntry {
    pub executable_path: String,
    pub argv: Vec<String>,
    pub auto_exec: bool,
    pub names: Vec<Name>,
}

/// Wait state of a process blocked in `flow_accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Announced,
    AcceptSleep,
    Woken,
}

/// A live process that announced itself to IRMd.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: i32,
    pub program_tag: Option<String>,
    pub names: Vec<Name>,
    pub waiter_state: WaiterState,
}

/// Per-name registry bookkeeping: membership in layers plus who can serve it.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: Name,
    pub state: RegistryState,
    pub dif_memberships: Vec<String>,
    pub reg_processes: Vec<i32>,
    pub reg_programs: Vec<String>,
}

impl RegistryEntry {
    fn new(name: Name) -> Self {
        RegistryEntry {
            name,
            state: RegistryState::Idle,
            dif_memberships: Vec::new(),
            reg_processes: Vec::new(),
            reg_programs: Vec::new(),
        }
    }

    /// Recomputes `idle`/`flow-accept`/`auto-accept` from current
    /// membership — called after every bind/unbind so the invariant "a
    /// name is in flow-accept iff a process is blocked accepting on it"
    /// holds without being hand-maintained at every call site.
    fn recompute_idle_states(&mut self, any_accepting: bool) {
        if matches!(self.state, RegistryState::FlowArrived | RegistryState::Destroyed) {
            return;
        }
        self.state = if any_accepting {
            RegistryState::FlowAccept
        } else if !self.reg_programs.is_empty() {
            RegistryState::AutoAccept
        } else {
            RegistryState::Idle
        };
    }
}

/// The combined registry: names, programs, processes, and IPCP entries.
#[derive(Debug, Default)]
pub struct Registry {
    pub names: HashMap<Name, RegistryEntry>,
    pub programs: HashMap<String, ProgramEntry>,
    pub processes: HashMap<i32, ProcessEntry>,
    pub ipcps: HashMap<i32, IpcpEntry>,
    pub spawned_pids: Vec<i32>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registers `name` into the DIF memberships named by `layers`. Creates
    /// the registry entry if this is the first registration for the name.
    pub fn reg_name(&mut self, name: &Name, layers: &[String]) {
        let entry = self
            .names
            .entry(name.clone())
            .or_insert_with(|| RegistryEntry::new(name.clone()));
        for layer in layers {
            if !entry.dif_memberships.contains(layer) {
                entry.dif_memberships.push(layer.clone());
            }
        }
    }

    /// Removes `name` from the named layers. Round-trips with `reg_name`:
    /// `reg_name(n, L); unreg_name(n, L)` restores the prior membership set.
    pub fn unreg_name(&mut self, name: &Name, layers: &[String]) {
        if let Some(entry) = self.names.get_mut(name) {
            entry.dif_memberships.retain(|l| !layers.contains(l));
        }
    }

    pub fn bind_program(
        &mut self,
        tag: &str,
        executable_path: String,
        argv: Vec<String>,
        auto_exec: bool,
        names: Vec<Name>,
    ) -> Result<(), RegistryError> {
        if executable_path.is_empty() {
            return Err(RegistryError::Invalid("empty executable path".into()));
        }
        for name in &names {
            let entry = self
                .names
                .entry(name.clone())
                .or_insert_with(|| RegistryEntry::new(name.clone()));
            if !entry.reg_programs.contains(&tag.to_string()) {
                entry.reg_programs.push(tag.to_string());
            }
            let any_accepting = !entry.reg_processes.is_empty();
            entry.recompute_idle_states(any_accepting);
        }
        self.programs.insert(
            tag.to_string(),
            ProgramEntry {
                executable_path,
                argv,
                auto_exec,
                names,
            },
        );
        Ok(())
    }

    /// Restores the program table to its state before the matching
    /// `bind_program`, for names that are still registered.
    pub fn unbind_program(&mut self, tag: &str) -> Result<(), RegistryError> {
        let program = self
            .programs
            .remove(tag)
            .ok_or_else(|| RegistryError::ProgramNotFound(tag.to_string()))?;
        for name in &program.names {
            if let Some(entry) = self.names.get_mut(name) {
                entry.reg_programs.retain(|p| p != tag);
                let any_accepting = !entry.reg_processes.is_empty();
                entry.recompute_idle_states(any_accepting);
            }
        }
        Ok(())
    }

    /// Associates `pid` directly with `names`, for a process serving
    /// those names itself rather than through a bound program.
    pub fn bind_process(&mut self, pid: i32, names: Vec<Name>) -> Result<(), RegistryError> {
        let process = self
            .processes
            .get_mut(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        for name in names {
            if !process.names.contains(&name) {
                process.names.push(name);
            }
        }
        Ok(())
    }

    /// Reverses `bind_process`, also dropping any accept claim `pid` held
    /// on the named entries.
    pub fn unbind_process(&mut self, pid: i32, names: &[Name]) -> Result<(), RegistryError> {
        let process = self
            .processes
            .get_mut(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        process.names.retain(|n| !names.contains(n));
        for name in names {
            if let Some(entry) = self.names.get_mut(name) {
                entry.reg_processes.retain(|p| *p != pid);
                let any_accepting = !entry.reg_processes.is_empty();
                entry.recompute_idle_states(any_accepting);
            }
        }
        Ok(())
    }

    pub fn proc_announce(&mut self, pid: i32, program_tag: Option<String>) {
        let names = program_tag
            .as_deref()
            .and_then(|tag| self.programs.get(tag))
            .map(|p| p.names.clone())
            .unwrap_or_default();
        self.processes.insert(
            pid,
            ProcessEntry {
                pid,
                program_tag,
                names,
                waiter_state: WaiterState::Announced,
            },
        );
    }

    /// Marks `pid` as blocked accepting on `name`, and puts the name's
    /// registry entry into `flow-accept`.
    pub fn begin_accept(&mut self, pid: i32, name: &Name) -> Result<(), RegistryError> {
        let process = self
            .processes
            .get_mut(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        process.waiter_state = WaiterState::AcceptSleep;
        if !process.names.contains(name) {
            process.names.push(name.clone());
        }

        let entry = self
            .names
            .entry(name.clone())
            .or_insert_with(|| RegistryEntry::new(name.clone()));
        if !entry.reg_processes.contains(&pid) {
            entry.reg_processes.push(pid);
        }
        entry.recompute_idle_states(true);
        Ok(())
    }

    /// Transitions a `flow-accept`/`auto-accept` entry to `flow-arrived`,
    /// refusing if another arrival already claimed it.
    pub fn mark_flow_arrived(&mut self, name: &Name) -> Result<(), RegistryError> {
        let entry = self
            .names
            .get_mut(name)
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))?;
        match entry.state {
            RegistryState::FlowAccept | RegistryState::AutoAccept | RegistryState::AutoExec => {
                entry.state = RegistryState::FlowArrived;
                Ok(())
            }
            RegistryState::FlowArrived => Err(RegistryError::NoProcesses(name.to_string())),
            _ => Err(RegistryError::NoProcesses(name.to_string())),
        }
    }

    /// Releases the claim a woken acceptor took on `name`, returning it to
    /// idle or back to flow-accept/auto-accept depending on who's left.
    /// If the acceptor had just consumed an arrived flow, this is also
    /// what moves the entry out of `flow-arrived` — the only way it ever
    /// leaves that state — so a later arrival isn't rejected forever.
    pub fn end_accept(&mut self, pid: i32, name: &Name) {
        if let Some(process) = self.processes.get_mut(&pid) {
            process.waiter_state = WaiterState::Woken;
        }
        if let Some(entry) = self.names.get_mut(name) {
            entry.reg_processes.retain(|p| *p != pid);
            if entry.state == RegistryState::FlowArrived {
                entry.state = RegistryState::Idle;
            }
            let any_accepting = !entry.reg_processes.is_empty();
            entry.recompute_idle_states(any_accepting);
        }
    }

    pub fn evict_process(&mut self, pid: i32) {
        if let Some(process) = self.processes.remove(&pid) {
            for name in &process.names {
                if let Some(entry) = self.names.get_mut(name) {
                    entry.reg_processes.retain(|p| *p != pid);
                    let any_accepting = !entry.reg_processes.is_empty();
                    entry.recompute_idle_states(any_accepting);
                }
            }
        }
    }

    pub fn ipcps_matching(&self, glob: &str) -> Vec<i32> {
        self.ipcps
            .values()
            .filter(|e| glob_match(glob, e.name.as_str()))
            .map(|e| e.pid)
            .collect()
    }
}

/// Minimal shell-glob matcher supporting `*` and `?`, enough for `irm list`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}
