// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The IRMd control loop: the owned context, the request/reply dispatch
//! table, and the worker pool that serves it.
//!
//! Lock ordering (must never be acquired in reverse): `state` → `reg` →
//! `flows`. The command queue's mutex is independent and leaf-like, taken
//! only to pop/push work items.

pub mod sanitiser;

use crate::config::IrmdConfig;
use crate::error::{FlowError, IrmdError, RegistryError};
use crate::flow::{FlowState, FlowTable, QosCube};
use crate::ipcp_entry::{IpcpEntry, IpcpInitState, IpcpType};
use crate::name::Name;
use crate::notifier::{Notifier, NotifierEvent};
use crate::registry::Registry;
use crate::wire;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Daemon-wide lifecycle flag (`IRMD_NULL`/`IRMD_RUNNING` in the source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrmdState {
    Running,
    ShuttingDown,
}

/// One request on the control socket, length-prefixed and postcard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IrmdRequest {
    CreateIpcp { name: String, typ: IpcpTypeWire },
    IpcpCreateR { pid: i32, ok: bool },
    DestroyIpcp { pid: i32 },
    BootstrapIpcp { pid: i32 },
    EnrollIpcp { pid: i32, dst_layer: String },
    BindProgram { tag: String, executable_path: String, argv: Vec<String>, auto_exec: bool, names: Vec<String> },
    UnbindProgram { tag: String },
    BindProcess { pid: i32, names: Vec<String> },
    UnbindProcess { pid: i32, names: Vec<String> },
    ProcAnnounce { pid: i32, program_tag: Option<String> },
    FlowAccept { pid: i32, timeout_ms: Option<u64> },
    FlowAlloc { pid: i32, dst_name: String, qos: QosCube, timeout_ms: Option<u64> },
    FlowDealloc { pid: i32, port_id: u32 },
    IpcpFlowReqArr { hash_owner_pid: i32, name: String, qos: QosCube },
    IpcpFlowAllocReply { port_id: u32, accepted: bool },
    ListIpcps { glob: String },
    Reg { name: String, layers: Vec<String> },
    Unreg { name: String, layers: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpcpTypeWire {
    Local,
    Normal,
    ShimUdp,
    ShimEthLlc,
}

impl From<IpcpTypeWire> for IpcpType {
    fn from(t: IpcpTypeWire) -> Self {
        match t {
            IpcpTypeWire::Local => IpcpType::Local,
            IpcpTypeWire::Normal => IpcpType::Normal,
            IpcpTypeWire::ShimUdp => IpcpType::ShimUdp,
            IpcpTypeWire::ShimEthLlc => IpcpType::ShimEthLlc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IrmdReply {
    Ok,
    Pid(i32),
    Pids(Vec<i32>),
    FlowAccepted { port_id: u32, ipcp_pid: i32, qos_cube: QosCube },
    FlowAllocated { port_id: u32 },
    FlowArrived { port_id: u32, server_pid: i32 },
    Err(String),
}

impl From<Result<IrmdReply, IrmdError>> for IrmdReply {
    fn from(r: Result<IrmdReply, IrmdError>) -> Self {
        r.unwrap_or_else(|e| IrmdReply::Err(e.to_string()))
    }
}

/// One queued unit of work: a request already read off the wire, paired
/// with the socket its reply goes back on.
struct Cmd {
    stream: UnixStream,
    request: IrmdRequest,
}

/// The single owned daemon context, passed by reference to every
/// dispatch function rather than kept as global mutable state.
pub struct IrmdContext {
    pub state: RwLock<IrmdState>,
    pub registry: RwLock<Registry>,
    pub flows: RwLock<FlowTable>,
    pub config: IrmdConfig,
    pub notifier: Notifier,
    cmd_queue: Mutex<VecDeque<Cmd>>,
    cmd_cond: Condvar,
    flow_cond: Condvar,
    flow_wait_lock: Mutex<()>,
    busy_workers: AtomicUsize,
}

impl IrmdContext {
    pub fn new(config: IrmdConfig) -> Self {
        IrmdContext {
            state: RwLock::new(IrmdState::Running),
            registry: RwLock::new(Registry::new()),
            flows: RwLock::new(FlowTable::new()),
            config,
            notifier: Notifier::new(),
            cmd_queue: Mutex::new(VecDeque::new()),
            cmd_cond: Condvar::new(),
            flow_wait_lock: Mutex::new(()),
            flow_cond: Condvar::new(),
            busy_workers: AtomicUsize::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.state.read().unwrap() == IrmdState::Running
    }

    /// Commands waiting for a worker to pick them up.
    pub fn queue_backlog(&self) -> usize {
        self.cmd_queue.lock().unwrap().len()
    }

    /// Workers currently inside [`Self::serve_one`], as opposed to parked
    /// on the queue's condvar. The pool-growth monitor in the `irmd`
    /// binary compares this against the number of live workers to decide
    /// whether the pool is saturated.
    pub fn busy_worker_count(&self) -> usize {
        self.busy_workers.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        *self.state.write().unwrap() = IrmdState::ShuttingDown;
        self.cmd_cond.notify_all();
        self.flow_cond.notify_all();
    }

    /// Wakes every thread blocked in [`Self::wait_for_flow_event`] — called
    /// after any mutation that could satisfy a waiter (alloc completion,
    /// dealloc, sanitiser sweep).
    pub fn notify_flow_event(&self) {
        self.flow_cond.notify_all();
    }

    fn wait_for_flow_event(&self, timeout: Duration) {
        let guard = self.flow_wait_lock.lock().unwrap();
        let _ = self.flow_cond.wait_timeout(guard, timeout);
    }

    /// Accepts connections on `listener`, reads one request off each, and
    /// enqueues it for a worker. Runs until [`Self::begin_shutdown`] is
    /// observed. A connection that fails to produce a well-formed request
    /// (short read, garbage length prefix) is dropped per the "transient
    /// errors cause the request to be dropped" policy — the caller retries.
    pub fn run_acceptor(&self, listener: UnixListener) {
        listener
            .set_nonblocking(false)
            .expect("unix listener supports blocking mode");
        for stream in listener.incoming() {
            if !self.is_running() {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept control connection");
                    continue;
                }
            };
            let mut reader = match stream.try_clone() {
                Ok(s) => BufReader::new(s),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to clone control connection");
                    continue;
                }
            };
            let request: IrmdRequest = match wire::read_message(&mut reader) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed control request");
                    continue;
                }
            };
            let mut queue = self.cmd_queue.lock().unwrap();
            queue.push_back(Cmd { stream, request });
            self.cmd_cond.notify_one();
        }
    }

    /// One worker loop: pop a command, dispatch it, write the reply on
    /// its socket, then go back to waiting on the queue.
    pub fn run_worker(&self) {
        loop {
            let cmd = {
                let mut queue = self.cmd_queue.lock().unwrap();
                loop {
                    if let Some(cmd) = queue.pop_front() {
                        break Some(cmd);
                    }
                    if !self.is_running() {
                        return;
                    }
                    queue = self.cmd_cond.wait(queue).unwrap();
                }
            };
            let Some(cmd) = cmd else { continue };
            self.busy_workers.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.serve_one(cmd) {
                tracing::debug!(error = %e, "control connection error");
            }
            self.busy_workers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn serve_one(&self, cmd: Cmd) -> Result<(), IrmdError> {
        let reply = self.dispatch(cmd.request);
        let mut writer = BufWriter::new(cmd.stream);
        wire::write_message(&mut writer, &reply)?;
        std::io::Write::flush(&mut writer)?;
        Ok(())
    }

    pub fn dispatch(&self, request: IrmdRequest) -> IrmdReply {
        let result = match request {
            IrmdRequest::CreateIpcp { name, typ } => self.handle_create_ipcp(name, typ),
            IrmdRequest::IpcpCreateR { pid, ok } => self.handle_ipcp_create_r(pid, ok),
            IrmdRequest::DestroyIpcp { pid } => self.handle_destroy_ipcp(pid),
            IrmdRequest::BootstrapIpcp { pid } => self.handle_bootstrap_ipcp(pid),
            IrmdRequest::EnrollIpcp { pid, dst_layer } => self.handle_enroll_ipcp(pid, dst_layer),
            IrmdRequest::BindProgram { tag, executable_path, argv, auto_exec, names } => {
                self.handle_bind_program(tag, executable_path, argv, auto_exec, names)
            }
            IrmdRequest::UnbindProgram { tag } => self.handle_unbind_program(tag),
            IrmdRequest::BindProcess { pid, names } => self.handle_bind_process(pid, names),
            IrmdRequest::UnbindProcess { pid, names } => self.handle_unbind_process(pid, names),
            IrmdRequest::ProcAnnounce { pid, program_tag } => {
                self.handle_proc_announce(pid, program_tag)
            }
            IrmdRequest::FlowAccept { pid, timeout_ms } => self.handle_flow_accept(pid, timeout_ms),
            IrmdRequest::FlowAlloc { pid, dst_name, qos, timeout_ms } => {
                self.handle_flow_alloc(pid, dst_name, qos, timeout_ms)
            }
            IrmdRequest::FlowDealloc { pid, port_id } => self.handle_flow_dealloc(pid, port_id),
            IrmdRequest::IpcpFlowReqArr { hash_owner_pid, name, qos } => {
                self.handle_ipcp_flow_req_arr(hash_owner_pid, name, qos)
            }
            IrmdRequest::IpcpFlowAllocReply { port_id, accepted } => {
                self.handle_ipcp_flow_alloc_reply(port_id, accepted)
            }
            IrmdRequest::ListIpcps { glob } => self.handle_list_ipcps(glob),
            IrmdRequest::Reg { name, layers } => self.handle_reg(name, layers),
            IrmdRequest::Unreg { name, layers } => self.handle_unreg(name, layers),
        };
        result.into()
    }

    fn handle_create_ipcp(&self, name: String, typ: IpcpTypeWire) -> Result<IrmdReply, IrmdError> {
        let name = Name::new(name).map_err(RegistryError::Invalid)?;
        let mut registry = self.registry.write().unwrap();
        if registry.ipcps.values().any(|e| e.name == name) {
            return Err(RegistryError::NameCollision(name.to_string()).into());
        }
        // A real daemon forks+execs the IPCP binary here and waits up to
        // socket_timeout for its ipcp_create_r; the pid is a placeholder
        // until that handshake completes boot -> live.
        let pid = registry.spawned_pids.len() as i32 + 1;
        registry.spawned_pids.push(pid);
        let entry = IpcpEntry::new(name, pid, typ.into(), &self.config.dir_hash_algo);
        registry.ipcps.insert(pid, entry);
        Ok(IrmdReply::Pid(pid))
    }

    fn handle_ipcp_create_r(&self, pid: i32, ok: bool) -> Result<IrmdReply, IrmdError> {
        let mut registry = self.registry.write().unwrap();
        let entry = registry
            .ipcps
            .get_mut(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        entry.init_state = if ok { IpcpInitState::Live } else { IpcpInitState::Null };
        Ok(IrmdReply::Ok)
    }

    fn handle_destroy_ipcp(&self, pid: i32) -> Result<IrmdReply, IrmdError> {
        let mut registry = self.registry.write().unwrap();
        registry
            .ipcps
            .remove(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        self.notifier.notify(NotifierEvent::IpcpShutdown);
        Ok(IrmdReply::Ok)
    }

    fn handle_bootstrap_ipcp(&self, pid: i32) -> Result<IrmdReply, IrmdError> {
        let mut registry = self.registry.write().unwrap();
        let entry = registry
            .ipcps
            .get_mut(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        if entry.init_state != IpcpInitState::Live {
            return Err(FlowError::WrongState(0, "boot", "live").into());
        }
        Ok(IrmdReply::Ok)
    }

    fn handle_enroll_ipcp(&self, pid: i32, dst_layer: String) -> Result<IrmdReply, IrmdError> {
        let mut registry = self.registry.write().unwrap();
        let entry = registry
            .ipcps
            .get_mut(&pid)
            .ok_or(RegistryError::ProcessNotFound(pid))?;
        if entry.layer_name.is_some() {
            return Err(RegistryError::Invalid("already enrolled".into()).into());
        }
        entry.layer_name = Some(dst_layer);
        Ok(IrmdReply::Ok)
    }

    fn handle_bind_program(
        &self,
        tag: String,
        executable_path: String,
        argv: Vec<String>,
        auto_exec: bool,
        names: Vec<String>,
    ) -> Result<IrmdReply, IrmdError> {
        let names = names
            .into_iter()
            .map(Name::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RegistryError::Invalid)?;
        let mut registry = self.registry.write().unwrap();
        registry.bind_program(&tag, executable_path, argv, auto_exec, names)?;
        Ok(IrmdReply::Ok)
    }

    fn handle_unbind_program(&self, tag: String) -> Result<IrmdReply, IrmdError> {
        let mut registry = self.registry.write().unwrap();
        registry.unbind_program(&tag)?;
        Ok(IrmdReply::Ok)
    }

    fn handle_bind_process(&self, pid: i32, names: Vec<String>) -> Result<IrmdReply, IrmdError> {
        let names = names
            .into_iter()
            .map(Name::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RegistryError::Invalid)?;
        let mut registry = self.registry.write().unwrap();
        registry.bind_process(pid, names)?;
        Ok(IrmdReply::Ok)
    }

    fn handle_unbind_process(&self, pid: i32, names: Vec<String>) -> Result<IrmdReply, IrmdError> {
        let names = names
            .into_iter()
            .map(Name::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RegistryError::Invalid)?;
        let mut registry = self.registry.write().unwrap();
        registry.unbind_process(pid, &names)?;
        Ok(IrmdReply::Ok)
    }

    fn handle_proc_announce(
        &self,
        pid: i32,
        program_tag: Option<String>,
    ) -> Result<IrmdReply, IrmdError> {
        let mut registry = self.registry.write().unwrap();
        registry.proc_announce(pid, program_tag);
        Ok(IrmdReply::Ok)
    }

    fn handle_flow_accept(
        &self,
        pid: i32,
        timeout_ms: Option<u64>,
    ) -> Result<IrmdReply, IrmdError> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(self.config.flow_timeout.as_millis() as u64));
        let deadline = Instant::now() + timeout;

        // The process is only discoverable as a server for an arriving
        // flow while it holds the accept claim on every name it serves;
        // drop the claim again on every exit path so a timed-out or
        // shut-down acceptor doesn't wedge the name in flow-accept.
        let names = {
            let mut registry = self.registry.write().unwrap();
            let process = registry
                .processes
                .get(&pid)
                .ok_or(RegistryError::ProcessNotFound(pid))?
                .clone();
            for name in &process.names {
                registry.begin_accept(pid, name)?;
            }
            process.names
        };

        let result = loop {
            if !self.is_running() {
                break Err(IrmdError::ShuttingDown);
            }
            {
                let mut flows = self.flows.write().unwrap();
                let pending = flows
                    .get_by_waiting_pid(pid)
                    .filter(|f| f.state == FlowState::AllocPending)
                    .map(|f| (f.port_id, f.n_1_pid.unwrap_or_default(), f.qos_cube));
                if let Some((port_id, ipcp_pid, qos_cube)) = pending {
                    // The arrival side's accept is itself the confirmation;
                    // IRMd completes the allocation on the process's behalf
                    // rather than waiting for a separate reply.
                    flows.complete_alloc(port_id, true).map_err(IrmdError::Flow)?;
                    drop(flows);
                    self.notify_flow_event();
                    break Ok(IrmdReply::FlowAccepted {
                        port_id,
                        ipcp_pid,
                        qos_cube,
                    });
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(IrmdError::Timeout);
            }
            self.wait_for_flow_event(remaining.min(Duration::from_millis(50)));
        };

        let mut registry = self.registry.write().unwrap();
        for name in &names {
            registry.end_accept(pid, name);
        }
        result
    }

    fn handle_flow_alloc(
        &self,
        pid: i32,
        dst_name: String,
        qos: QosCube,
        timeout_ms: Option<u64>,
    ) -> Result<IrmdReply, IrmdError> {
        let dst_name = Name::new(dst_name).map_err(RegistryError::Invalid)?;
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(self.config.flow_timeout.as_millis() as u64));
        let deadline = Instant::now() + timeout;

        // Resolve dst_name to a layer via whichever DIF(s) it's registered
        // in, then pick the best-typed live IPCP enrolled in one of them.
        let registry = self.registry.read().unwrap();
        let layers = match registry.names.get(&dst_name) {
            Some(e) => e.dif_memberships.clone(),
            None => return Err(RegistryError::NameNotFound(dst_name.to_string()).into()),
        };
        let mut candidates: Vec<&IpcpEntry> = registry
            .ipcps
            .values()
            .filter(|e| e.init_state == IpcpInitState::Live)
            .filter(|e| e.layer_name.as_deref().is_some_and(|l| layers.iter().any(|m| m == l)))
            .collect();
        candidates.sort_by_key(|e| e.typ);
        let Some(serving_pid) = candidates.first().map(|e| e.pid) else {
            return Err(FlowError::Again.into());
        };
        drop(registry);

        let port_id = {
            let mut flows = self.flows.write().unwrap();
            flows
                .alloc_pending(pid, serving_pid, qos, Instant::now())
                .map_err(IrmdError::Flow)?
        };
        self.notifier.notify(NotifierEvent::FlowAlloc);

        loop {
            if !self.is_running() {
                let mut flows = self.flows.write().unwrap();
                let _ = flows.dealloc(port_id, true);
                return Err(IrmdError::ShuttingDown);
            }
            {
                let flows = self.flows.read().unwrap();
                match flows.get(port_id).map(|f| f.state) {
                    Some(FlowState::Allocated) => return Ok(IrmdReply::FlowAllocated { port_id }),
                    Some(FlowState::Null) | None => {
                        return Err(RegistryError::NoMatchingIpcp.into());
                    }
                    _ => {}
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let mut flows = self.flows.write().unwrap();
                let _ = flows.dealloc(port_id, true);
                return Err(IrmdError::Timeout);
            }
            self.wait_for_flow_event(remaining.min(Duration::from_millis(50)));
        }
    }

    fn handle_flow_dealloc(&self, pid: i32, port_id: u32) -> Result<IrmdReply, IrmdError> {
        let mut flows = self.flows.write().unwrap();
        let flow = flows.get(port_id).ok_or(FlowError::UnknownPortId(port_id))?;
        let by_n_side = flow.n_pid == Some(pid);
        if !by_n_side && flow.n_1_pid != Some(pid) {
            return Err(IrmdError::Perm(format!(
                "pid {} does not own port id {}",
                pid, port_id
            )));
        }
        flows.dealloc(port_id, by_n_side)?;
        drop(flows);
        self.notifier.notify(NotifierEvent::FlowDealloc);
        self.notify_flow_event();
        Ok(IrmdReply::Ok)
    }

    /// Forks the auto-exec program bound to `name` if nothing is already
    /// blocked accepting on it, then waits for the child to `proc_announce`
    /// and claim the accept slot — the "on-demand execution" contract.
    /// A no-op when a process is already serving `name`, or when no
    /// auto-exec program is bound (the caller then fails with
    /// `NoProcesses` once `mark_flow_arrived` finds nobody home).
    fn ensure_server_available(&self, name: &Name) -> Result<(), IrmdError> {
        let program = {
            let registry = self.registry.read().unwrap();
            let Some(entry) = registry.names.get(name) else {
                return Ok(());
            };
            if !entry.reg_processes.is_empty() {
                return Ok(());
            }
            entry
                .reg_programs
                .iter()
                .find_map(|tag| registry.programs.get(tag).filter(|p| p.auto_exec).cloned())
        };
        let Some(program) = program else {
            return Ok(());
        };

        tracing::info!(path = %program.executable_path, name = %name.to_string(), "forking on-demand server");
        let mut child = std::process::Command::new(&program.executable_path)
            .args(&program.argv)
            .spawn()
            .map_err(|e| {
                RegistryError::Invalid(format!(
                    "failed to spawn {}: {e}",
                    program.executable_path
                ))
            })?;
        let child_pid = child.id() as i32;
        {
            let mut registry = self.registry.write().unwrap();
            registry.spawned_pids.push(child_pid);
        }
        // Reap on a dedicated thread so a child that exits before
        // announcing itself doesn't linger as a zombie.
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        let deadline = Instant::now() + self.config.socket_timeout;
        loop {
            {
                let registry = self.registry.read().unwrap();
                if registry
                    .names
                    .get(name)
                    .is_some_and(|e| !e.reg_processes.is_empty())
                {
                    return Ok(());
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RegistryError::NoProcesses(name.to_string()).into());
            }
            self.wait_for_flow_event(remaining.min(Duration::from_millis(20)));
        }
    }

    fn handle_ipcp_flow_req_arr(
        &self,
        serving_pid: i32,
        name: String,
        qos: QosCube,
    ) -> Result<IrmdReply, IrmdError> {
        let name = Name::new(name).map_err(RegistryError::Invalid)?;
        self.ensure_server_available(&name)?;

        let mut registry = self.registry.write().unwrap();
        registry.mark_flow_arrived(&name)?;
        let server_pid = registry
            .names
            .get(&name)
            .and_then(|e| e.reg_processes.first().copied())
            .ok_or_else(|| RegistryError::NoProcesses(name.to_string()))?;
        drop(registry);

        let port_id = {
            let mut flows = self.flows.write().unwrap();
            flows
                .alloc_pending(server_pid, serving_pid, qos, Instant::now())
                .map_err(IrmdError::Flow)?
        };
        self.notify_flow_event();
        Ok(IrmdReply::FlowArrived { port_id, server_pid })
    }

    fn handle_ipcp_flow_alloc_reply(
        &self,
        port_id: u32,
        accepted: bool,
    ) -> Result<IrmdReply, IrmdError> {
        let mut flows = self.flows.write().unwrap();
        flows.complete_alloc(port_id, accepted)?;
        drop(flows);
        self.notify_flow_event();
        Ok(IrmdReply::Ok)
    }

    fn handle_list_ipcps(&self, glob: String) -> Result<IrmdReply, IrmdError> {
        let registry = self.registry.read().unwrap();
        Ok(IrmdReply::Pids(registry.ipcps_matching(&glob)))
    }

    fn handle_reg(&self, name: String, layers: Vec<String>) -> Result<IrmdReply, IrmdError> {
        let name = Name::new(name).map_err(RegistryError::Invalid)?;
        let registry = self.registry.read().unwrap();
        if !registry.ipcps.values().any(|e| {
            e.layer_name
                .as_ref()
                .map(|l| layers.contains(l))
                .unwrap_or(false)
        }) {
            return Err(RegistryError::NoMatchingIpcp.into());
        }
        drop(registry);
        let mut registry = self.registry.write().unwrap();
        registry.reg_name(&name, &layers);
        Ok(IrmdReply::Ok)
    }

    fn handle_unreg(&self, name: String, layers: Vec<String>) -> Result<IrmdReply, IrmdError> {
        let name = Name::new(name).map_err(RegistryError::Invalid)?;
        let mut registry = self.registry.write().unwrap();
        registry.unreg_name(&name, &layers);
        Ok(IrmdReply::Ok)
    }
}

impl FlowTable {
    /// Finds the flow whose serving side is awaiting an acceptor wakeup
    /// for `pid` — used by `flow_accept`'s poll loop. A thin helper kept
    /// here (rather than in `flow.rs`) since it's IRMd-dispatch specific.
    fn get_by_waiting_pid(&self, pid: i32) -> Option<&crate::flow::IrmFlow> {
        self.iter().find(|f| f.n_pid == Some(pid))
    }
}
