// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The two sanitiser threads: the IRM sanitiser (reaps dead processes,
//! ages stale flows) and the buffer sanitiser (drains rings belonging to
//! dead endpoints so the shared buffer pool never deadlocks on "full").

use super::IrmdContext;
use std::time::{Duration, Instant};

/// Checks whether `pid` still refers to a live process, the Rust
/// equivalent of the source's `kill(pid, 0) == 0` liveness probe: sending
/// signal 0 performs no action but still fails with `ESRCH` if the
/// process doesn't exist.
fn is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Runs the IRM sanitiser loop until shutdown. Period is
/// `config.cleanup_timer`.
pub fn run_irm_sanitiser(ctx: &IrmdContext) {
    while ctx.is_running() {
        sweep_once(ctx);
        std::thread::sleep(ctx.config.cleanup_timer);
    }
}

fn sweep_once(ctx: &IrmdContext) {
    reap_dead_processes(ctx);
    age_stale_flows(ctx);
}

fn reap_dead_processes(ctx: &IrmdContext) {
    let dead_pids: Vec<i32> = {
        let registry = ctx.registry.read().unwrap();
        registry
            .processes
            .keys()
            .copied()
            .filter(|pid| !is_alive(*pid))
            .collect()
    };
    if dead_pids.is_empty() {
        return;
    }

    let mut registry = ctx.registry.write().unwrap();
    for pid in &dead_pids {
        registry.evict_process(*pid);
        tracing::info!(pid, "sanitiser reaped dead process");
    }
    drop(registry);

    let mut flows = ctx.flows.write().unwrap();
    let stale: Vec<u32> = flows
        .iter()
        .filter(|f| {
            f.n_pid.map(|p| dead_pids.contains(&p)).unwrap_or(false)
                || f.n_1_pid.map(|p| dead_pids.contains(&p)).unwrap_or(false)
        })
        .map(|f| f.port_id)
        .collect();
    for port_id in stale {
        // Both-dead case forces immediate teardown; a dead single side
        // still goes through the normal two-phase dealloc on the next
        // sweep once the surviving side also calls flow_dealloc.
        if let Some(flow) = flows.get(port_id) {
            let both_dead = flow.n_pid.map(|p| dead_pids.contains(&p)).unwrap_or(true)
                && flow.n_1_pid.map(|p| dead_pids.contains(&p)).unwrap_or(true);
            if both_dead {
                flows.force_dealloc(port_id);
            }
        }
    }
    drop(flows);
    ctx.notify_flow_event();
}

fn age_stale_flows(ctx: &IrmdContext) {
    let aged = {
        let flows = ctx.flows.read().unwrap();
        flows.ages_past(ctx.config.flow_timeout, Instant::now())
    };
    if aged.is_empty() {
        return;
    }
    let mut flows = ctx.flows.write().unwrap();
    for port_id in aged {
        // An aged alloc-pending flow never completed; there's no "other
        // side" to dealloc it the normal way, so it's torn down outright.
        flows.force_dealloc(port_id);
        tracing::debug!(port_id, "sanitiser aged out stale alloc-pending flow");
    }
    drop(flows);
    ctx.notify_flow_event();
}

/// Holdoff between buffer-sanitiser passes: mirrors `SHM_SAN_HOLDOFF`
/// (1000 ms) from the original, since spec.md leaves the value
/// unspecified and defers to the source.
pub const BUFFER_SANITISER_HOLDOFF: Duration = Duration::from_millis(1000);

/// Anything that can report "this ring belongs to a dead endpoint, drain
/// it" — the shared buffer pool itself is an external collaborator, so
/// this trait is the seam a concrete pool implementation plugs into.
pub trait BufferPool: Send + Sync {
    /// Drains every ring whose owning flow has a dead endpoint, returning
    /// the number of buffers freed.
    fn drain_dead_flows(&self) -> usize;
}

/// Runs the buffer sanitiser loop until shutdown: wait out the holdoff,
/// then ask the pool to drain rings for dead flows.
pub fn run_buffer_sanitiser(ctx: &IrmdContext, pool: &dyn BufferPool) {
    while ctx.is_running() {
        std::thread::sleep(BUFFER_SANITISER_HOLDOFF);
        let freed = pool.drain_dead_flows();
        if freed > 0 {
            tracing::debug!(freed, "buffer sanitiser drained dead-flow rings");
        }
    }
}
