// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The IRMd daemon binary: parses configuration, reclaims a stale
//! lockfile if one is present, binds the control socket, and runs the
//! acceptor, worker pool, and sanitiser threads until a shutdown signal
//! arrives.

use clap::Parser;
use ouroboros_rs::config::{CliArgs, IrmdConfig};
use ouroboros_rs::irmd::sanitiser::{run_buffer_sanitiser, run_irm_sanitiser, BufferPool};
use ouroboros_rs::irmd::IrmdContext;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A buffer pool stand-in: the shared-memory allocator's bit-exact
/// layout is an external collaborator (spec §1), so this just counts
/// drain calls rather than touching real shared memory.
struct NullBufferPool;

impl BufferPool for NullBufferPool {
    fn drain_dead_flows(&self) -> usize {
        0
    }
}

fn is_owner_alive(lockfile_path: &str) -> Option<i32> {
    let contents = std::fs::read_to_string(lockfile_path).ok()?;
    let pid: i32 = contents.trim().parse().ok()?;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    if kill(Pid::from_raw(pid), None).is_ok() {
        Some(pid)
    } else {
        None
    }
}

/// Reclaims a stale lockfile (owner pid no longer alive) and purges
/// whatever "dirty" buffer-pool state a crashed prior instance left
/// behind, per spec §6's "Lockfile" contract.
fn reclaim_stale_lockfile(lockfile_path: &str) -> Result<(), std::io::Error> {
    if std::path::Path::new(lockfile_path).exists() && is_owner_alive(lockfile_path).is_none() {
        tracing::warn!(lockfile_path, "reclaiming stale lockfile");
        std::fs::remove_file(lockfile_path)?;
    }
    std::fs::write(lockfile_path, std::process::id().to_string())?;
    Ok(())
}

fn install_signal_handler(ctx: Arc<IrmdContext>, sock_path: String) {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP]).expect("register signal set");
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::info!(signal, "received shutdown signal");
            ctx.begin_shutdown();
            // The acceptor may be parked in a blocking accept(); a dummy
            // connection is the simplest way to make it observe the flag
            // without polling.
            let _ = std::os::unix::net::UnixStream::connect(&sock_path);
        }
    });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();
    let config = match IrmdConfig::from_cli(args) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    config.print_summary();

    if let Some(parent) = std::path::Path::new(&config.lockfile_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = reclaim_stale_lockfile(&config.lockfile_path) {
        tracing::error!(error = %e, "lockfile contention, exiting");
        std::process::exit(1);
    }

    if let Some(parent) = std::path::Path::new(&config.irm_sock_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::remove_file(&config.irm_sock_path);
    let listener = match UnixListener::bind(&config.irm_sock_path) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind control socket");
            std::process::exit(1);
        }
    };

    let sock_path = config.irm_sock_path.clone();
    let ctx = Arc::new(IrmdContext::new(config));
    install_signal_handler(ctx.clone(), sock_path);

    let acceptor_ctx = ctx.clone();
    let acceptor = std::thread::spawn(move || acceptor_ctx.run_acceptor(listener));

    let workers = Arc::new(Mutex::new(Vec::new()));
    let total_workers = Arc::new(AtomicUsize::new(0));
    for _ in 0..ctx.config.min_threads {
        let worker_ctx = ctx.clone();
        workers
            .lock()
            .unwrap()
            .push(std::thread::spawn(move || worker_ctx.run_worker()));
        total_workers.fetch_add(1, Ordering::SeqCst);
    }

    // Models the C `tpm` (thread pool manager): the pool auto-grows by
    // `IRMD_ADD_THREADS` whenever a snapshot shows every live worker busy
    // and the queue non-empty. Polling rather than event-driven because
    // growth is a backstop, not a latency-critical path.
    let grower_ctx = ctx.clone();
    let grower_workers = workers.clone();
    let grower_total = total_workers.clone();
    let grower = std::thread::spawn(move || {
        while grower_ctx.is_running() {
            std::thread::sleep(Duration::from_millis(100));
            let total = grower_total.load(Ordering::SeqCst);
            if grower_ctx.busy_worker_count() >= total && grower_ctx.queue_backlog() > 0 {
                tracing::info!(
                    add_threads = grower_ctx.config.add_threads,
                    total_before = total,
                    "worker pool saturated, growing"
                );
                for _ in 0..grower_ctx.config.add_threads {
                    let worker_ctx = grower_ctx.clone();
                    grower_workers
                        .lock()
                        .unwrap()
                        .push(std::thread::spawn(move || worker_ctx.run_worker()));
                    grower_total.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    });

    let sanitiser_ctx = ctx.clone();
    let irm_sanitiser = std::thread::spawn(move || run_irm_sanitiser(&sanitiser_ctx));

    let buffer_ctx = ctx.clone();
    let buffer_sanitiser =
        std::thread::spawn(move || run_buffer_sanitiser(&buffer_ctx, &NullBufferPool));

    tracing::info!("irmd running");
    acceptor.join().ok();
    ctx.begin_shutdown();
    grower.join().ok();
    for worker in workers.lock().unwrap().drain(..) {
        worker.join().ok();
    }
    irm_sanitiser.join().ok();
    buffer_sanitiser.join().ok();

    let _ = std::fs::remove_file(&ctx.config.irm_sock_path);
    let _ = std::fs::remove_file(&ctx.config.lockfile_path);
}
