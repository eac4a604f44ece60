// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! End-to-end scenarios driven entirely through the control socket: a
//! real [`IrmdContext`] behind a real [`UnixListener`], talked to with
//! [`IrmdClient`] the same way an application process would.

use ouroboros_rs::config::IrmdConfig;
use ouroboros_rs::irmd::{IpcpTypeWire, IrmdContext, IrmdReply, IrmdRequest};
use ouroboros_rs::IrmdClient;
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::time::Duration;

fn test_config(tag: &str) -> IrmdConfig {
    let sock_path = std::env::temp_dir().join(format!(
        "ouroboros-ctl-test-{}-{}.sock",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_file(&sock_path);
    IrmdConfig {
        irm_sock_path: sock_path.to_str().unwrap().to_string(),
        lockfile_path: format!("{}.lock", sock_path.to_str().unwrap()),
        socket_timeout: Duration::from_millis(500),
        cleanup_timer: Duration::from_millis(20),
        flow_timeout: Duration::from_millis(150),
        min_threads: 2,
        add_threads: 1,
        dir_hash_algo: "blake3-16".into(),
    }
}

/// Spins up an [`IrmdContext`] with one acceptor and `workers` worker
/// threads, returning the context and join handles so the caller can
/// shut it down with [`shutdown`].
fn spawn_daemon(config: IrmdConfig, workers: usize) -> (Arc<IrmdContext>, Vec<std::thread::JoinHandle<()>>) {
    let ctx = Arc::new(IrmdContext::new(config));
    let listener = UnixListener::bind(&ctx.config.irm_sock_path).unwrap();

    let mut handles = Vec::new();
    let acceptor_ctx = ctx.clone();
    handles.push(std::thread::spawn(move || acceptor_ctx.run_acceptor(listener)));
    for _ in 0..workers {
        let worker_ctx = ctx.clone();
        handles.push(std::thread::spawn(move || worker_ctx.run_worker()));
    }
    (ctx, handles)
}

fn shutdown(ctx: Arc<IrmdContext>, handles: Vec<std::thread::JoinHandle<()>>) {
    ctx.begin_shutdown();
    let _ = std::os::unix::net::UnixStream::connect(&ctx.config.irm_sock_path);
    for h in handles {
        h.join().ok();
    }
    let _ = std::fs::remove_file(&ctx.config.irm_sock_path);
}

#[test]
fn loopback_flow_allocates_and_deallocates_through_the_control_socket() {
    let (ctx, handles) = spawn_daemon(test_config("loopback"), 2);
    let sock_path = ctx.config.irm_sock_path.clone();

    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    let pid = match setup
        .call(IrmdRequest::CreateIpcp {
            name: "lo".into(),
            typ: IpcpTypeWire::Local,
        })
        .unwrap()
    {
        IrmdReply::Pid(p) => p,
        other => panic!("expected Pid, got {other:?}"),
    };

    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        setup
            .call(IrmdRequest::IpcpCreateR { pid, ok: true })
            .unwrap(),
        IrmdReply::Ok
    ));

    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        setup
            .call(IrmdRequest::EnrollIpcp {
                pid,
                dst_layer: "default".into(),
            })
            .unwrap(),
        IrmdReply::Ok
    ));

    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        setup
            .call(IrmdRequest::Reg {
                name: "echo".into(),
                layers: vec!["default".into()],
            })
            .unwrap(),
        IrmdReply::Ok
    ));

    // The allocator blocks until some IPCP completes the allocation, so
    // it runs on its own thread while the test drives that completion
    // from the main thread, the way a real IPCP process would.
    let alloc_sock = sock_path.clone();
    let allocator = std::thread::spawn(move || {
        let mut client = IrmdClient::connect(&alloc_sock).unwrap();
        client
            .call(IrmdRequest::FlowAlloc {
                pid: 9001,
                dst_name: "echo".into(),
                qos: 0,
                timeout_ms: Some(2000),
            })
            .unwrap()
    });

    // Poll the broker's flow table for the port id the allocator was
    // just handed, then complete the allocation on its behalf.
    let port_id = loop {
        let flows = ctx.flows.read().unwrap();
        if let Some(flow) = flows.iter().find(|f| f.n_pid == Some(9001)) {
            break flow.port_id;
        }
        drop(flows);
        std::thread::sleep(Duration::from_millis(5));
    };

    let mut completer = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        completer
            .call(IrmdRequest::IpcpFlowAllocReply {
                port_id,
                accepted: true,
            })
            .unwrap(),
        IrmdReply::Ok
    ));

    match allocator.join().unwrap() {
        IrmdReply::FlowAllocated { port_id: got } => assert_eq!(got, port_id),
        other => panic!("expected FlowAllocated, got {other:?}"),
    }

    // Dealloc is two-phase: the N-side tearing down only flips the flow
    // to dealloc-pending, the N-1-side (the serving IPCP, `pid`) has to
    // follow before the entry is actually freed.
    let mut dealloc = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        dealloc
            .call(IrmdRequest::FlowDealloc { pid: 9001, port_id })
            .unwrap(),
        IrmdReply::Ok
    ));
    assert!(ctx.flows.read().unwrap().get(port_id).is_some());

    let mut dealloc = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        dealloc
            .call(IrmdRequest::FlowDealloc { pid, port_id })
            .unwrap(),
        IrmdReply::Ok
    ));
    assert!(ctx.flows.read().unwrap().get(port_id).is_none());

    shutdown(ctx, handles);
}

#[test]
fn ipcp_flow_req_arr_wakes_a_process_already_blocked_in_flow_accept() {
    let (ctx, handles) = spawn_daemon(test_config("accept"), 2);
    let sock_path = ctx.config.irm_sock_path.clone();

    let server_pid = 4242;
    let mut client = IrmdClient::connect(&sock_path).unwrap();
    client
        .call(IrmdRequest::ProcAnnounce {
            pid: server_pid,
            program_tag: None,
        })
        .unwrap();
    let mut client = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        client
            .call(IrmdRequest::BindProcess {
                pid: server_pid,
                names: vec!["srv".into()],
            })
            .unwrap(),
        IrmdReply::Ok
    ));

    let accept_sock = sock_path.clone();
    let acceptor = std::thread::spawn(move || {
        let mut client = IrmdClient::connect(&accept_sock).unwrap();
        client
            .call(IrmdRequest::FlowAccept {
                pid: server_pid,
                timeout_ms: Some(2000),
            })
            .unwrap()
    });

    // Give the acceptor a moment to register its accept claim before the
    // simulated IPCP reports the arrival.
    std::thread::sleep(Duration::from_millis(20));
    let mut ipcp = IrmdClient::connect(&sock_path).unwrap();
    let arrived = ipcp
        .call(IrmdRequest::IpcpFlowReqArr {
            hash_owner_pid: 1,
            name: "srv".into(),
            qos: 0,
        })
        .unwrap();
    let (port_id, returned_server_pid) = match arrived {
        IrmdReply::FlowArrived { port_id, server_pid } => (port_id, server_pid),
        other => panic!("expected FlowArrived, got {other:?}"),
    };
    assert_eq!(returned_server_pid, server_pid);

    match acceptor.join().unwrap() {
        IrmdReply::FlowAccepted { port_id: got, .. } => assert_eq!(got, port_id),
        other => panic!("expected FlowAccepted, got {other:?}"),
    }

    // The accept itself is the confirmation; no separate completion call
    // is needed for the flow to already be allocated.
    assert_eq!(
        ctx.flows.read().unwrap().get(port_id).map(|f| f.state),
        Some(ouroboros_rs::flow::FlowState::Allocated)
    );

    shutdown(ctx, handles);
}

#[test]
fn on_demand_exec_forks_the_bound_program_to_serve_an_arriving_flow() {
    let (ctx, handles) = spawn_daemon(test_config("autoexec"), 2);
    let sock_path = ctx.config.irm_sock_path.clone();

    let mut client = IrmdClient::connect(&sock_path).unwrap();
    assert!(matches!(
        client
            .call(IrmdRequest::BindProgram {
                tag: "echo".into(),
                executable_path: env!("CARGO_BIN_EXE_test-echo-server").into(),
                argv: vec![sock_path.clone(), "e".into()],
                auto_exec: true,
                names: vec!["e".into()],
            })
            .unwrap(),
        IrmdReply::Ok
    ));
    // No process has announced itself for "e" yet.
    assert!(ctx
        .registry
        .read()
        .unwrap()
        .names
        .get(&ouroboros_rs::name::Name::new("e").unwrap())
        .map(|entry| entry.reg_processes.is_empty())
        .unwrap_or(true));

    let mut ipcp = IrmdClient::connect(&sock_path).unwrap();
    let reply = ipcp
        .call(IrmdRequest::IpcpFlowReqArr {
            hash_owner_pid: 1,
            name: "e".into(),
            qos: 0,
        })
        .unwrap();
    match reply {
        IrmdReply::FlowArrived { .. } => {}
        other => panic!("expected FlowArrived once the forked server announced, got {other:?}"),
    }
    // Let the forked server's own flow_accept return before the daemon
    // goes down under it.
    std::thread::sleep(Duration::from_millis(50));

    shutdown(ctx, handles);
}

#[test]
fn on_demand_exec_fails_when_the_forked_program_never_announces() {
    let mut config = test_config("autoexec-stuck");
    config.socket_timeout = Duration::from_millis(80);
    let (ctx, handles) = spawn_daemon(config, 1);
    let sock_path = ctx.config.irm_sock_path.clone();

    let mut client = IrmdClient::connect(&sock_path).unwrap();
    client
        .call(IrmdRequest::BindProgram {
            tag: "sleepy".into(),
            executable_path: "/bin/sleep".into(),
            argv: vec!["5".into()],
            auto_exec: true,
            names: vec!["s".into()],
        })
        .unwrap();

    let mut ipcp = IrmdClient::connect(&sock_path).unwrap();
    let reply = ipcp
        .call(IrmdRequest::IpcpFlowReqArr {
            hash_owner_pid: 1,
            name: "s".into(),
            qos: 0,
        })
        .unwrap();
    assert!(matches!(reply, IrmdReply::Err(_)));

    shutdown(ctx, handles);
}

#[test]
fn flow_alloc_against_an_unregistered_name_fails_fast() {
    let (ctx, handles) = spawn_daemon(test_config("unregistered"), 1);
    let sock_path = ctx.config.irm_sock_path.clone();

    let start = std::time::Instant::now();
    let mut client = IrmdClient::connect(&sock_path).unwrap();
    let reply = client
        .call(IrmdRequest::FlowAlloc {
            pid: 1,
            dst_name: "nobody-registered-this".into(),
            qos: 0,
            timeout_ms: Some(2000),
        })
        .unwrap();
    assert!(matches!(reply, IrmdReply::Err(_)));
    // A name with no registry entry at all must fail immediately, not
    // wait out the allocation timeout.
    assert!(start.elapsed() < Duration::from_millis(200));

    shutdown(ctx, handles);
}

#[test]
fn flow_alloc_times_out_when_registered_but_never_completed() {
    let (ctx, handles) = spawn_daemon(test_config("timeout"), 1);
    let sock_path = ctx.config.irm_sock_path.clone();

    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    let pid = match setup
        .call(IrmdRequest::CreateIpcp {
            name: "lo".into(),
            typ: IpcpTypeWire::Local,
        })
        .unwrap()
    {
        IrmdReply::Pid(p) => p,
        other => panic!("expected Pid, got {other:?}"),
    };
    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    setup
        .call(IrmdRequest::IpcpCreateR { pid, ok: true })
        .unwrap();
    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    setup
        .call(IrmdRequest::EnrollIpcp {
            pid,
            dst_layer: "default".into(),
        })
        .unwrap();
    let mut setup = IrmdClient::connect(&sock_path).unwrap();
    setup
        .call(IrmdRequest::Reg {
            name: "stuck".into(),
            layers: vec!["default".into()],
        })
        .unwrap();

    let mut client = IrmdClient::connect(&sock_path).unwrap();
    let reply = client
        .call(IrmdRequest::FlowAlloc {
            pid: 2,
            dst_name: "stuck".into(),
            qos: 0,
            timeout_ms: Some(80),
        })
        .unwrap();
    assert!(matches!(reply, IrmdReply::Err(_)));
    // The abandoned alloc-pending flow must have been torn down, not
    // left dangling.
    assert_eq!(ctx.flows.read().unwrap().allocated_count(), 0);

    shutdown(ctx, handles);
}

#[test]
fn sanitiser_reaps_a_process_that_no_longer_exists() {
    let mut config = test_config("sanitiser");
    config.cleanup_timer = Duration::from_millis(10);
    let (ctx, handles) = spawn_daemon(config, 1);
    let sock_path = ctx.config.irm_sock_path.clone();

    // A pid this large is never a real process on any system under test.
    let dead_pid = i32::MAX - 5;
    let mut client = IrmdClient::connect(&sock_path).unwrap();
    client
        .call(IrmdRequest::ProcAnnounce {
            pid: dead_pid,
            program_tag: None,
        })
        .unwrap();
    assert!(ctx.registry.read().unwrap().processes.contains_key(&dead_pid));

    let sanitiser_ctx = ctx.clone();
    let sanitiser = std::thread::spawn(move || {
        ouroboros_rs::irmd::sanitiser::run_irm_sanitiser(&sanitiser_ctx);
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    loop {
        if !ctx.registry.read().unwrap().processes.contains_key(&dead_pid) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "sanitiser never reaped the dead process");
        std::thread::sleep(Duration::from_millis(5));
    }

    shutdown(ctx, handles);
    sanitiser.join().ok();
}
