// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Scenarios that exercise the real `irmd`/`irm` binaries as subprocesses
//! rather than an in-process [`ouroboros_rs::irmd::IrmdContext`]: the
//! lockfile-reclaim logic in `src/bin/irmd.rs` only runs in the daemon
//! binary, so it can't be driven any other way.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

fn unique_paths(tag: &str) -> (String, String) {
    let base = std::env::temp_dir().join(format!(
        "ouroboros-smoke-{}-{}",
        tag,
        std::process::id()
    ));
    (
        format!("{}.sock", base.display()),
        format!("{}.lock", base.display()),
    )
}

fn wait_for_socket(path: &str, deadline: Instant) -> bool {
    while Instant::now() < deadline {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn irm(sock_path: &str, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_irm"))
        .arg("--sock-path")
        .arg(sock_path)
        .args(args)
        .output()
        .expect("failed to run irm")
}

#[test]
fn irm_cli_round_trips_ipcp_lifecycle_against_a_real_daemon() {
    let (sock_path, lockfile_path) = unique_paths("cli");
    let _ = std::fs::remove_file(&sock_path);
    let _ = std::fs::remove_file(&lockfile_path);

    let mut daemon = Command::new(env!("CARGO_BIN_EXE_irmd"))
        .arg("--irm-sock-path")
        .arg(&sock_path)
        .arg("--lockfile-path")
        .arg(&lockfile_path)
        .arg("--min-threads")
        .arg("1")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn irmd");

    assert!(
        wait_for_socket(&sock_path, Instant::now() + Duration::from_secs(2)),
        "irmd never bound its control socket"
    );

    let create = irm(&sock_path, &["ipcp", "create", "lo", "local"]);
    assert!(create.status.success(), "{:?}", create);
    let pid_str = String::from_utf8_lossy(&create.stdout).trim().to_string();
    assert!(pid_str.parse::<i32>().is_ok(), "expected a pid, got {pid_str:?}");

    let list = irm(&sock_path, &["list"]);
    assert!(list.status.success());
    assert!(String::from_utf8_lossy(&list.stdout).contains(&pid_str));

    let enroll = irm(&sock_path, &["ipcp", "enroll", &pid_str, "default"]);
    assert!(enroll.status.success(), "{:?}", enroll);

    let register = irm(&sock_path, &["register", "echo", "default"]);
    assert!(register.status.success(), "{:?}", register);

    daemon.kill().ok();
    daemon.wait().ok();
    let _ = std::fs::remove_file(&sock_path);
    let _ = std::fs::remove_file(&lockfile_path);
}

#[test]
fn irmd_reclaims_a_lockfile_left_behind_by_a_killed_instance() {
    let (sock_path, lockfile_path) = unique_paths("lockfile");
    let _ = std::fs::remove_file(&sock_path);
    let _ = std::fs::remove_file(&lockfile_path);

    let spawn = |sock: &str, lock: &str| {
        Command::new(env!("CARGO_BIN_EXE_irmd"))
            .arg("--irm-sock-path")
            .arg(sock)
            .arg("--lockfile-path")
            .arg(lock)
            .arg("--min-threads")
            .arg("1")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn irmd")
    };

    let mut first = spawn(&sock_path, &lockfile_path);
    assert!(
        wait_for_socket(&sock_path, Instant::now() + Duration::from_secs(2)),
        "first irmd never bound its control socket"
    );
    let first_owner: i32 = std::fs::read_to_string(&lockfile_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(first_owner, first.id() as i32);

    // SIGKILL leaves the lockfile behind with a pid that's no longer alive.
    first.kill().expect("failed to kill first irmd");
    first.wait().ok();
    assert!(std::path::Path::new(&lockfile_path).exists());

    let mut second = spawn(&sock_path, &lockfile_path);
    assert!(
        wait_for_socket(&sock_path, Instant::now() + Duration::from_secs(2)),
        "second irmd never reclaimed the stale lockfile and bound its socket"
    );
    let second_owner: i32 = std::fs::read_to_string(&lockfile_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(second_owner, second.id() as i32);
    assert_ne!(second_owner, first_owner);

    // The reclaimed daemon must actually be serving requests, not just
    // holding the lockfile.
    let list = irm(&sock_path, &["list"]);
    assert!(list.status.success(), "{:?}", list);

    second.kill().ok();
    second.wait().ok();
    let _ = std::fs::remove_file(&sock_path);
    let _ = std::fs::remove_file(&lockfile_path);
}
