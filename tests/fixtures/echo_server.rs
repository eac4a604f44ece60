// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Test fixture used by the on-demand-exec integration test: a minimal
//! server that announces itself, binds itself to the name it was invoked
//! with, accepts exactly one flow, and exits. Not part of the IRMd
//! surface — invoked only as the program `bind_program` forks.

use ouroboros_rs::irmd::{IrmdReply, IrmdRequest};
use ouroboros_rs::IrmdClient;

fn main() {
    let mut args = std::env::args().skip(1);
    let sock_path = args.next().expect("usage: test-echo-server <sock_path> <name>");
    let name = args.next().expect("usage: test-echo-server <sock_path> <name>");
    let pid = std::process::id() as i32;

    let mut client = IrmdClient::connect(&sock_path).unwrap();
    client
        .call(IrmdRequest::ProcAnnounce {
            pid,
            program_tag: None,
        })
        .unwrap();

    let mut client = IrmdClient::connect(&sock_path).unwrap();
    client
        .call(IrmdRequest::BindProcess {
            pid,
            names: vec![name],
        })
        .unwrap();

    let mut client = IrmdClient::connect(&sock_path).unwrap();
    match client
        .call(IrmdRequest::FlowAccept {
            pid,
            timeout_ms: Some(4000),
        })
        .unwrap()
    {
        IrmdReply::FlowAccepted { .. } => {}
        other => panic!("expected FlowAccepted, got {other:?}"),
    }
}
