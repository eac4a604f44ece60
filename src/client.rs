// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Thin client library for talking to IRMd over its control socket.
//!
//! This is the request/reply plumbing every application process (and the
//! `irm` CLI) links against: connect, send one framed request, read one
//! framed reply. It deliberately does not reimplement IRMd's dispatch —
//! it is a collaborator, not the daemon.

use crate::irmd::{IrmdReply, IrmdRequest};
use crate::wire;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::Path;

/// A connection to IRMd's control socket.
pub struct IrmdClient {
    stream: UnixStream,
}

impl IrmdClient {
    pub fn connect(sock_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let stream = UnixStream::connect(sock_path)?;
        Ok(IrmdClient { stream })
    }

    /// Sends `request` and blocks for the matching reply. One request per
    /// connection: IRMd correlates replies by socket, not sequence
    /// number, so a client issuing a second request must reconnect.
    pub fn call(&mut self, request: IrmdRequest) -> Result<IrmdReply, crate::error::WireError> {
        let mut writer = BufWriter::new(self.stream.try_clone()?);
        wire::write_message(&mut writer, &request)?;
        std::io::Write::flush(&mut writer)?;

        let mut reader = BufReader::new(self.stream.try_clone()?);
        wire::read_message(&mut reader)
    }
}
