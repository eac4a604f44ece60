// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Length-prefixed wire framing shared by the IRMd control socket and
//! every per-IPCP control socket: a 4-byte little-endian length prefix
//! followed by a `postcard`-encoded message.

use crate::error::WireError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Refuse to even attempt decoding a frame claiming to be larger than
/// this; a legitimate control message is at most a few kilobytes.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Writes one length-prefixed, postcard-encoded message to `w`.
pub fn write_message<W: Write, T: Serialize>(w: &mut W, msg: &T) -> Result<(), WireError> {
    let bytes = postcard::to_allocvec(msg)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(bytes.len()));
    }
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

/// Reads one length-prefixed, postcard-encoded message from `r`.
pub fn read_message<R: Read, T: DeserializeOwned>(r: &mut R) -> Result<T, WireError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_closed(r, &mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(len));
    }
    let mut buf = vec![0u8; len];
    read_exact_or_closed(r, &mut buf)?;
    Ok(postcard::from_bytes(&buf)?)
}

fn read_exact_or_closed<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), WireError> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WireError::Closed),
        Err(e) => Err(WireError::Io(e)),
    }
}
