// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Application names and the directory hash IPCPs index them by.
//!
//! IRMd indexes the registry by the name string; every IPCP indexes its
//! local directory by a fixed-length digest of that string, produced by a
//! configurable algorithm (`dir_hash_algo` on the IPCP entry). Bound length
//! keeps names from bloating wire messages or the per-IPCP directory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length, in bytes, of a registered name.
pub const NAME_MAX_LEN: usize = 255;

/// A bounded-length UTF-8 application name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(String);

impl Name {
    /// Validates and wraps a name string.
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() {
            return Err("name must not be empty".to_string());
        }
        if s.len() > NAME_MAX_LEN {
            return Err(format!("name exceeds {} bytes", NAME_MAX_LEN));
        }
        Ok(Name(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directory hash: the fixed-length digest an IPCP uses as the directory
/// key instead of the name string itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirHash(pub Vec<u8>);

impl fmt::Display for DirHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Selects the digest algorithm an IPCP's directory uses for names.
///
/// The source supports multiple interchangeable digests at bootstrap time;
/// this is modeled as a small trait rather than a single prescribed hash.
pub trait DirHashAlgo: Send + Sync + fmt::Debug {
    fn hash(&self, name: &Name) -> DirHash;
    fn name(&self) -> &'static str;
}

/// Default algorithm: BLAKE3, truncated to 16 bytes. Collision-resistant
/// and fast enough for per-registration hashing on the control path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Truncated16;

impl DirHashAlgo for Blake3Truncated16 {
    fn hash(&self, name: &Name) -> DirHash {
        let digest = blake3::hash(name.as_str().as_bytes());
        DirHash(digest.as_bytes()[..16].to_vec())
    }

    fn name(&self) -> &'static str {
        "blake3-16"
    }
}

/// Cheap non-cryptographic alternative (FNV-1a), for layers that don't need
/// collision resistance and want to avoid the BLAKE3 dependency's cost on
/// constrained shims.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a64;

impl DirHashAlgo for Fnv1a64 {
    fn hash(&self, name: &Name) -> DirHash {
        const OFFSET: u64 = 0xcbf29ce484222325;
        const PRIME: u64 = 0x100000001b3;
        let mut h = OFFSET;
        for byte in name.as_str().as_bytes() {
            h ^= *byte as u64;
            h = h.wrapping_mul(PRIME);
        }
        DirHash(h.to_be_bytes().to_vec())
    }

    fn name(&self) -> &'static str {
        "fnv1a-64"
    }
}

/// Looks up a named algorithm, e.g. from config. Defaults to BLAKE3 for an
/// unrecognized name rather than failing bootstrap.
pub fn algo_by_name(name: &str) -> Box<dyn DirHashAlgo> {
    match name {
        "fnv1a-64" => Box::new(Fnv1a64),
        _ => Box::new(Blake3Truncated16),
    }
}
