// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Error types for the IPC Resource Manager daemon and its IPCPs.
//!
//! Each subsystem gets its own error enum; [`IrmdError`] aggregates them so
//! call sites that cross subsystem boundaries can propagate with `?`.

use thiserror::Error;

/// Top-level error type for daemon operations.
#[derive(Error, Debug)]
pub enum IrmdError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("ipcp error: {0}")]
    Ipcp(#[from] IpcpError),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("permission denied: {0}")]
    Perm(String),

    #[error("IRMd is shutting down")]
    ShuttingDown,
}

/// Errors from the registry (names, programs, processes, IPCP entries).
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("name already registered: {0}")]
    NameCollision(String),

    #[error("name not found: {0}")]
    NameNotFound(String),

    #[error("no IPCP matched the requested layer(s)")]
    NoMatchingIpcp,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("process {0} not found")]
    ProcessNotFound(i32),

    #[error("program not found: {0}")]
    ProgramNotFound(String),

    #[error("no process available to accept for name: {0}")]
    NoProcesses(String),
}

/// Errors from the flow-allocation state machine.
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    #[error("no free port ids remain")]
    PortIdsExhausted,

    #[error("port id {0} is not allocated")]
    UnknownPortId(u32),

    #[error("flow {0} is in state {1}, expected {2}")]
    WrongState(u32, &'static str, &'static str),

    #[error("flow allocation timed out")]
    Timeout,

    #[error("peer died while waiting")]
    PeerDied,

    #[error("transient allocation failure")]
    Again,
}

/// Errors reported by an IPCP implementation.
#[derive(Error, Debug, Clone)]
pub enum IpcpError {
    #[error("operation not supported by this IPCP type")]
    Unsupported,

    #[error("IPCP is not in the required state: {0}")]
    WrongState(&'static str),

    #[error("bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("enrollment failed: {0}")]
    EnrollmentFailed(String),

    #[error("hash not reachable in this layer")]
    Unreachable,

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("child did not report back before the deadline")]
    BootTimeout,
}

/// Errors from the notifier's listener registry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierError {
    #[error("callback already registered")]
    AlreadyRegistered,
}

/// Errors from the wire codec used on both control sockets.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message too large: {0} bytes")]
    TooLarge(usize),

    #[error("encode failed: {0}")]
    Encode(#[from] postcard::Error),

    #[error("connection closed by peer")]
    Closed,
}

/// Errors from configuration parsing/validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
