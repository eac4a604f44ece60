// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! A userspace IPC resource management fabric: applications open named,
//! flow-controlled streams to each other without knowing the underlying
//! transport, via a central registry/flow-broker daemon (IRMd) and a
//! set of per-transport IPC process runtimes.

pub mod bitmap;
pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod ipcp;
pub mod ipcp_entry;
pub mod irmd;
pub mod name;
pub mod notifier;
pub mod registry;
pub mod timerwheel;
pub mod wire;

pub use client::IrmdClient;
pub use config::IrmdConfig;
pub use error::{ConfigError, FlowError, IpcpError, IrmdError, NotifierError, RegistryError, WireError};
pub use flow::{FlowState, FlowTable, IrmFlow};
pub use ipcp_entry::{IpcpEntry, IpcpInitState, IpcpType};
pub use irmd::{IrmdContext, IrmdReply, IrmdRequest};
pub use name::{DirHash, DirHashAlgo, Name};
pub use notifier::{Notifier, NotifierEvent};
pub use registry::{ProcessEntry, ProgramEntry, Registry, RegistryEntry, RegistryState};
pub use timerwheel::TimerWheel;
