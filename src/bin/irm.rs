// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! `irm`: the command-line client for IRMd's control socket. Each
//! subcommand opens one connection, sends one request, prints the
//! reply, and exits — mirroring the one-request-per-connection
//! contract [`ouroboros_rs::client::IrmdClient`] implements.

use clap::{Parser, Subcommand};
use ouroboros_rs::config::default_irm_sock_path;
use ouroboros_rs::irmd::{IpcpTypeWire, IrmdReply, IrmdRequest};
use ouroboros_rs::IrmdClient;

#[derive(Parser)]
#[command(name = "irm", about = "control client for the IRMd daemon")]
struct Cli {
    #[arg(long, default_value_t = default_irm_sock_path())]
    sock_path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// IPC process lifecycle: create, destroy, bootstrap, enroll.
    Ipcp {
        #[command(subcommand)]
        action: IpcpAction,
    },
    /// Bind or unbind a program to a set of registered names.
    Bind {
        #[command(subcommand)]
        action: BindAction,
    },
    /// Register a name with one or more layers.
    Register { name: String, layers: Vec<String> },
    /// Unregister a name from one or more layers.
    Unregister { name: String, layers: Vec<String> },
    /// List IPCP pids whose name matches a glob (default "*").
    List {
        #[arg(default_value = "*")]
        glob: String,
    },
}

#[derive(Subcommand)]
enum IpcpAction {
    Create {
        name: String,
        #[arg(value_enum)]
        typ: CliIpcpType,
    },
    Destroy {
        pid: i32,
    },
    Bootstrap {
        pid: i32,
    },
    Enroll {
        pid: i32,
        dst_layer: String,
    },
}

#[derive(Subcommand)]
enum BindAction {
    Program {
        tag: String,
        executable_path: String,
        #[arg(long)]
        auto_exec: bool,
        #[arg(long = "name")]
        names: Vec<String>,
        argv: Vec<String>,
    },
    Unbind {
        tag: String,
    },
    Process {
        pid: i32,
        names: Vec<String>,
    },
    UnbindProcess {
        pid: i32,
        names: Vec<String>,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum CliIpcpType {
    Local,
    Normal,
    ShimUdp,
    ShimEthLlc,
}

impl From<CliIpcpType> for IpcpTypeWire {
    fn from(t: CliIpcpType) -> Self {
        match t {
            CliIpcpType::Local => IpcpTypeWire::Local,
            CliIpcpType::Normal => IpcpTypeWire::Normal,
            CliIpcpType::ShimUdp => IpcpTypeWire::ShimUdp,
            CliIpcpType::ShimEthLlc => IpcpTypeWire::ShimEthLlc,
        }
    }
}

fn request_for(command: Command) -> IrmdRequest {
    match command {
        Command::Ipcp { action } => match action {
            IpcpAction::Create { name, typ } => IrmdRequest::CreateIpcp {
                name,
                typ: typ.into(),
            },
            IpcpAction::Destroy { pid } => IrmdRequest::DestroyIpcp { pid },
            IpcpAction::Bootstrap { pid } => IrmdRequest::BootstrapIpcp { pid },
            IpcpAction::Enroll { pid, dst_layer } => IrmdRequest::EnrollIpcp { pid, dst_layer },
        },
        Command::Bind { action } => match action {
            BindAction::Program {
                tag,
                executable_path,
                auto_exec,
                names,
                argv,
            } => IrmdRequest::BindProgram {
                tag,
                executable_path,
                argv,
                auto_exec,
                names,
            },
            BindAction::Unbind { tag } => IrmdRequest::UnbindProgram { tag },
            BindAction::Process { pid, names } => IrmdRequest::BindProcess { pid, names },
            BindAction::UnbindProcess { pid, names } => {
                IrmdRequest::UnbindProcess { pid, names }
            }
        },
        Command::Register { name, layers } => IrmdRequest::Reg { name, layers },
        Command::Unregister { name, layers } => IrmdRequest::Unreg { name, layers },
        Command::List { glob } => IrmdRequest::ListIpcps { glob },
    }
}

fn print_reply(reply: &IrmdReply) {
    match reply {
        IrmdReply::Ok => println!("ok"),
        IrmdReply::Pid(pid) => println!("{pid}"),
        IrmdReply::Pids(pids) => {
            for pid in pids {
                println!("{pid}");
            }
        }
        IrmdReply::FlowAccepted {
            port_id,
            ipcp_pid,
            qos_cube,
        } => println!("flow accepted: port_id={port_id} ipcp_pid={ipcp_pid} qos={qos_cube}"),
        IrmdReply::FlowAllocated { port_id } => println!("flow allocated: port_id={port_id}"),
        IrmdReply::FlowArrived {
            port_id,
            server_pid,
        } => println!("flow arrived: port_id={port_id} server_pid={server_pid}"),
        IrmdReply::Err(msg) => eprintln!("error: {msg}"),
    }
}

fn main() {
    let cli = Cli::parse();
    let sock_path = cli.sock_path.clone();
    let request = request_for(cli.command);

    let mut client = match IrmdClient::connect(&sock_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to connect to {sock_path}: {e}");
            std::process::exit(1);
        }
    };

    match client.call(request) {
        Ok(reply) => {
            let failed = matches!(reply, IrmdReply::Err(_));
            print_reply(&reply);
            if failed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
