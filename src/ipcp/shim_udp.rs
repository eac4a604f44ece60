// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! The shim-UDP IPCP: carries flows between hosts over plain UDP.
//!
//! One long-lived listener socket accepts inbound flow requests; each
//! accepted flow gets its own ephemeral socket. Name resolution for
//! publish/resolve is behind [`NameResolver`] — the DDNS helper itself is
//! an external collaborator (spec §4.2), so this crate ships only a
//! system-DNS-backed default.

use super::{IpcpFlow, IpcpOps, IpcpRuntime, LocalFlowState};
use crate::error::IpcpError;
use crate::flow::QosCube;
use crate::name::DirHash;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Mutex, RwLock};

/// Publishes and resolves names to network addresses. The DDNS-backed
/// implementation used in the original is out of scope; this trait is
/// the seam it would plug into.
pub trait NameResolver: Send + Sync {
    fn publish(&self, hash: &DirHash, addr: SocketAddr);
    fn resolve(&self, hash: &DirHash) -> Option<SocketAddr>;
}

/// Resolves a directory hash that also happens to be a parseable
/// `host:port` string via the system resolver. A placeholder default
/// matching spec's "when disabled, names resolve via system DNS".
#[derive(Default)]
pub struct SystemDnsResolver {
    published: Mutex<HashMap<DirHash, SocketAddr>>,
}

impl NameResolver for SystemDnsResolver {
    fn publish(&self, hash: &DirHash, addr: SocketAddr) {
        self.published.lock().unwrap().insert(hash.clone(), addr);
    }

    fn resolve(&self, hash: &DirHash) -> Option<SocketAddr> {
        if let Some(addr) = self.published.lock().unwrap().get(hash) {
            return Some(*addr);
        }
        let candidate = hash.to_string();
        candidate.to_socket_addrs().ok()?.next()
    }
}

struct EphemeralFlow {
    socket: UdpSocket,
    peer: SocketAddr,
}

pub struct ShimUdpIpcp {
    runtime: IpcpRuntime,
    listener: Mutex<Option<UdpSocket>>,
    ephemeral: Mutex<HashMap<u32, EphemeralFlow>>,
    /// Reverse lookup from a peer's address back to the directory hash
    /// that was last seen requesting a flow from it.
    reverse_lookup: RwLock<HashMap<IpAddr, DirHash>>,
    resolver: Box<dyn NameResolver>,
}

impl ShimUdpIpcp {
    pub fn new(resolver: Box<dyn NameResolver>) -> Self {
        ShimUdpIpcp {
            runtime: IpcpRuntime::new(),
            listener: Mutex::new(None),
            ephemeral: Mutex::new(HashMap::new()),
            reverse_lookup: RwLock::new(HashMap::new()),
            resolver,
        }
    }

    /// Binds the listener socket described by `bind_addr`, e.g.
    /// `"0.0.0.0:0"` for an ephemeral bootstrap port.
    pub fn bootstrap_listener(&self, bind_addr: &str) -> Result<(), IpcpError> {
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| IpcpError::BootstrapFailed(e.to_string()))?;
        *self.listener.lock().unwrap() = Some(socket);
        Ok(())
    }

    /// Records that `addr` most recently requested a flow identified by
    /// `hash`, so a later inbound packet from that address can be
    /// attributed without re-parsing the request.
    pub fn note_inbound(&self, addr: IpAddr, hash: DirHash) {
        self.reverse_lookup.write().unwrap().insert(addr, hash);
    }

    fn bind_ephemeral(&self, port_id: u32, peer: SocketAddr) -> Result<(), IpcpError> {
        let socket =
            UdpSocket::bind("0.0.0.0:0").map_err(|e| IpcpError::BootstrapFailed(e.to_string()))?;
        socket
            .connect(peer)
            .map_err(|e| IpcpError::BootstrapFailed(e.to_string()))?;
        self.ephemeral
            .lock()
            .unwrap()
            .insert(port_id, EphemeralFlow { socket, peer });
        Ok(())
    }

    pub fn send(&self, port_id: u32, data: &[u8]) -> Result<(), IpcpError> {
        let ephemeral = self.ephemeral.lock().unwrap();
        let flow = ephemeral
            .get(&port_id)
            .ok_or(IpcpError::WrongState("no ephemeral socket for port id"))?;
        flow.socket
            .send(data)
            .map_err(|e| IpcpError::BootstrapFailed(e.to_string()))?;
        Ok(())
    }

    pub fn peer_addr(&self, port_id: u32) -> Option<SocketAddr> {
        self.ephemeral.lock().unwrap().get(&port_id).map(|f| f.peer)
    }
}

impl IpcpOps for ShimUdpIpcp {
    fn bootstrap(&self, config: &str) -> Result<(), IpcpError> {
        self.bootstrap_listener(config)?;
        *self.runtime.state.write().unwrap() = super::IpcpState::Enrolled;
        Ok(())
    }

    fn register(&self, hashes: Vec<DirHash>) -> Result<(), IpcpError> {
        let listener_port = self
            .listener
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .ok_or(IpcpError::WrongState("not bootstrapped"))?;
        for hash in hashes {
            self.resolver.publish(&hash, listener_port);
        }
        Ok(())
    }

    fn unregister(&self, hashes: &[DirHash]) -> Result<(), IpcpError> {
        self.runtime.unregister(hashes);
        Ok(())
    }

    fn flow_alloc(
        &self,
        port_id: u32,
        _n_pid: i32,
        dst_hash: &DirHash,
        _qos: QosCube,
    ) -> Result<(), IpcpError> {
        let peer = self
            .resolver
            .resolve(dst_hash)
            .ok_or(IpcpError::Unreachable)?;
        self.bind_ephemeral(port_id, peer)?;
        let mut flows = self.runtime.flows.write().unwrap();
        flows.insert(
            port_id,
            IpcpFlow {
                state: LocalFlowState::Pending,
                peer_hash: Some(dst_hash.clone()),
                paired_port_id: None,
            },
        );
        Ok(())
    }

    fn flow_alloc_resp(&self, port_id: u32, _n_pid: i32, accept: bool) -> Result<(), IpcpError> {
        let mut flows = self.runtime.flows.write().unwrap();
        let flow = flows
            .get_mut(&port_id)
            .ok_or(IpcpError::WrongState("no pending flow"))?;
        flow.state = if accept {
            LocalFlowState::Allocated
        } else {
            LocalFlowState::Null
        };
        Ok(())
    }

    fn flow_dealloc(&self, port_id: u32) -> Result<(), IpcpError> {
        self.runtime.flows.write().unwrap().remove(&port_id);
        self.ephemeral.lock().unwrap().remove(&port_id);
        Ok(())
    }

    fn query(&self, hash: &DirHash) -> Result<bool, IpcpError> {
        Ok(self.resolver.resolve(hash).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{Blake3Truncated16, DirHashAlgo, Name};

    #[test]
    fn publish_then_resolve_round_trips_through_system_resolver() {
        let resolver = SystemDnsResolver::default();
        let hash = Blake3Truncated16.hash(&Name::new("peer").unwrap());
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        assert!(resolver.resolve(&hash).is_none());
        resolver.publish(&hash, addr);
        assert_eq!(resolver.resolve(&hash), Some(addr));
    }

    #[test]
    fn flow_alloc_against_unpublished_hash_is_unreachable() {
        let ipcp = ShimUdpIpcp::new(Box::new(SystemDnsResolver::default()));
        let hash = Blake3Truncated16.hash(&Name::new("nobody").unwrap());
        let err = ipcp.flow_alloc(1, 0, &hash, 0).unwrap_err();
        assert!(matches!(err, IpcpError::Unreachable));
    }

    #[test]
    fn loopback_flow_alloc_binds_an_ephemeral_socket_and_can_send() {
        let resolver = SystemDnsResolver::default();
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        let listener_addr = listener.local_addr().unwrap();
        let hash = Blake3Truncated16.hash(&Name::new("echo").unwrap());
        resolver.publish(&hash, listener_addr);

        let ipcp = ShimUdpIpcp::new(Box::new(resolver));
        ipcp.flow_alloc(1, 0, &hash, 0).unwrap();
        ipcp.send(1, b"hello").unwrap();

        let mut buf = [0u8; 16];
        listener.set_read_timeout(Some(std::time::Duration::from_secs(1))).unwrap();
        let (n, _) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }
}
