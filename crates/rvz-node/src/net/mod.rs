//! Concrete transports and provider directories
//!
//! - [`memory`]: everything in-process, for tests and embedding
//! - [`tcp`]: TCP streams with a framed handshake
//! - [`lan`]: UDP broadcast provider directory for one local network

pub mod lan;
pub mod memory;
pub mod tcp;

use std::net::{IpAddr, SocketAddr};

pub use lan::{LanDirectory, LanOptions, ProviderTable};
pub use memory::{MemoryDirectory, MemoryHost, MemoryNetwork};
pub use tcp::TcpHost;

/// Turn addresses a peer advertised into addresses we can dial
///
/// Unspecified IPs are replaced by the IP the peer was observed at. Loopback
/// addresses are only kept when the peer itself was seen on loopback.
pub fn resolve_advertised(addrs: &[SocketAddr], observed: IpAddr) -> Vec<SocketAddr> {
    let mut resolved = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let mut addr = *addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(observed);
        }
        if addr.ip().is_loopback() && !observed.is_loopback() {
            continue;
        }
        if !resolved.contains(&addr) {
            resolved.push(addr);
        }
    }
    resolved
}
