//! rvz-node: Rendezvous discovery and duplex stream orchestration
//!
//! A node announces itself under a discovery key derived from a shared
//! rendezvous string, keeps polling the provider directory for other
//! providers and opens one outbound chat stream to each of them. Streams
//! other peers open towards this node are accepted alongside. Local input
//! is fanned out to every outbound stream; remote lines are printed to a
//! single console.

pub mod connection;
pub mod console;
pub mod discovery;
pub mod net;
pub mod node;
pub mod session;
pub mod state;

pub use connection::ConnectionRegistry;
pub use console::{ChatShell, Console};
pub use node::ChatNode;
pub use state::NodeState;
