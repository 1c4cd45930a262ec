//! rvz-core: Core abstractions and configuration for rvz
//!
//! This crate provides the domain types, discovery key derivation, error
//! taxonomy, configuration and the collaborator traits (provider directory
//! and host transport) shared by the node and its tests.

pub mod config;
pub mod error;
pub mod key;
pub mod traits;
pub mod types;

pub use error::RvzError;
pub use key::DiscoveryKey;
pub use types::{ConnectionId, Direction, PeerDescriptor, PeerId};
