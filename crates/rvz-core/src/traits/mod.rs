//! Collaborator traits consumed by the chat node

mod directory;
mod host;

pub use directory::ProviderDirectory;
pub use host::{BoxedStream, DuplexStream, Host, InboundStream};
