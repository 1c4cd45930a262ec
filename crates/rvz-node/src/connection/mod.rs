//! Connection bookkeeping and the broadcast write side

mod fanout;
mod registry;
mod writer;

pub use fanout::{broadcast, close_outbound, BroadcastReport};
pub use registry::{
    BroadcastHandle, ConnectionCounts, ConnectionRegistry, OutboundClaim, RegistrySnapshot,
};
pub use writer::LineWriter;
