//! # dtr-node
//!
//! Host-facing runtime of the DTR token ring. It binds the protocol
//! core of `dtr-ring` to a broadcast [`Radio`], runs the engine on its
//! own task, and exposes the application API: enable or disable the
//! protocol, enqueue outbound data, block on inbound data, and read the
//! protocol counters.

pub mod adapter;
pub mod node;
pub mod testing;

use thiserror::Error;

/// Errors that can occur in the radio layer.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("frame too large for the radio: {0} bytes")]
    FrameTooLarge(usize),
    #[error("radio unavailable: {0}")]
    Unavailable(String),
}

/// The broadcast radio primitive required from the host.
///
/// Sends are best-effort and unacknowledged; every transmitted frame
/// reaches all peers on the channel or none. Inbound frames are pushed
/// by the host into [`node::DtrNode::on_radio_frame`].
pub trait Radio: Send + Sync {
    /// The persisted radio address of this device. The low 8 bits are
    /// the node's ring ID.
    fn local_address(&self) -> u64;

    /// Broadcasts one frame to every peer on the channel.
    fn broadcast(&self, frame: &[u8]) -> Result<(), RadioError>;
}

pub use adapter::RadioAdapter;
pub use node::DtrNode;
