//! # dtr-ring
//!
//! The protocol core of the Dynamic Token Ring: a token circulates
//! around an ordered set of peer IDs, granting its holder the exclusive
//! right to transmit acknowledged data over a shared lossy broadcast
//! channel.
//!
//! ## Architecture
//!
//! - **Reliability**: every frame that expects an answer (TOKEN, RTS,
//!   DATA) is rebroadcast on a fixed period until the answer arrives
//!   ("spamming"); answers themselves (CTS, DATA_ACK) are fire-and-forget.
//! - **Membership**: peers discover each other through a handshake phase
//!   and elect the lowest ID as the initial token holder; during
//!   operation the holder removes unresponsive peers and redistributes
//!   the ring.
//! - **Concurrency**: a single engine task owns all protocol state and
//!   blocks on the inbound service queue; timers are deadline values the
//!   task polls between waits.
//!
//! The engine itself is driven with explicit [`std::time::Instant`]s, so
//! every protocol scenario can be exercised deterministically.

pub mod discovery;
pub mod engine;
pub mod error;
pub mod info;
pub mod queue;
pub mod spammer;
pub mod time;
pub mod topology;

pub use engine::{RingConfig, RingEngine, RxState, TxState};
pub use error::RingError;
pub use info::{RadioInfo, RadioInfoSnapshot};
pub use queue::PacketQueue;
pub use topology::Topology;
