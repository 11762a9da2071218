use thiserror::Error;

/// Errors surfaced by the ring core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("queue full")]
    QueueFull,
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("protocol not running")]
    NotRunning,
    #[error("protocol already running")]
    AlreadyRunning,
    #[error("topology exceeds the maximum ring size: {0} peers")]
    TopologyTooLarge(usize),
}
