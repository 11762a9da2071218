//! Fundamental and derived constants for the DTR token-ring protocol.

// --- Wire format ---

/// Bytes of the fixed packet header: size, type, source, target, data size.
pub const PACKET_HEADER_SIZE: usize = 5;

/// The maximum payload carried by a single frame.
pub const MAX_PAYLOAD_SIZE: usize = 60;

/// The largest frame that can appear on the wire.
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Target address meaning "every peer in the ring".
pub const BROADCAST_ID: u8 = 0xFF;

/// Sentinel returned by ring lookups when no valid peer exists. Shares
/// the broadcast value, which can never name a ring member.
pub const INVALID_ID: u8 = 0xFF;

// --- Ring limits ---

/// The maximum number of peers in one ring. Bounded so a full topology
/// always fits in a single frame payload: 1 size byte + ids <= MAX_PAYLOAD_SIZE.
pub const MAX_NETWORK_SIZE: usize = 20;

// --- Queueing ---

/// Outbound application data waiting for the token.
pub const TX_DATA_QUEUE_SIZE: usize = 10;

/// Inbound service frames waiting for the engine. Sized above the data
/// queues because every frame class funnels through it.
pub const RX_SRV_QUEUE_SIZE: usize = 20;

/// Acknowledged inbound data waiting for the application.
pub const RX_DATA_QUEUE_SIZE: usize = 10;

/// How long the engine waits on the TX-DATA queue when deciding whether
/// to send data or forward the token.
pub const TX_RECEIVED_WAIT_TIME_MS: u64 = 5;

// --- Timing ---
//
// The spam periods must be identical across peers for a given frame
// class; a mismatch makes the retry rhythm of one node look like
// silence to another.

/// Retransmission period while waiting for an RTS after a TOKEN.
pub const MAX_WAIT_TIME_FOR_RTS_MS: u64 = 2500;

/// Retransmission period while waiting for a CTS after an RTS.
pub const MAX_WAIT_TIME_FOR_CTS_MS: u64 = 2500;

/// Retransmission period while waiting for an ACK after a DATA frame.
pub const MAX_WAIT_TIME_FOR_DATA_ACK_MS: u64 = 2500;

/// Upper bound on silence before the lost-peer logic runs.
pub const PROTOCOL_TIMEOUT_MS: u64 = 4000;

/// Silence after the last newly learned peer that ends discovery.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 4000;

/// Period of the discovery announcements. Several announcements fit in
/// one handshake timeout so a single lost broadcast cannot split the ring.
pub const HANDSHAKE_PERIOD_MS: u64 = 500;
