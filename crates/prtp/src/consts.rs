use std::time::Duration;

/// Fixed wire header size in bytes.
pub const HEADER_LEN: usize = 18;
/// Largest payload a single data segment may carry.
pub const MAX_PAYLOAD: usize = 1024;
/// Receive window advertised in every outgoing segment, in bytes.
pub const ADVERTISED_WINDOW: u16 = 8192;

/// Retransmission timer for buffered data segments.
pub const TIMEOUT_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on a single blocking receive, so timers stay serviced.
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Inactivity ceiling after which an established session is abandoned.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Congestion window at connection start, in segments.
pub const INITIAL_CWND: f64 = 1.0;
/// Slow-start threshold at connection start, in segments.
pub const INITIAL_SSTHRESH: f64 = 64.0;
/// Duplicate ACKs required to trigger a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// SYN and FIN transmissions before the handshake is declared failed.
pub const MAX_HANDSHAKE_RETRIES: u32 = 5;
/// Consecutive timeout expiries without window progress before the
/// transfer is declared failed.
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 10;
