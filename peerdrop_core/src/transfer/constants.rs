use std::time::Duration;

/// Text reply that acknowledges a received file name
pub const ACK_SENTINEL: &str = "PONG";

/// Interval between file-name retransmissions
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Retransmissions before giving up on the handshake (~30s at the default interval)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Upper bound for a text frame (64KB)
pub const MAX_TEXT_FRAME: usize = 64 * 1024;

/// Default upper bound for the single payload frame (256MB)
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Maximum file name length in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);
