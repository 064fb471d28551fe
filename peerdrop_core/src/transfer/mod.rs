//! Handshake and payload exchange on top of a [`FrameChannel`](crate::channel::FrameChannel).
//!
//! This module provides:
//! - Typed frame codec (text vs binary) for byte-stream transports
//! - Sender state machine: repeat the file name until acknowledged, then send the payload once
//! - Receiver state machine: first text is the name, first binary after it is the payload
//! - Retry policy bounding the handshake
//! - Boundary validation and receive-side disposition helpers

pub mod constants;
pub mod hash;
pub mod protocol;
pub mod receiver;
pub mod request;
pub mod retry;
pub mod sender;
pub mod session;
pub mod utils;

// Re-export public API
pub use constants::ACK_SENTINEL;
pub use protocol::Frame;
pub use receiver::{ReceiverMachine, ReceiverState, ReceiverStep, receive_file};
pub use request::{ReceivedFile, TransferReceipt, TransferRequest};
pub use retry::{Retransmit, RetryPolicy};
pub use sender::{SenderMachine, SenderState, send_file};
pub use session::{ChannelSession, Role, TransferId};
