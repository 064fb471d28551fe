use std::time::Duration;

use crate::NodeId;
use crate::transfer::Role;

/// Errors raised while reading or writing the persisted node identity.
///
/// These never escape [`IdentityStore::load`](crate::identity::IdentityStore::load):
/// a broken identity is logged and replaced by a fresh one.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity storage unavailable: {0}")]
    Storage(#[source] std::io::Error),

    #[error("stored secret key is not valid base64: {0}")]
    Encoding(#[source] base64::DecodeError),

    #[error("stored secret key has {0} bytes, expected 32")]
    InvalidLength(usize),
}

/// A [`TransferRequest`](crate::TransferRequest) rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid peer id {0:?}")]
    InvalidPeerId(String),

    #[error("file name is empty")]
    EmptyFileName,

    #[error("file name too long ({len} bytes, max {max})")]
    FileNameTooLong { len: usize, max: usize },

    #[error("payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },
}

/// A frame that arrived in a state where the protocol does not expect it.
///
/// Violations are logged and the frame is discarded; the session keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("text frame after the file name was captured")]
    TextAfterName,

    #[error("binary frame before any file name")]
    BinaryBeforeName,

    #[error("text frame {0:?} is not an acknowledgment")]
    NotAnAck(String),

    #[error("binary frame sent to the sending side")]
    BinaryToSender,

    #[error("frame after the transfer finished")]
    AfterDone,
}

/// Terminal failure of one transfer session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("connection to {peer} failed: {source}")]
    Connection {
        peer: NodeId,
        #[source]
        source: anyhow::Error,
    },

    #[error("no acknowledgment after {attempts} handshake attempts")]
    HandshakeTimeout { attempts: u32 },

    #[error("no frame received within {0:?}")]
    ReceiveTimeout(Duration),

    #[error("channel closed while {0}")]
    ChannelClosed(&'static str),

    #[error("channel error: {0}")]
    Channel(#[source] anyhow::Error),

    #[error("session runs as {actual:?}, expected {expected:?}")]
    RoleMismatch { expected: Role, actual: Role },

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("transfer cancelled")]
    Cancelled,
}

/// Errors from the peer endpoint lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint did not become ready within {0:?}")]
    NotReady(Duration),

    #[error("endpoint is already listening")]
    AlreadyListening,

    #[error("endpoint has been disposed")]
    Disposed,
}

/// Outcome of one transfer, as seen by whoever started it.
pub type TransferResult<T> = Result<T, TransferError>;
