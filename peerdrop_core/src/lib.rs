pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod transfer;

pub use channel::FrameChannel;
pub use error::{
    EndpointError, IdentityError, ProtocolViolation, RequestError, TransferError, TransferResult,
};
pub use identity::{Identity, IdentityStore};
pub use transfer::{
    ChannelSession, ReceivedFile, Role, TransferId, TransferReceipt, TransferRequest,
};

/// Public identifier of a peer, derived from its secret key. Used to dial it.
pub type NodeId = iroh::EndpointId;

//Events reported from the endpoint to the caller
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// The endpoint finished bootstrapping and can be dialed
    Ready { node_id: NodeId },

    /// A peer opened a channel to us
    Incoming { id: TransferId, from: NodeId },

    /// A file arrived; the caller decides what to do with it
    Received {
        id: TransferId,
        from: NodeId,
        file: ReceivedFile,
    },

    /// Our payload went out after the peer acknowledged the name
    Sent(TransferReceipt),

    Failed {
        id: Option<TransferId>,
        peer: NodeId,
        reason: String,
    },
}
