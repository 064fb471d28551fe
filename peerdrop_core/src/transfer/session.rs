use bytes::Bytes;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::protocol::Frame;
use super::receiver::receive_file;
use super::request::{ReceivedFile, TransferReceipt};
use super::retry::RetryPolicy;
use super::sender::send_file;
use crate::NodeId;
use crate::channel::FrameChannel;
use crate::error::{TransferError, TransferResult};

/// Identifies one transfer session in logs and events
pub type TransferId = Uuid;

/// Which side of the transfer a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Has the file and dialed the peer
    Sender,
    /// Accepted the channel and waits for a file name
    Receiver,
}

/// One open channel to one peer, carrying at most one transfer.
///
/// Running a transfer consumes the session; the channel is closed when the
/// transfer ends, whatever the outcome.
#[derive(Debug)]
pub struct ChannelSession<C> {
    pub(crate) id: TransferId,
    pub(crate) role: Role,
    pub(crate) channel: C,
    pub(crate) cancel: CancellationToken,
}

impl<C: FrameChannel> ChannelSession<C> {
    pub fn new(channel: C, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            channel,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the session to an outer token (usually the owning endpoint's)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn remote_id(&self) -> NodeId {
        self.channel.remote_id()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn expect_role(&self, expected: Role) -> TransferResult<()> {
        if self.role != expected {
            return Err(TransferError::RoleMismatch {
                expected,
                actual: self.role,
            });
        }
        Ok(())
    }

    pub(crate) async fn send_frame(&mut self, frame: Frame) -> TransferResult<()> {
        self.channel.send(frame).await.map_err(TransferError::Channel)
    }

    pub(crate) async fn close(&mut self) {
        self.channel.close().await;
    }

    /// Run the sending side of the protocol.
    pub async fn send(
        self,
        file_name: String,
        payload: Bytes,
        policy: &RetryPolicy,
    ) -> TransferResult<TransferReceipt> {
        send_file(self, file_name, payload, policy).await
    }

    /// Run the receiving side of the protocol.
    pub async fn receive(self, idle_timeout: Duration) -> TransferResult<ReceivedFile> {
        receive_file(self, idle_timeout).await
    }
}
