use bytes::Bytes;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::constants::ACK_SENTINEL;
use super::hash::payload_digest;
use super::protocol::Frame;
use super::request::TransferReceipt;
use super::retry::{Retransmit, RetryPolicy};
use super::session::{ChannelSession, Role};
use super::utils::format_transfer_speed;
use crate::channel::FrameChannel;
use crate::error::{ProtocolViolation, TransferError, TransferResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Repeating the file name until the receiver acknowledges it
    AwaitingAck,
    /// Acknowledged; the payload is about to go out
    Transmitting,
    Done,
}

/// Sending side of the handshake, without any I/O.
#[derive(Debug)]
pub struct SenderMachine {
    state: SenderState,
    file_name: String,
    payload: Option<Bytes>,
}

impl SenderMachine {
    pub fn new(file_name: impl Into<String>, payload: Bytes) -> Self {
        Self {
            state: SenderState::AwaitingAck,
            file_name: file_name.into(),
            payload: Some(payload),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// The file-name frame to (re)send, while the ack is outstanding.
    pub fn handshake_frame(&self) -> Option<Frame> {
        match self.state {
            SenderState::AwaitingAck => Some(Frame::Text(self.file_name.clone())),
            _ => None,
        }
    }

    /// Feed an incoming frame. Returns `Ok(true)` for the acknowledgment.
    pub fn on_frame(&mut self, frame: Frame) -> Result<bool, ProtocolViolation> {
        match (self.state, frame) {
            (_, Frame::Binary(_)) => Err(ProtocolViolation::BinaryToSender),
            (SenderState::AwaitingAck, Frame::Text(text)) if text == ACK_SENTINEL => {
                self.state = SenderState::Transmitting;
                Ok(true)
            }
            (SenderState::AwaitingAck, Frame::Text(text)) => Err(ProtocolViolation::NotAnAck(text)),
            (_, Frame::Text(_)) => Err(ProtocolViolation::AfterDone),
        }
    }

    /// The payload frame, handed out once after the acknowledgment.
    pub fn take_payload(&mut self) -> Option<Frame> {
        if self.state != SenderState::Transmitting {
            return None;
        }
        self.state = SenderState::Done;
        self.payload.take().map(Frame::Binary)
    }
}

/// Push one file over a sender-role session.
///
/// The file name goes out immediately and then once per `policy.interval`
/// until the acknowledgment arrives; the payload follows as a single binary
/// frame. The channel is closed on return.
pub async fn send_file<C: FrameChannel>(
    mut session: ChannelSession<C>,
    file_name: String,
    payload: Bytes,
    policy: &RetryPolicy,
) -> TransferResult<TransferReceipt> {
    session.expect_role(Role::Sender)?;

    let peer = session.remote_id();
    let size = payload.len();
    let digest = payload_digest(&payload);
    info!(
        "[{}] Sending {} ({} bytes) to {}",
        session.id, file_name, size, peer
    );

    let mut machine = SenderMachine::new(file_name.clone(), payload);
    let start = Instant::now();
    let result = drive(&mut session, &mut machine, policy).await;
    session.close().await;

    let attempts = result?;
    let elapsed = start.elapsed();
    info!(
        "[{}] ✓ Sent {} to {} in {:?} ({})",
        session.id,
        file_name,
        peer,
        elapsed,
        format_transfer_speed(size as u64, elapsed.as_secs_f64())
    );

    Ok(TransferReceipt {
        id: session.id,
        peer,
        file_name,
        size,
        digest,
        attempts,
    })
}

async fn drive<C: FrameChannel>(
    session: &mut ChannelSession<C>,
    machine: &mut SenderMachine,
    policy: &RetryPolicy,
) -> TransferResult<u32> {
    let mut timer = Retransmit::start(policy);

    while machine.state() == SenderState::AwaitingAck {
        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(TransferError::Cancelled),
            frame = session.channel.recv() => match frame {
                Ok(Some(frame)) => match machine.on_frame(frame) {
                    Ok(_) => {}
                    Err(violation) => warn!("[{}] Discarding frame: {}", session.id, violation),
                },
                Ok(None) => return Err(TransferError::ChannelClosed("awaiting acknowledgment")),
                Err(e) => return Err(TransferError::Channel(e)),
            },
            attempt = timer.next_attempt() => match attempt {
                Ok(n) => {
                    if let Some(frame) = machine.handshake_frame() {
                        debug!("[{}] Handshake attempt {}", session.id, n);
                        session.send_frame(frame).await?;
                    }
                }
                Err(attempts) => {
                    warn!("[{}] No acknowledgment after {} attempts", session.id, attempts);
                    return Err(TransferError::HandshakeTimeout { attempts });
                }
            },
        }
    }

    let attempts = timer.cancel();
    debug!("[{}] Acknowledged after {} attempt(s)", session.id, attempts);

    if let Some(frame) = machine.take_payload() {
        session.send_frame(frame).await?;
    }
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_frame_until_ack() {
        let mut machine = SenderMachine::new("report.txt", Bytes::from_static(b"data"));
        assert_eq!(machine.state(), SenderState::AwaitingAck);
        assert_eq!(machine.handshake_frame(), Some(Frame::text("report.txt")));
        assert_eq!(machine.take_payload(), None);

        assert_eq!(machine.on_frame(Frame::text(ACK_SENTINEL)), Ok(true));
        assert_eq!(machine.state(), SenderState::Transmitting);
        assert_eq!(machine.handshake_frame(), None);
    }

    #[test]
    fn test_payload_is_handed_out_once() {
        let mut machine = SenderMachine::new("a", Bytes::from_static(b"xyz"));
        machine.on_frame(Frame::text(ACK_SENTINEL)).unwrap();

        assert_eq!(
            machine.take_payload(),
            Some(Frame::Binary(Bytes::from_static(b"xyz")))
        );
        assert_eq!(machine.state(), SenderState::Done);
        assert_eq!(machine.take_payload(), None);
    }

    #[test]
    fn test_only_the_sentinel_acknowledges() {
        let mut machine = SenderMachine::new("a", Bytes::new());

        assert_eq!(
            machine.on_frame(Frame::text("pong")),
            Err(ProtocolViolation::NotAnAck("pong".to_string()))
        );
        assert_eq!(
            machine.on_frame(Frame::Binary(Bytes::new())),
            Err(ProtocolViolation::BinaryToSender)
        );
        assert_eq!(machine.state(), SenderState::AwaitingAck);
    }

    #[test]
    fn test_late_ack_is_a_violation() {
        let mut machine = SenderMachine::new("a", Bytes::new());
        machine.on_frame(Frame::text(ACK_SENTINEL)).unwrap();
        machine.take_payload();

        assert_eq!(
            machine.on_frame(Frame::text(ACK_SENTINEL)),
            Err(ProtocolViolation::AfterDone)
        );
        assert_eq!(machine.state(), SenderState::Done);
    }
}
