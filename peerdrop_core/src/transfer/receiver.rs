use std::time::Duration;
use tracing::{debug, info, warn};

use super::constants::ACK_SENTINEL;
use super::protocol::Frame;
use super::request::ReceivedFile;
use super::session::{ChannelSession, Role};
use crate::channel::FrameChannel;
use crate::error::{ProtocolViolation, TransferError, TransferResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingName,
    AwaitingPayload { file_name: String },
    Done,
}

impl ReceiverState {
    fn describe(&self) -> &'static str {
        match self {
            ReceiverState::AwaitingName => "awaiting file name",
            ReceiverState::AwaitingPayload { .. } => "awaiting payload",
            ReceiverState::Done => "done",
        }
    }
}

/// What the receiver does in response to an accepted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverStep {
    /// Send this frame back (the acknowledgment)
    Reply(Frame),
    /// The transfer is complete
    Completed(ReceivedFile),
}

/// Receiving side of the handshake, without any I/O.
///
/// The first text frame is the file name, the first binary frame after it is
/// the payload. Anything else is a [`ProtocolViolation`] and leaves the state
/// untouched.
#[derive(Debug)]
pub struct ReceiverMachine {
    state: ReceiverState,
}

impl Default for ReceiverMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverMachine {
    pub fn new() -> Self {
        Self {
            state: ReceiverState::AwaitingName,
        }
    }

    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    pub fn on_frame(&mut self, frame: Frame) -> Result<ReceiverStep, ProtocolViolation> {
        let state = std::mem::replace(&mut self.state, ReceiverState::Done);
        let (next, result) = match (state, frame) {
            (ReceiverState::AwaitingName, Frame::Text(file_name)) => (
                ReceiverState::AwaitingPayload { file_name },
                Ok(ReceiverStep::Reply(Frame::text(ACK_SENTINEL))),
            ),
            (ReceiverState::AwaitingName, Frame::Binary(_)) => (
                ReceiverState::AwaitingName,
                Err(ProtocolViolation::BinaryBeforeName),
            ),
            (ReceiverState::AwaitingPayload { file_name }, Frame::Binary(payload)) => (
                ReceiverState::Done,
                Ok(ReceiverStep::Completed(ReceivedFile { file_name, payload })),
            ),
            (state @ ReceiverState::AwaitingPayload { .. }, Frame::Text(_)) => {
                (state, Err(ProtocolViolation::TextAfterName))
            }
            (ReceiverState::Done, _) => (ReceiverState::Done, Err(ProtocolViolation::AfterDone)),
        };
        self.state = next;
        result
    }
}

/// Wait for one file on a receiver-role session.
///
/// Each wait for a frame is bounded by `idle_timeout`. Returns exactly one
/// [`ReceivedFile`] per session; the channel is closed on return.
pub async fn receive_file<C: FrameChannel>(
    mut session: ChannelSession<C>,
    idle_timeout: Duration,
) -> TransferResult<ReceivedFile> {
    session.expect_role(Role::Receiver)?;

    let peer = session.remote_id();
    debug!("[{}] Waiting for a file from {}", session.id, peer);

    let mut machine = ReceiverMachine::new();
    let result = drive(&mut session, &mut machine, idle_timeout).await;
    session.close().await;

    let file = result?;
    info!(
        "[{}] ✓ Received {} ({} bytes) from {}",
        session.id,
        file.file_name,
        file.size(),
        peer
    );
    Ok(file)
}

async fn drive<C: FrameChannel>(
    session: &mut ChannelSession<C>,
    machine: &mut ReceiverMachine,
    idle_timeout: Duration,
) -> TransferResult<ReceivedFile> {
    loop {
        let next = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(TransferError::Cancelled),
            next = tokio::time::timeout(idle_timeout, session.channel.recv()) => next,
        };

        let frame = match next {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return Err(TransferError::ChannelClosed(machine.state().describe())),
            Ok(Err(e)) => return Err(TransferError::Channel(e)),
            Err(_) => {
                warn!(
                    "[{}] Nothing received for {:?} while {}",
                    session.id,
                    idle_timeout,
                    machine.state().describe()
                );
                return Err(TransferError::ReceiveTimeout(idle_timeout));
            }
        };

        match machine.on_frame(frame) {
            Ok(ReceiverStep::Reply(reply)) => {
                if let ReceiverState::AwaitingPayload { file_name } = machine.state() {
                    debug!("[{}] File name captured: {}", session.id, file_name);
                }
                session.send_frame(reply).await?;
            }
            Ok(ReceiverStep::Completed(file)) => return Ok(file),
            Err(violation) => warn!("[{}] Discarding frame: {}", session.id, violation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_first_text_is_the_name_and_is_acknowledged() {
        let mut machine = ReceiverMachine::new();

        let step = machine.on_frame(Frame::text("report.txt")).unwrap();
        assert_eq!(step, ReceiverStep::Reply(Frame::text(ACK_SENTINEL)));
        assert_eq!(
            machine.state(),
            &ReceiverState::AwaitingPayload {
                file_name: "report.txt".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_names_are_discarded() {
        let mut machine = ReceiverMachine::new();
        machine.on_frame(Frame::text("first.txt")).unwrap();

        assert_eq!(
            machine.on_frame(Frame::text("second.txt")),
            Err(ProtocolViolation::TextAfterName)
        );
        let step = machine
            .on_frame(Frame::Binary(Bytes::from_static(b"abc")))
            .unwrap();
        assert_eq!(
            step,
            ReceiverStep::Completed(ReceivedFile {
                file_name: "first.txt".to_string(),
                payload: Bytes::from_static(b"abc"),
            })
        );
    }

    #[test]
    fn test_binary_before_name_is_discarded() {
        let mut machine = ReceiverMachine::new();
        assert_eq!(
            machine.on_frame(Frame::Binary(Bytes::from_static(b"early"))),
            Err(ProtocolViolation::BinaryBeforeName)
        );
        assert_eq!(machine.state(), &ReceiverState::AwaitingName);
    }

    #[test]
    fn test_everything_after_done_is_discarded() {
        let mut machine = ReceiverMachine::new();
        machine.on_frame(Frame::text("a")).unwrap();
        machine.on_frame(Frame::Binary(Bytes::new())).unwrap();
        assert_eq!(machine.state(), &ReceiverState::Done);

        assert_eq!(
            machine.on_frame(Frame::text("a")),
            Err(ProtocolViolation::AfterDone)
        );
        assert_eq!(
            machine.on_frame(Frame::Binary(Bytes::new())),
            Err(ProtocolViolation::AfterDone)
        );
    }
}
