use anyhow::Result;
use iroh::endpoint::{Connection, RecvStream, SendStream};
use peerdrop_core::NodeId;
use peerdrop_core::channel::FrameChannel;
use peerdrop_core::transfer::protocol::{Frame, read_frame, write_frame};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// ALPN protocol identifier for peerdrop
pub const ALPN: &[u8] = b"peerdrop/0";

/// How long `close` waits for the peer to finish its side of the stream
pub const CLOSE_LINGER: Duration = Duration::from_secs(2);

/// Frames decoded ahead of the protocol
const READ_AHEAD: usize = 16;

/// Framed duplex stream over a write half and a read half.
///
/// A reader task decodes incoming frames into a queue, so `recv` can be raced
/// against the retransmission timer without losing partially read frames.
pub struct FramedStream<W> {
    send: W,
    frames: mpsc::Receiver<Result<Frame>>,
    reader: JoinHandle<()>,
}

impl<W: AsyncWrite + Unpin> FramedStream<W> {
    /// Must be called within a tokio runtime.
    pub fn new<R>(send: W, recv: R, max_payload_size: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, frames) = mpsc::channel(READ_AHEAD);
        let reader = tokio::spawn(read_loop(recv, tx, max_payload_size));
        Self {
            send,
            frames,
            reader,
        }
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.send, frame).await
    }

    /// Next decoded frame, `None` once the peer finished its side. Cancel safe.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        match self.frames.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Finish our side, then wait up to `linger` for the peer to finish theirs.
    ///
    /// Returns whether the peer finished in time. Frames still arriving are discarded.
    pub async fn finish(&mut self, linger: Duration) -> bool {
        if let Err(e) = self.send.shutdown().await {
            debug!("Finishing stream failed: {}", e);
        }
        let frames = &mut self.frames;
        let drain = async { while frames.recv().await.is_some() {} };
        let finished = tokio::time::timeout(linger, drain).await.is_ok();
        self.reader.abort();
        finished
    }
}

impl<W> Drop for FramedStream<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(mut recv: R, tx: mpsc::Sender<Result<Frame>>, max_payload_size: usize)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut recv, max_payload_size).await {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

/// A [`FrameChannel`] over one iroh bidirectional stream.
pub struct StreamChannel {
    connection: Connection,
    remote: NodeId,
    stream: FramedStream<SendStream>,
    closed: bool,
}

impl StreamChannel {
    pub fn new(
        connection: Connection,
        send: SendStream,
        recv: RecvStream,
        max_payload_size: usize,
    ) -> Self {
        let remote = connection.remote_id();
        Self {
            connection,
            remote,
            stream: FramedStream::new(send, recv, max_payload_size),
            closed: false,
        }
    }
}

impl FrameChannel for StreamChannel {
    fn remote_id(&self) -> NodeId {
        self.remote
    }

    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.stream.send(&frame).await
    }

    async fn recv(&mut self) -> Result<Option<Frame>> {
        self.stream.recv().await
    }

    /// Finish our stream, wait for the peer to finish theirs, then close the connection.
    ///
    /// Each side finishes before it waits, so the two closes never wait on each
    /// other, and neither side tears the connection down while the other still
    /// has unread data.
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.stream.finish(CLOSE_LINGER).await {
            debug!("Peer {} did not finish its stream in time", self.remote);
        }
        self.connection.close(0u8.into(), b"done");
    }
}
