//! Bidirectional, ordered message channel between two connected peers.
//!
//! The transfer protocol only needs three things from a channel: send a
//! frame, receive the next frame in send order, and close. Transports
//! implement [`FrameChannel`]; [`memory::pair`] gives two connected ends
//! without any network, which is what the protocol tests run on.

use std::future::Future;

use anyhow::Result;

use crate::NodeId;
use crate::transfer::protocol::Frame;

pub trait FrameChannel: Send + 'static {
    /// Identity of the peer on the other end.
    fn remote_id(&self) -> NodeId;

    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Next frame in send order, `Ok(None)` once the peer closed its side.
    ///
    /// Must be cancellation-safe: dropping the future before it resolves
    /// must not lose a frame.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Frame>>> + Send;

    /// Close our side. Calling it more than once is harmless.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

pub mod memory {
    use anyhow::{Result, anyhow};
    use tokio::sync::mpsc;

    use super::FrameChannel;
    use crate::NodeId;
    use crate::transfer::protocol::Frame;

    /// One end of an in-process channel.
    #[derive(Debug)]
    pub struct MemoryChannel {
        remote: NodeId,
        tx: Option<mpsc::UnboundedSender<Frame>>,
        rx: mpsc::UnboundedReceiver<Frame>,
    }

    /// Two connected ends. `a` talks to the peer identified by `b_id` and vice versa.
    pub fn pair(a_id: NodeId, b_id: NodeId) -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = MemoryChannel {
            remote: b_id,
            tx: Some(a_tx),
            rx: a_rx,
        };
        let b = MemoryChannel {
            remote: a_id,
            tx: Some(b_tx),
            rx: b_rx,
        };
        (a, b)
    }

    impl FrameChannel for MemoryChannel {
        fn remote_id(&self) -> NodeId {
            self.remote
        }

        async fn send(&mut self, frame: Frame) -> Result<()> {
            let tx = self.tx.as_ref().ok_or_else(|| anyhow!("channel closed"))?;
            tx.send(frame).map_err(|_| anyhow!("channel closed by peer"))
        }

        async fn recv(&mut self) -> Result<Option<Frame>> {
            Ok(self.rx.recv().await)
        }

        async fn close(&mut self) {
            self.tx = None;
        }
    }

}
