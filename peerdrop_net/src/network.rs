//! The connectivity provider seam.
//!
//! A [`PeerNetwork`] bootstraps into some network, accepts inbound channels
//! and opens outbound ones. The endpoint above it only ever sees
//! [`FrameChannel`]s, so the same endpoint runs over iroh in production and
//! over an in-process hub in tests.

use anyhow::Result;
use peerdrop_core::{FrameChannel, NodeId};
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub trait PeerNetwork: Send + Sync + 'static {
    type Channel: FrameChannel;

    /// A pending inbound channel. Finishing it may involve a handshake, so
    /// the endpoint drives each one on its own task.
    type Incoming: Future<Output = Result<Self::Channel>> + Send + 'static;

    fn node_id(&self) -> NodeId;

    /// Resolves once the provider is reachable by other peers. May never resolve.
    fn online(&self) -> impl Future<Output = ()> + Send;

    /// Next inbound channel, `None` once the provider is closed.
    fn accept(&self) -> impl Future<Output = Option<Self::Incoming>> + Send;

    fn open(&self, peer: NodeId) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Release every network resource. Must tolerate repeated calls.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
