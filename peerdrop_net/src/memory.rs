//! In-process provider. Every [`MemoryNetwork`] joined to the same
//! [`MemoryHub`] can dial every other one by node id.

use anyhow::{Result, anyhow};
use peerdrop_core::channel::memory::{MemoryChannel, pair};
use peerdrop_core::{Identity, NodeId};
use std::collections::HashMap;
use std::future::{Ready, ready};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::network::PeerNetwork;

type Inbox = mpsc::UnboundedSender<MemoryChannel>;

#[derive(Clone, Default)]
pub struct MemoryHub {
    peers: Arc<Mutex<HashMap<NodeId, Inbox>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join with a fresh identity, online immediately
    pub fn join(&self) -> MemoryNetwork {
        self.join_with(Identity::generate(), Bootstrap::Immediate)
    }

    pub fn join_with(&self, identity: Identity, bootstrap: Bootstrap) -> MemoryNetwork {
        let id = identity.node_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);

        MemoryNetwork {
            id,
            hub: self.clone(),
            inbox: AsyncMutex::new(rx),
            bootstrap,
            closed: CancellationToken::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, Inbox>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn inbox(&self, peer: &NodeId) -> Option<Inbox> {
        self.lock().get(peer).cloned()
    }

    fn leave(&self, id: &NodeId) {
        self.lock().remove(id);
    }
}

/// How long a [`MemoryNetwork`] takes to come online.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    Immediate,
    After(Duration),
    Never,
}

pub struct MemoryNetwork {
    id: NodeId,
    hub: MemoryHub,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<MemoryChannel>>,
    bootstrap: Bootstrap,
    closed: CancellationToken,
}

impl PeerNetwork for MemoryNetwork {
    type Channel = MemoryChannel;
    type Incoming = Ready<Result<MemoryChannel>>;

    fn node_id(&self) -> NodeId {
        self.id
    }

    async fn online(&self) {
        match self.bootstrap {
            Bootstrap::Immediate => {}
            Bootstrap::After(delay) => tokio::time::sleep(delay).await,
            Bootstrap::Never => std::future::pending().await,
        }
    }

    async fn accept(&self) -> Option<Self::Incoming> {
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => None,
            channel = inbox.recv() => channel.map(|c| ready(Ok(c))),
        }
    }

    async fn open(&self, peer: NodeId) -> Result<MemoryChannel> {
        if self.closed.is_cancelled() {
            return Err(anyhow!("network is closed"));
        }
        let inbox = self
            .hub
            .inbox(&peer)
            .ok_or_else(|| anyhow!("peer {} is unreachable", peer))?;

        let (ours, theirs) = pair(self.id, peer);
        inbox
            .send(theirs)
            .map_err(|_| anyhow!("peer {} is no longer accepting", peer))?;
        Ok(ours)
    }

    async fn close(&self) {
        self.hub.leave(&self.id);
        self.closed.cancel();
    }
}
