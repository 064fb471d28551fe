use anyhow::{Context, Result};
use iroh::endpoint::{Incoming, TransportConfig, VarInt};
use iroh::Endpoint;
use peerdrop_core::config::EndpointConfig;
use peerdrop_core::identity::KeyValueStore;
use peerdrop_core::{Identity, IdentityStore, NodeId};
use std::time::Duration;
use tracing::info;

use crate::endpoint::PeerEndpoint;
use crate::network::{BoxFuture, PeerNetwork};
use crate::protocol::{ALPN, StreamChannel};

/// The production provider: one iroh endpoint, one bi-stream per transfer.
pub struct IrohNetwork {
    endpoint: Endpoint,
    max_payload_size: usize,
}

impl IrohNetwork {
    /// Bind an iroh endpoint whose identity is `identity`
    ///
    /// # Arguments
    /// * `identity` - Determines the Node ID peers dial
    /// * `max_payload_size` - Largest binary frame accepted from a peer
    pub async fn bind(identity: &Identity, max_payload_size: usize) -> Result<Self> {
        info!("Initializing Iroh endpoint...");

        let mut transport_config = TransportConfig::default();
        transport_config.receive_window(VarInt::from_u32(16 * 1024 * 1024));
        transport_config.send_window(16 * 1024 * 1024);
        transport_config.max_idle_timeout(Duration::from_secs(60).try_into().ok());
        transport_config.keep_alive_interval(Some(Duration::from_secs(5)));

        let endpoint = Endpoint::builder()
            .secret_key(identity.secret_key().clone())
            .alpns(vec![ALPN.to_vec()])
            .transport_config(transport_config)
            .bind()
            .await
            .context("Failed to bind endpoint")?;

        info!("Iroh endpoint initialized with Node ID: {}", endpoint.id());

        Ok(Self {
            endpoint,
            max_payload_size,
        })
    }

    async fn finish_incoming(incoming: Incoming, max_payload_size: usize) -> Result<StreamChannel> {
        let connection = incoming.await.context("Failed to accept connection")?;
        info!(
            "Connection accepted and established with: {}",
            connection.remote_id()
        );

        // The dialer opens the stream lazily, with its first file name.
        let (send, recv) = connection
            .accept_bi()
            .await
            .context("Failed to accept bi-directional stream")?;

        Ok(StreamChannel::new(connection, send, recv, max_payload_size))
    }
}

impl PeerNetwork for IrohNetwork {
    type Channel = StreamChannel;
    type Incoming = BoxFuture<Result<StreamChannel>>;

    fn node_id(&self) -> NodeId {
        self.endpoint.id()
    }

    async fn online(&self) {
        self.endpoint.online().await;
        info!("Endpoint address: {:?}", self.endpoint.addr());
    }

    async fn accept(&self) -> Option<Self::Incoming> {
        let incoming = self.endpoint.accept().await?;
        let max_payload_size = self.max_payload_size;
        Some(Box::pin(Self::finish_incoming(incoming, max_payload_size)))
    }

    async fn open(&self, peer: NodeId) -> Result<StreamChannel> {
        info!("Using ALPN: {:?}", String::from_utf8_lossy(ALPN));
        info!("Attempting connection (UDP hole punch / relay)...");

        let connection = self
            .endpoint
            .connect(peer, ALPN)
            .await
            .context("Failed to connect to peer")?;
        let (send, recv) = connection
            .open_bi()
            .await
            .context("Failed to open stream")?;

        Ok(StreamChannel::new(
            connection,
            send,
            recv,
            self.max_payload_size,
        ))
    }

    async fn close(&self) {
        if self.endpoint.is_closed() {
            return;
        }
        info!("Closing Iroh endpoint...");
        self.endpoint.close().await;
    }
}

impl PeerEndpoint<IrohNetwork> {
    /// Bind an iroh-backed endpoint under the persisted identity, creating
    /// and storing one on first run.
    pub async fn bind<S: KeyValueStore>(
        store: &IdentityStore<S>,
        config: EndpointConfig,
    ) -> Result<Self> {
        let (identity, _) = store.load_or_generate();
        let network = IrohNetwork::bind(&identity, config.max_payload_size).await?;
        Ok(PeerEndpoint::new(network, config))
    }
}
