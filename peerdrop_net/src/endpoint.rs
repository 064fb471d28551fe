use peerdrop_core::config::EndpointConfig;
use peerdrop_core::{
    ChannelSession, EndpointError, NodeId, ReceivedFile, Role, TransferError, TransferReceipt,
    TransferRequest, TransferResult,
};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::network::PeerNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

/// Owns one network provider and everything running on it.
///
/// Cloning gives another handle to the same endpoint. Tasks spawned by the
/// endpoint only hold the shared state, so dropping the last handle cancels
/// them even when [`dispose`](Self::dispose) was never called.
pub struct PeerEndpoint<N: PeerNetwork> {
    shared: Arc<Shared<N>>,
    _guard: Arc<DropGuard>,
}

impl<N: PeerNetwork> Clone for PeerEndpoint<N> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _guard: self._guard.clone(),
        }
    }
}

struct Shared<N> {
    network: N,
    config: EndpointConfig,
    state: watch::Sender<EndpointState>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    listening: AtomicBool,
    disposed: AtomicBool,
}

impl<N: PeerNetwork> PeerEndpoint<N> {
    /// Wrap a provider and start bootstrapping it. Must be called within a tokio runtime.
    pub fn new(network: N, config: EndpointConfig) -> Self {
        let cancel = CancellationToken::new();
        let (state, _) = watch::channel(EndpointState::Uninitialized);

        let shared = Arc::new(Shared {
            network,
            config,
            state,
            cancel: cancel.clone(),
            tasks: TaskTracker::new(),
            listening: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });

        let endpoint = Self {
            shared,
            _guard: Arc::new(cancel.drop_guard()),
        };
        endpoint.bootstrap();
        endpoint
    }

    fn bootstrap(&self) {
        let shared = self.shared.clone();
        shared.state.send_replace(EndpointState::Initializing);
        info!("Bootstrapping endpoint {}", shared.network.node_id());

        let start = Instant::now();
        self.spawn(async move {
            shared.network.online().await;
            let became_ready = shared.state.send_if_modified(|state| {
                if *state == EndpointState::Initializing {
                    *state = EndpointState::Ready;
                    true
                } else {
                    false
                }
            });
            if became_ready {
                info!(
                    "Endpoint {} ready in {:?}",
                    shared.network.node_id(),
                    start.elapsed()
                );
            }
        });
    }

    /// Identity peers dial; available before the endpoint is ready.
    pub fn node_id(&self) -> NodeId {
        self.shared.network.node_id()
    }

    pub fn state(&self) -> EndpointState {
        *self.shared.state.borrow()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.shared.config
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Wait until the provider is online, at most `ready_timeout`.
    ///
    /// Returns immediately once the endpoint is ready.
    pub async fn ready(&self) -> Result<(), EndpointError> {
        self.ready_signal().await
    }

    /// Same as [`ready`](Self::ready), but detached from this handle.
    ///
    /// The future only watches the endpoint state, so holding it does not keep
    /// the endpoint alive.
    pub fn ready_signal(
        &self,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send + 'static + use<N> {
        wait_ready(self.shared.state.subscribe(), self.shared.config.ready_timeout)
    }

    /// Run `fut` as part of this endpoint: it is cancelled by disposal and
    /// waited for before the provider closes.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.shared.cancel.clone();
        self.shared.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = fut => {}
            }
        });
    }

    /// Hand every inbound channel, as a Receiver-role session, to `on_connection`.
    ///
    /// Each call of the handler runs on its own task. Only one handler can be
    /// registered per endpoint.
    pub fn listen<F, Fut>(&self, on_connection: F) -> Result<(), EndpointError>
    where
        F: Fn(ChannelSession<N::Channel>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_disposed() {
            return Err(EndpointError::Disposed);
        }
        if self.shared.listening.swap(true, Ordering::SeqCst) {
            return Err(EndpointError::AlreadyListening);
        }

        info!("Waiting for incoming connections...");
        info!("Share your Node ID with others: {}", self.node_id());

        let shared = self.shared.clone();
        self.shared
            .tasks
            .spawn(accept_loop(shared, Arc::new(on_connection)));
        Ok(())
    }

    /// Open a Sender-role session to `peer`, bounded by `connect_timeout`.
    pub async fn connect(&self, peer: NodeId) -> TransferResult<ChannelSession<N::Channel>> {
        if self.is_disposed() {
            return Err(EndpointError::Disposed.into());
        }

        let timeout = self.shared.config.connect_timeout;
        info!("Connecting to {} (timeout {:?})", peer, timeout);
        let start = Instant::now();

        let opened = tokio::select! {
            _ = self.shared.cancel.cancelled() => return Err(TransferError::Cancelled),
            opened = tokio::time::timeout(timeout, self.shared.network.open(peer)) => opened,
        };

        match opened {
            Ok(Ok(channel)) => {
                info!("✓ Connected to {} in {:?}", peer, start.elapsed());
                Ok(ChannelSession::new(channel, Role::Sender)
                    .with_cancel(self.shared.cancel.child_token()))
            }
            Ok(Err(source)) => {
                error!("Failed to connect to {}: {:#}", peer, source);
                Err(TransferError::Connection { peer, source })
            }
            Err(_) => {
                error!("Connecting to {} timed out after {:?}", peer, timeout);
                Err(TransferError::Connection {
                    peer,
                    source: anyhow::anyhow!("timed out after {:?}", timeout),
                })
            }
        }
    }

    /// Validate the request, connect, and run the Sender role to completion.
    pub async fn send(&self, request: TransferRequest) -> TransferResult<TransferReceipt> {
        request.validate(self.shared.config.max_payload_size)?;
        let (peer, file_name, payload) = request.into_parts();

        let session = self.connect(peer).await?;
        session
            .send(file_name, payload, &self.shared.config.retry)
            .await
    }

    /// Run the Receiver role on an accepted session with this endpoint's idle timeout.
    pub async fn receive(
        &self,
        session: ChannelSession<N::Channel>,
    ) -> TransferResult<ReceivedFile> {
        session.receive(self.shared.config.receive_timeout).await
    }

    /// Cancel every session and task, then close the provider.
    ///
    /// Safe to call any number of times and before the endpoint is ready.
    pub async fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            debug!("Endpoint already disposed");
            return;
        }
        info!("Disposing endpoint {}...", self.node_id());

        self.shared.cancel.cancel();
        self.shared.state.send_replace(EndpointState::Disposed);

        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        self.shared.network.close().await;

        info!("Endpoint disposed");
    }

    /// Cancel everything without waiting. For synchronous teardown paths.
    pub fn abort(&self) {
        self.shared.cancel.cancel();
    }
}

async fn wait_ready(
    mut state: watch::Receiver<EndpointState>,
    timeout: Duration,
) -> Result<(), EndpointError> {
    let reached = tokio::time::timeout(
        timeout,
        state.wait_for(|s| matches!(s, EndpointState::Ready | EndpointState::Disposed)),
    )
    .await;

    match reached {
        Ok(Ok(current)) if *current == EndpointState::Ready => Ok(()),
        Ok(_) => Err(EndpointError::Disposed),
        Err(_) => {
            warn!("Endpoint not ready after {:?}", timeout);
            Err(EndpointError::NotReady(timeout))
        }
    }
}

async fn accept_loop<N, F, Fut>(shared: Arc<Shared<N>>, on_connection: Arc<F>)
where
    N: PeerNetwork,
    F: Fn(ChannelSession<N::Channel>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let incoming = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            incoming = shared.network.accept() => incoming,
        };
        let Some(incoming) = incoming else {
            warn!("Network closed, stopping listener");
            break;
        };

        info!("Incoming connection detected, spawning handler...");
        let on_connection = on_connection.clone();
        let cancel = shared.cancel.clone();
        let timeout = shared.config.connect_timeout;

        shared.tasks.spawn(async move {
            let channel = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = tokio::time::timeout(timeout, incoming) => accepted,
            };
            match channel {
                Ok(Ok(channel)) => {
                    let session = ChannelSession::new(channel, Role::Receiver)
                        .with_cancel(cancel.child_token());
                    info!(
                        "[{}] Channel opened by {}",
                        session.id(),
                        session.remote_id()
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = on_connection(session) => {}
                    }
                }
                Ok(Err(e)) => error!("Error accepting connection: {:#}", e),
                Err(_) => warn!("Incoming connection not set up within {:?}", timeout),
            }
        });
    }
    info!("Listener stopped");
}
