use peerdrop_core::{
    EndpointError, NodeId, TransferEvent, TransferReceipt, TransferRequest, TransferResult,
};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

use crate::endpoint::PeerEndpoint;
use crate::network::PeerNetwork;

/// Owns a [`PeerEndpoint`] for as long as the application runs.
///
/// Inbound transfers run in the background and are reported as
/// [`TransferEvent`]s. A handler waiting on a full event channel is cancelled
/// with the endpoint. The endpoint is disposed by [`shutdown`](Self::shutdown)
/// or, failing that, when the session is dropped.
pub struct Session<N: PeerNetwork> {
    endpoint: PeerEndpoint<N>,
    events: mpsc::Sender<TransferEvent>,
}

impl<N: PeerNetwork> Session<N> {
    /// Announce readiness and start receiving on inbound channels.
    pub fn start(
        endpoint: PeerEndpoint<N>,
        events: mpsc::Sender<TransferEvent>,
    ) -> Result<Self, EndpointError> {
        let node_id = endpoint.node_id();
        let ready = endpoint.ready_signal();
        let ready_tx = events.clone();
        endpoint.spawn(async move {
            match ready.await {
                Ok(()) => {
                    let _ = ready_tx.send(TransferEvent::Ready { node_id }).await;
                }
                Err(e) => error!("Endpoint never became ready: {}", e),
            }
        });

        let receive_timeout = endpoint.config().receive_timeout;
        let inbound_tx = events.clone();
        endpoint.listen(move |session| {
            let tx = inbound_tx.clone();
            async move {
                let id = session.id();
                let from = session.remote_id();
                let _ = tx.send(TransferEvent::Incoming { id, from }).await;

                let event = match session.receive(receive_timeout).await {
                    Ok(file) => TransferEvent::Received { id, from, file },
                    Err(e) => {
                        error!("[{}] Receive from {} failed: {}", id, from, e);
                        TransferEvent::Failed {
                            id: Some(id),
                            peer: from,
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = tx.send(event).await;
            }
        })?;

        Ok(Self { endpoint, events })
    }

    pub fn endpoint(&self) -> &PeerEndpoint<N> {
        &self.endpoint
    }

    pub fn node_id(&self) -> NodeId {
        self.endpoint.node_id()
    }

    /// Send one file. The outcome is returned and also reported as an event.
    pub async fn submit(&self, request: TransferRequest) -> TransferResult<TransferReceipt> {
        let peer = request.target();
        let result = self.endpoint.send(request).await;

        let event = match &result {
            Ok(receipt) => TransferEvent::Sent(receipt.clone()),
            Err(e) => {
                error!("Transfer to {} failed: {}", peer, e);
                TransferEvent::Failed {
                    id: None,
                    peer,
                    reason: e.to_string(),
                }
            }
        };
        // The caller already has the outcome; never wait on a full channel for it.
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event channel full, dropping {:?}", event),
            Err(TrySendError::Closed(_)) => {}
        }
        result
    }

    /// Run `body` until it finishes or Ctrl-C arrives, then shut down.
    ///
    /// Returns `None` when interrupted.
    pub async fn run_scoped<F, T>(&self, body: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let outcome = tokio::select! {
            out = body => Some(out),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                None
            }
        };
        self.shutdown().await;
        outcome
    }

    pub async fn shutdown(&self) {
        self.endpoint.dispose().await;
    }
}

impl<N: PeerNetwork> Drop for Session<N> {
    fn drop(&mut self) {
        if self.endpoint.is_disposed() {
            return;
        }
        warn!("Session dropped without shutdown, disposing endpoint");
        self.endpoint.abort();

        // Finish closing the provider if a runtime is still around.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let endpoint = self.endpoint.clone();
            handle.spawn(async move { endpoint.dispose().await });
        }
    }
}
