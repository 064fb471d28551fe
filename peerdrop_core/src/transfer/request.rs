use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::Path;
use std::str::FromStr;

use super::constants::MAX_FILENAME_LENGTH;
use super::hash::payload_digest;
use super::session::TransferId;
use super::utils::sanitize_file_name;
use crate::NodeId;
use crate::error::RequestError;

/// One file to push to one peer, validated before it reaches the protocol.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    target: NodeId,
    file_name: String,
    payload: Bytes,
}

impl TransferRequest {
    /// Parse the peer id and check the file name.
    ///
    /// Directory components are stripped from `file_name`, so
    /// `"../docs/report.txt"` becomes `"report.txt"`.
    pub fn new(
        target: &str,
        file_name: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Self, RequestError> {
        let target = NodeId::from_str(target.trim())
            .map_err(|_| RequestError::InvalidPeerId(target.to_string()))?;
        Self::for_peer(target, file_name, payload)
    }

    pub fn for_peer(
        target: NodeId,
        file_name: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Self, RequestError> {
        let file_name = sanitize_file_name(file_name).ok_or(RequestError::EmptyFileName)?;
        if file_name.len() > MAX_FILENAME_LENGTH {
            return Err(RequestError::FileNameTooLong {
                len: file_name.len(),
                max: MAX_FILENAME_LENGTH,
            });
        }

        Ok(Self {
            target,
            file_name,
            payload: payload.into(),
        })
    }

    /// Read a file from disk into a request.
    pub async fn from_path(target: &str, path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?;
        let payload = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Self::new(target, file_name, payload)?)
    }

    /// Check limits that depend on the endpoint configuration.
    pub fn validate(&self, max_payload: usize) -> Result<(), RequestError> {
        if self.payload.len() > max_payload {
            return Err(RequestError::PayloadTooLarge {
                size: self.payload.len(),
                max: max_payload,
            });
        }
        Ok(())
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_parts(self) -> (NodeId, String, Bytes) {
        (self.target, self.file_name, self.payload)
    }
}

/// A completed receive: the captured file name paired with the payload.
///
/// The name is exactly what the sender put on the wire; sanitise it before
/// touching the filesystem (see [`save_received_file`](super::utils::save_received_file)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub file_name: String,
    pub payload: Bytes,
}

impl ReceivedFile {
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn digest(&self) -> String {
        payload_digest(&self.payload)
    }
}

/// What the sending side knows once its payload went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub id: TransferId,
    pub peer: NodeId,
    pub file_name: String,
    pub size: usize,
    /// BLAKE3 of the payload sent, for out-of-band comparison with the receiver
    pub digest: String,
    /// File-name frames sent before the acknowledgment arrived
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn test_new_parses_peer_id() {
        let peer = Identity::generate().node_id();
        let request = TransferRequest::new(&peer.to_string(), "report.txt", vec![1u8; 37]).unwrap();

        assert_eq!(request.target(), peer);
        assert_eq!(request.file_name(), "report.txt");
        assert_eq!(request.payload().len(), 37);
    }

    #[test]
    fn test_invalid_peer_id() {
        let err = TransferRequest::new("not-a-node-id", "a.txt", Vec::new()).unwrap_err();
        assert_eq!(err, RequestError::InvalidPeerId("not-a-node-id".to_string()));
    }

    #[test]
    fn test_file_name_is_reduced_to_last_component() {
        let peer = Identity::generate().node_id();
        let request = TransferRequest::for_peer(peer, "../../etc/passwd", Vec::new()).unwrap();
        assert_eq!(request.file_name(), "passwd");
    }

    #[test]
    fn test_empty_and_long_names_are_rejected() {
        let peer = Identity::generate().node_id();
        assert_eq!(
            TransferRequest::for_peer(peer, "", Vec::new()).unwrap_err(),
            RequestError::EmptyFileName
        );
        assert_eq!(
            TransferRequest::for_peer(peer, "..", Vec::new()).unwrap_err(),
            RequestError::EmptyFileName
        );

        let long = "a".repeat(MAX_FILENAME_LENGTH + 1);
        assert!(matches!(
            TransferRequest::for_peer(peer, &long, Vec::new()),
            Err(RequestError::FileNameTooLong { .. })
        ));
    }

    #[test]
    fn test_validate_payload_limit() {
        let peer = Identity::generate().node_id();
        let request = TransferRequest::for_peer(peer, "big.bin", vec![0u8; 10]).unwrap();

        assert!(request.validate(10).is_ok());
        assert_eq!(
            request.validate(9).unwrap_err(),
            RequestError::PayloadTooLarge { size: 10, max: 9 }
        );
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, b"# notes").await.unwrap();
        let peer = Identity::generate().node_id();

        let request = TransferRequest::from_path(&peer.to_string(), &path)
            .await
            .unwrap();
        assert_eq!(request.file_name(), "notes.md");
        assert_eq!(request.payload().as_ref(), b"# notes");
    }
}
