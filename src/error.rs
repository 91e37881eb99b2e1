use std::net::SocketAddr;

use thiserror::Error;

use crate::core::identifier::KademliaId;

/// Errors surfaced by the node.
///
/// Per-peer failures (`PeerUnreachable`, `Timeout`) are produced by
/// [`crate::protocol::RpcClient`] implementations and absorbed by the lookup
/// engine; callers of [`crate::dht::KademliaDht`] normally only see
/// `MalformedIdentifier`, `NoContactsFound` and `ChannelClosed`.
#[derive(Debug, Error)]
pub enum DhtError {
    #[error("malformed identifier {input:?}: {reason}")]
    MalformedIdentifier { input: String, reason: String },

    #[error("no contacts found for target {0}")]
    NoContactsFound(KademliaId),

    #[error("peer {0} is unreachable")]
    PeerUnreachable(SocketAddr),

    #[error("timed out waiting for {0}")]
    Timeout(SocketAddr),

    #[error("unexpected reply from {0}")]
    UnexpectedReply(SocketAddr),

    /// The node actor is gone. The actor lives for the whole process, so this
    /// is fatal for the caller.
    #[error("node actor channel closed")]
    ChannelClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DhtError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DhtError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for DhtError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        DhtError::ChannelClosed
    }
}
