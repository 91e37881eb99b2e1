use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::contact::Contact;
use crate::core::identifier::{KademliaId, RpcId};
use crate::core::storage::{StoreStatus, Value};
use crate::error::DhtError;

/// Outbound RPCs the node needs from a transport.
///
/// Implementations should fail with [`DhtError::PeerUnreachable`] or
/// [`DhtError::Timeout`] when a peer cannot be reached. The lookup engine
/// also puts its own bounded wait around every call, so a transport that
/// never answers cannot stall a lookup round.
#[async_trait]
pub trait RpcClient: Send + Sync + 'static {
    /// Ok if the peer answered.
    async fn ping(&self, peer: &Contact) -> Result<(), DhtError>;

    /// The peer's closest known contacts to `target`.
    async fn find_node(&self, peer: &Contact, target: KademliaId) -> Result<Vec<Contact>, DhtError>;

    /// The value for `key` if the peer holds it, else its closest contacts.
    async fn find_data(&self, peer: &Contact, key: KademliaId) -> Result<FindDataReply, DhtError>;

    /// Ask the peer to keep `value` under `key`.
    async fn store(
        &self,
        peer: &Contact,
        key: KademliaId,
        value: Value,
    ) -> Result<StoreStatus, DhtError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindDataReply {
    Contacts(Vec<Contact>),
    Data(Value),
}

/// Inbound requests. Every request implies the sender is alive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    FindNode { target: KademliaId },
    FindData { key: KademliaId },
    Store { key: KademliaId, value: Value },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Pong,
    Nodes { contacts: Vec<Contact> },
    Data { value: Value },
    Stored { status: StoreStatus },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Request(Request),
    Response(Response),
}

/// One datagram on the wire. `rpc_id` pairs a response with its request;
/// `sender` is the id of the node that sent this envelope. The sender's
/// address is taken from the datagram source, not from the payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub rpc_id: RpcId,
    pub sender: KademliaId,
    pub body: Body,
}

impl Envelope {
    pub fn request(sender: KademliaId, request: Request) -> Self {
        Self {
            rpc_id: RpcId::new_random(),
            sender,
            body: Body::Request(request),
        }
    }

    /// The answer to the request tagged `rpc_id`.
    pub fn response(rpc_id: RpcId, sender: KademliaId, response: Response) -> Self {
        Self {
            rpc_id,
            sender,
            body: Body::Response(response),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DhtError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
