use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, trace, warn};

use crate::core::contact::Contact;
use crate::core::identifier::{KademliaId, RpcId};
use crate::core::storage::{StoreStatus, Value};
use crate::dht::KademliaDht;
use crate::error::DhtError;
use crate::protocol::{Body, Envelope, FindDataReply, Request, Response, RpcClient};

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

struct PendingCall {
    peer: SocketAddr,
    tx: oneshot::Sender<Response>,
}

type PendingCalls = Arc<Mutex<HashMap<RpcId, PendingCall>>>;

/// Removes a call's entry from the pending map when the call future goes
/// away, whether it finished, timed out or was dropped by its caller.
struct PendingGuard {
    rpc_id: RpcId,
    pending: PendingCalls,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let rpc_id = self.rpc_id;
        match self.pending.try_lock() {
            Ok(mut pending) => {
                pending.remove(&rpc_id);
            }
            Err(_) => {
                let pending = Arc::clone(&self.pending);
                if let Ok(runtime) = Handle::try_current() {
                    runtime.spawn(async move {
                        pending.lock().await.remove(&rpc_id);
                    });
                }
            }
        }
    }
}

/// [`RpcClient`] over one UDP socket.
///
/// Outbound calls are correlated with their replies by [`RpcId`]. Replies are
/// delivered by [`serve`], which must be running on the same socket.
#[derive(Clone)]
pub struct UdpNetwork {
    socket: Arc<UdpSocket>,
    me: KademliaId,
    pending: PendingCalls,
    call_timeout: Duration,
}

impl UdpNetwork {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        me: KademliaId,
        call_timeout: Duration,
    ) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            me,
            pending: Arc::new(Mutex::new(HashMap::new())),
            call_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    async fn call(&self, peer: &Contact, request: Request) -> Result<Response, DhtError> {
        let envelope = Envelope::request(self.me, request);
        let rpc_id = envelope.rpc_id;
        let bytes = envelope.to_bytes()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            rpc_id,
            PendingCall {
                peer: peer.address,
                tx,
            },
        );
        let _guard = PendingGuard {
            rpc_id,
            pending: Arc::clone(&self.pending),
        };

        trace!(bytes = bytes.len(), addr = %peer.address, "UDP send");
        if let Err(e) = self.socket.send_to(&bytes, peer.address).await {
            debug!(addr = %peer.address, error = %e, "Failed to send");
            return Err(DhtError::PeerUnreachable(peer.address));
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DhtError::PeerUnreachable(peer.address)),
            Err(_) => Err(DhtError::Timeout(peer.address)),
        }
    }

    /// Hand a reply to the call waiting on `rpc_id`. Replies from an address
    /// other than the one the request went to are dropped.
    async fn complete(&self, from: SocketAddr, rpc_id: RpcId, response: Response) {
        let mut pending = self.pending.lock().await;
        match pending.get(&rpc_id).map(|call| call.peer) {
            Some(peer) if peer == from => {
                if let Some(call) = pending.remove(&rpc_id) {
                    let _ = call.tx.send(response);
                }
            }
            Some(peer) => warn!(
                event = "reply_from_wrong_peer",
                expected = %peer,
                %from,
                "Dropping reply"
            ),
            None => debug!(%from, "Reply for an unknown or expired call"),
        }
    }

    async fn answer<R: RpcClient>(
        &self,
        dht: &KademliaDht<R>,
        from: SocketAddr,
        rpc_id: RpcId,
        sender: KademliaId,
        request: Request,
    ) -> Result<(), DhtError> {
        let response = dht.handle_request(Contact::new(sender, from), request).await?;
        let bytes = Envelope::response(rpc_id, self.me, response).to_bytes()?;
        self.socket.send_to(&bytes, from).await?;
        Ok(())
    }
}

#[async_trait]
impl RpcClient for UdpNetwork {
    async fn ping(&self, peer: &Contact) -> Result<(), DhtError> {
        match self.call(peer, Request::Ping).await? {
            Response::Pong => Ok(()),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }

    async fn find_node(
        &self,
        peer: &Contact,
        target: KademliaId,
    ) -> Result<Vec<Contact>, DhtError> {
        match self.call(peer, Request::FindNode { target }).await? {
            Response::Nodes { contacts } => Ok(contacts),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }

    async fn find_data(&self, peer: &Contact, key: KademliaId) -> Result<FindDataReply, DhtError> {
        match self.call(peer, Request::FindData { key }).await? {
            Response::Data { value } => Ok(FindDataReply::Data(value)),
            Response::Nodes { contacts } => Ok(FindDataReply::Contacts(contacts)),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }

    async fn store(
        &self,
        peer: &Contact,
        key: KademliaId,
        value: Value,
    ) -> Result<StoreStatus, DhtError> {
        match self.call(peer, Request::Store { key, value }).await? {
            Response::Stored { status } => Ok(status),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }
}

/// Receive datagrams forever. Replies complete pending calls on `net`;
/// each request is answered by `dht` on its own task.
pub async fn serve<R: RpcClient>(net: UdpNetwork, dht: KademliaDht<R>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match net.socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // an ICMP error from an earlier send surfaces here on some platforms
                debug!(error = %e, "Error receiving datagram");
                continue;
            }
        };
        trace!(bytes = len, %from, "UDP recv");

        let envelope = match Envelope::from_bytes(&buf[..len]) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(%from, error = %e, "Error decoding message");
                continue;
            }
        };

        match envelope.body {
            Body::Response(response) => net.complete(from, envelope.rpc_id, response).await,
            Body::Request(request) => {
                let net = net.clone();
                let dht = dht.clone();
                let (rpc_id, sender) = (envelope.rpc_id, envelope.sender);
                tokio::spawn(async move {
                    if let Err(e) = net.answer(&dht, from, rpc_id, sender, request).await {
                        warn!(%from, error = %e, "Failed to answer request");
                    }
                });
            }
        }
    }
}
