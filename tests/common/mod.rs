#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use kademlia_node::{
    Contact, DhtError, FindDataReply, KademliaDht, KademliaId, NodeConfig, Request, Response,
    RpcClient, StoreStatus, Value,
};

pub type TestNode = KademliaDht<TestNetwork>;

/// Delivers RPCs straight into other nodes' `handle_request`.
#[derive(Clone)]
pub struct TestNetwork {
    registry: Arc<NetworkRegistry>,
    self_contact: Contact,
    failures: Arc<Mutex<HashSet<KademliaId>>>,
    stores: Arc<Mutex<Vec<(KademliaId, KademliaId)>>>,
}

impl TestNetwork {
    pub fn new(registry: Arc<NetworkRegistry>, self_contact: Contact) -> Self {
        Self {
            registry,
            self_contact,
            failures: Arc::new(Mutex::new(HashSet::new())),
            stores: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_failure(&self, node: KademliaId, fail: bool) {
        let mut failures = self.failures.lock().await;
        if fail {
            failures.insert(node);
        } else {
            failures.remove(&node);
        }
    }

    /// (peer, key) for every store this node sent.
    pub async fn store_calls(&self) -> Vec<(KademliaId, KademliaId)> {
        self.stores.lock().await.clone()
    }

    async fn deliver(&self, to: &Contact, request: Request) -> Result<Response, DhtError> {
        if self.failures.lock().await.contains(&to.id) {
            return Err(DhtError::PeerUnreachable(to.address));
        }
        let peer = self
            .registry
            .get(&to.id)
            .await
            .ok_or(DhtError::PeerUnreachable(to.address))?;
        peer.handle_request(self.self_contact.clone(), request).await
    }
}

#[derive(Default)]
pub struct NetworkRegistry {
    peers: RwLock<HashMap<KademliaId, TestNode>>,
}

impl NetworkRegistry {
    pub async fn register(&self, node: &TestNode) {
        self.peers.write().await.insert(node.me().id, node.clone());
    }

    pub async fn get(&self, id: &KademliaId) -> Option<TestNode> {
        self.peers.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<KademliaId> {
        self.peers.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl RpcClient for TestNetwork {
    async fn ping(&self, peer: &Contact) -> Result<(), DhtError> {
        match self.deliver(peer, Request::Ping).await? {
            Response::Pong => Ok(()),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }

    async fn find_node(
        &self,
        peer: &Contact,
        target: KademliaId,
    ) -> Result<Vec<Contact>, DhtError> {
        match self.deliver(peer, Request::FindNode { target }).await? {
            Response::Nodes { contacts } => Ok(contacts),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }

    async fn find_data(&self, peer: &Contact, key: KademliaId) -> Result<FindDataReply, DhtError> {
        match self.deliver(peer, Request::FindData { key }).await? {
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
        self.stores.lock().await.push((peer.id, key));
        match self.deliver(peer, Request::Store { key, value }).await? {
            Response::Stored { status } => Ok(status),
            _ => Err(DhtError::UnexpectedReply(peer.address)),
        }
    }
}

pub fn test_config(k: usize) -> NodeConfig {
    NodeConfig::default()
        .with_k(k)
        .with_rpc_timeout(Duration::from_millis(200))
}

/// Start a node on a made-up loopback address and register it.
pub async fn spawn_node(
    registry: &Arc<NetworkRegistry>,
    port: u16,
    config: NodeConfig,
) -> (TestNode, TestNetwork) {
    let me = Contact::new(
        KademliaId::random(),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
    );
    let network = TestNetwork::new(Arc::clone(registry), me.clone());
    let node = KademliaDht::start(me, Arc::new(network.clone()), config).unwrap();
    registry.register(&node).await;
    (node, network)
}

/// `count` nodes, each joined through the first one.
pub async fn spawn_cluster(
    registry: &Arc<NetworkRegistry>,
    count: usize,
    config: NodeConfig,
) -> Vec<(TestNode, TestNetwork)> {
    let mut nodes: Vec<(TestNode, TestNetwork)> = Vec::with_capacity(count);
    for i in 0..count {
        let (node, network) = spawn_node(registry, 10_000 + i as u16, config.clone()).await;
        if let Some((seed, _)) = nodes.first() {
            node.bootstrap(seed.me().clone()).await.unwrap();
        }
        nodes.push((node, network));
    }
    nodes
}
