use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethereum_types::H160;

use crate::core::contact::Contact;
use crate::core::identifier::KademliaId;
use crate::core::storage::{StoreStatus, Value};
use crate::error::DhtError;
use crate::protocol::{FindDataReply, RpcClient};

pub fn id_with_first_byte(b: u8) -> KademliaId {
    let mut id = [0u8; 20];
    id[0] = b;
    KademliaId(H160::from(id))
}

pub fn make_contact(first_byte: u8, port: u16) -> Contact {
    Contact::new(
        id_with_first_byte(first_byte),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
    )
}

pub fn contact_from_hex(hex: &str, port: u16) -> Contact {
    Contact::new(
        KademliaId::from_hex(hex).unwrap(),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
    )
}

/// A scripted network: each peer answers from a fixed neighbour list and
/// value map. Peers can be marked down (fail fast) or stalled (never answer).
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    neighbours: HashMap<KademliaId, Vec<Contact>>,
    values: HashMap<KademliaId, HashMap<KademliaId, Value>>,
    down: HashSet<KademliaId>,
    stalled: HashSet<KademliaId>,
    queried: Vec<KademliaId>,
    pings: Vec<KademliaId>,
    stores: Vec<(KademliaId, KademliaId)>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_neighbours(&self, peer: KademliaId, contacts: Vec<Contact>) {
        self.state.lock().unwrap().neighbours.insert(peer, contacts);
    }

    pub fn set_value(&self, peer: KademliaId, key: KademliaId, value: Value) {
        self.state
            .lock()
            .unwrap()
            .values
            .entry(peer)
            .or_default()
            .insert(key, value);
    }

    pub fn set_down(&self, peer: KademliaId) {
        self.state.lock().unwrap().down.insert(peer);
    }

    pub fn set_stalled(&self, peer: KademliaId) {
        self.state.lock().unwrap().stalled.insert(peer);
    }

    /// Peers that received find_node/find_data, in call order.
    pub fn queried(&self) -> Vec<KademliaId> {
        self.state.lock().unwrap().queried.clone()
    }

    pub fn pings(&self) -> Vec<KademliaId> {
        self.state.lock().unwrap().pings.clone()
    }

    /// (peer, key) pairs that received a store.
    pub fn stores(&self) -> Vec<(KademliaId, KademliaId)> {
        self.state.lock().unwrap().stores.clone()
    }

    /// Err for a down peer, Ok(true) for a stalled one.
    fn reachability(&self, peer: &Contact) -> Result<bool, DhtError> {
        let state = self.state.lock().unwrap();
        if state.down.contains(&peer.id) {
            return Err(DhtError::PeerUnreachable(peer.address));
        }
        Ok(state.stalled.contains(&peer.id))
    }

    async fn reach(&self, peer: &Contact) -> Result<(), DhtError> {
        if self.reachability(peer)? {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn neighbours_of(&self, peer: &KademliaId) -> Vec<Contact> {
        self.state
            .lock()
            .unwrap()
            .neighbours
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RpcClient for MockNetwork {
    async fn ping(&self, peer: &Contact) -> Result<(), DhtError> {
        self.state.lock().unwrap().pings.push(peer.id);
        self.reach(peer).await
    }

    async fn find_node(
        &self,
        peer: &Contact,
        _target: KademliaId,
    ) -> Result<Vec<Contact>, DhtError> {
        self.state.lock().unwrap().queried.push(peer.id);
        self.reach(peer).await?;
        Ok(self.neighbours_of(&peer.id))
    }

    async fn find_data(&self, peer: &Contact, key: KademliaId) -> Result<FindDataReply, DhtError> {
        self.state.lock().unwrap().queried.push(peer.id);
        self.reach(peer).await?;
        let value = self
            .state
            .lock()
            .unwrap()
            .values
            .get(&peer.id)
            .and_then(|values| values.get(&key).cloned());
        Ok(match value {
            Some(value) => FindDataReply::Data(value),
            None => FindDataReply::Contacts(self.neighbours_of(&peer.id)),
        })
    }

    async fn store(
        &self,
        peer: &Contact,
        key: KademliaId,
        value: Value,
    ) -> Result<StoreStatus, DhtError> {
        self.reach(peer).await?;
        let mut state = self.state.lock().unwrap();
        state.stores.push((peer.id, key));
        state.values.entry(peer.id).or_default().insert(key, value);
        Ok(StoreStatus::Stored)
    }
}
