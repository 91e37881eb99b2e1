pub mod bucket;
pub mod contact;
pub mod identifier;
pub mod routing_table;
pub mod storage;

use contact::Contact;
use identifier::KademliaId;
use routing_table::RoutingTable;
use storage::{Storage, StoreStatus, Value};

pub const ID_LENGTH: usize = 20; // needs to match SHA1's output length
pub const NUM_BUCKETS: usize = ID_LENGTH * 8;

/// Everything a node owns: its identity, routing table and local values.
/// Only the node actor holds one of these.
#[derive(Debug)]
pub struct NodeState {
    pub routing_table: RoutingTable,
    storage: Storage,
}

impl NodeState {
    pub fn new(me: Contact, k: usize) -> Self {
        Self {
            routing_table: RoutingTable::new(me, k),
            storage: Storage::new(),
        }
    }

    pub fn me(&self) -> &Contact {
        self.routing_table.me()
    }

    pub fn store(&mut self, key: KademliaId, value: Value) -> StoreStatus {
        self.storage.insert(key, value)
    }

    pub fn get(&self, key: &KademliaId) -> Option<&Value> {
        self.storage.get(key)
    }
}
