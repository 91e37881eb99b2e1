use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::core::bucket::InsertResult;
use crate::core::contact::Contact;
use crate::core::identifier::KademliaId;
use crate::core::storage::{StoreStatus, Value};
use crate::core::NodeState;
use crate::error::DhtError;

mod command;
pub use self::command::{Admission, BucketDump, Command};

/// The single owner of a node's routing table and value store.
///
/// Runs as its own task and processes [`Command`]s strictly one at a time.
/// It never touches the network: when a full bucket needs a liveness probe the
/// actor hands the LRU contact back to the caller and remembers which
/// newcomer is waiting on it.
pub struct NodeActor {
    state: NodeState,
    rx: mpsc::Receiver<Command>,
    // LRU id -> newcomer waiting for the outcome of that LRU's probe
    pending_probes: HashMap<KademliaId, Contact>,
}

impl NodeActor {
    pub fn new(state: NodeState, rx: mpsc::Receiver<Command>) -> Self {
        Self {
            state,
            rx,
            pending_probes: HashMap::new(),
        }
    }

    /// Spawn an actor for `me` and return the handle used to talk to it.
    pub fn spawn(me: Contact, k: usize, buffer: usize) -> NodeHandle {
        let (tx, rx) = mpsc::channel(buffer);
        let actor = NodeActor::new(NodeState::new(me, k), rx);
        tokio::spawn(actor.run());
        NodeHandle { tx }
    }

    /// Receive commands until every handle has been dropped.
    pub async fn run(mut self) {
        info!(me = %self.state.me().id.short_hex(), "node actor started");
        while let Some(command) = self.rx.recv().await {
            self.handle_command(command);
        }
        info!(me = %self.state.me().id.short_hex(), "command channel closed; node actor stopping");
    }

    fn handle_command(&mut self, command: Command) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::UpdateRoutingTable {
                contact,
                tx_admission,
            } => {
                let admission = self.admit(contact);
                if let Err(Admission::ProbeRequired { lru }) = tx_admission.send(admission) {
                    // no one is left to ping the LRU
                    self.pending_probes.remove(&lru.id);
                }
            }
            Command::ResolveProbe {
                lru,
                alive,
                tx_result,
            } => {
                let candidate = self.pending_probes.remove(&lru.id);
                let result = self
                    .state
                    .routing_table
                    .resolve_probe(&lru, candidate.clone(), alive);
                debug!(
                    event = "probe_resolved",
                    lru = %lru.id.short_hex(),
                    alive,
                    candidate = ?candidate.map(|c| c.id.short_hex()),
                    ?result,
                    "Resolved LRU probe"
                );
                let _ = tx_result.send(result);
            }
            Command::RemoveContact { id, tx_removed } => {
                let removed = self.state.routing_table.remove_contact(&id);
                let _ = tx_removed.send(removed);
            }
            Command::Store {
                key,
                value,
                tx_status,
            } => {
                let status = self.state.store(key, value);
                match status {
                    StoreStatus::Stored => debug!(key = %key.short_hex(), "Stored value"),
                    StoreStatus::Duplicate => {
                        debug!(key = %key.short_hex(), "Value already stored; nothing to do")
                    }
                    StoreStatus::Conflict => warn!(
                        event = "store_conflict",
                        key = %key.short_hex(),
                        "Rejected a different payload for an existing key"
                    ),
                }
                let _ = tx_status.send(status);
            }
            Command::LookupContact {
                target,
                count,
                tx_contacts,
            } => {
                let contacts = self
                    .state
                    .routing_table
                    .find_closest_contacts(&target, count);
                trace!(target_id = %target.short_hex(), found = contacts.len(), "LookupContact");
                let _ = tx_contacts.send(contacts);
            }
            Command::LookupData { key, tx_value } => {
                let _ = tx_value.send(self.state.get(&key).cloned());
            }
            Command::DumpRoutingTable { tx_dump } => {
                let dump = self
                    .state
                    .routing_table
                    .occupied_buckets()
                    .map(|(index, bucket)| BucketDump {
                        index,
                        contacts: bucket.contacts().cloned().collect(),
                    })
                    .collect();
                let _ = tx_dump.send(dump);
            }
        }
    }

    fn admit(&mut self, contact: Contact) -> Admission {
        let id = contact.id;
        match self.state.routing_table.add_contact(contact.clone()) {
            InsertResult::Inserted => {
                debug!(peer = %id.short_hex(), "Inserted contact");
                Admission::Inserted
            }
            InsertResult::AlreadyPresent | InsertResult::Updated => Admission::Refreshed,
            InsertResult::Ignored => Admission::Ignored,
            InsertResult::Full { lru } => {
                if self.pending_probes.contains_key(&lru.id) {
                    debug!(
                        event = "probe_coalesced",
                        lru = %lru.id.short_hex(),
                        peer = %id.short_hex(),
                        "LRU already being probed; dropping newcomer"
                    );
                    Admission::ProbeInFlight { lru }
                } else {
                    self.pending_probes.insert(lru.id, contact);
                    Admission::ProbeRequired { lru }
                }
            }
        }
    }
}

/// Cheap, cloneable sender side of a [`NodeActor`].
///
/// Every method is one round trip through the actor. They fail only with
/// [`DhtError::ChannelClosed`], when the actor is gone.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::Sender<Command>,
}

impl NodeHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    pub async fn update_routing_table(&self, contact: Contact) -> Result<Admission, DhtError> {
        let (tx_admission, rx) = oneshot::channel();
        self.tx
            .send(Command::UpdateRoutingTable {
                contact,
                tx_admission,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn resolve_probe(&self, lru: Contact, alive: bool) -> Result<InsertResult, DhtError> {
        let (tx_result, rx) = oneshot::channel();
        self.tx
            .send(Command::ResolveProbe {
                lru,
                alive,
                tx_result,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn remove_contact(&self, id: KademliaId) -> Result<bool, DhtError> {
        let (tx_removed, rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveContact { id, tx_removed })
            .await?;
        Ok(rx.await?)
    }

    pub async fn store(&self, key: KademliaId, value: Value) -> Result<StoreStatus, DhtError> {
        let (tx_status, rx) = oneshot::channel();
        self.tx
            .send(Command::Store {
                key,
                value,
                tx_status,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn closest(
        &self,
        target: KademliaId,
        count: usize,
    ) -> Result<Vec<Contact>, DhtError> {
        let (tx_contacts, rx) = oneshot::channel();
        self.tx
            .send(Command::LookupContact {
                target,
                count,
                tx_contacts,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn get(&self, key: KademliaId) -> Result<Option<Value>, DhtError> {
        let (tx_value, rx) = oneshot::channel();
        self.tx.send(Command::LookupData { key, tx_value }).await?;
        Ok(rx.await?)
    }

    pub async fn dump_routing_table(&self) -> Result<Vec<BucketDump>, DhtError> {
        let (tx_dump, rx) = oneshot::channel();
        self.tx.send(Command::DumpRoutingTable { tx_dump }).await?;
        Ok(rx.await?)
    }
}
