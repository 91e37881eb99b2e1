use tokio::sync::oneshot;

use crate::core::bucket::InsertResult;
use crate::core::contact::Contact;
use crate::core::identifier::KademliaId;
use crate::core::storage::{StoreStatus, Value};

/// Commands are the only way into the node actor.
///
/// Every task that needs the routing table or the value store (lookups,
/// inbound RPC handlers, the console) holds a [`super::NodeHandle`] which
/// sends one of these into the single actor task. The actor applies them one
/// at a time in arrival order, so multi-step updates such as
/// evict-then-insert never interleave with other work.
///
/// Each variant carries a oneshot for its reply.
#[derive(Debug)]
pub enum Command {
    /// Offer a freshly seen peer to the routing table.
    UpdateRoutingTable {
        contact: Contact,
        tx_admission: oneshot::Sender<Admission>,
    },
    /// Report the result of pinging a full bucket's LRU contact.
    ResolveProbe {
        lru: Contact,
        alive: bool,
        tx_result: oneshot::Sender<InsertResult>,
    },
    RemoveContact {
        id: KademliaId,
        tx_removed: oneshot::Sender<bool>,
    },
    /// Store a value locally under `key`.
    Store {
        key: KademliaId,
        value: Value,
        tx_status: oneshot::Sender<StoreStatus>,
    },
    /// The `count` closest known contacts to `target`.
    LookupContact {
        target: KademliaId,
        count: usize,
        tx_contacts: oneshot::Sender<Vec<Contact>>,
    },
    /// A local read of the value store.
    LookupData {
        key: KademliaId,
        tx_value: oneshot::Sender<Option<Value>>,
    },
    DumpRoutingTable {
        tx_dump: oneshot::Sender<Vec<BucketDump>>,
    },
}

/// What happened when a contact was offered to the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Inserted,
    /// Already known; moved to the front of its bucket.
    Refreshed,
    /// The bucket is full. The caller should ping `lru` and report back with
    /// [`Command::ResolveProbe`].
    ProbeRequired { lru: Contact },
    /// The bucket is full and `lru` is already being probed for another
    /// newcomer. This contact is dropped.
    ProbeInFlight { lru: Contact },
    /// The local node itself.
    Ignored,
}

/// A snapshot of one non-empty bucket, most recently seen first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDump {
    pub index: usize,
    pub contacts: Vec<Contact>,
}
