use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::identifier::{Distance, KademliaId};

/// A peer: an id plus the address it can be reached at.
///
/// `distance` caches the XOR distance to whatever target the contact was last
/// measured against. It is not part of the contact's identity: equality and
/// hashing only look at `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: KademliaId,
    pub address: SocketAddr,
    #[serde(skip)]
    distance: Option<Distance>,
}

impl Contact {
    pub fn new(id: KademliaId, address: SocketAddr) -> Self {
        Self {
            id,
            address,
            distance: None,
        }
    }

    pub fn calc_distance(&mut self, target: &KademliaId) {
        self.distance = Some(self.id.distance(target));
    }

    pub fn distance(&self) -> Option<Distance> {
        self.distance
    }

    /// Compare cached distances. False unless both sides had
    /// [`Contact::calc_distance`] called.
    pub fn less(&self, other: &Contact) -> bool {
        match (self.distance, other.distance) {
            (Some(a), Some(b)) => a.less(&b),
            _ => false,
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
