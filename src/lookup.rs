use std::collections::HashSet;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::core::contact::Contact;
use crate::core::identifier::{Distance, KademliaId};
use crate::core::storage::Value;
use crate::protocol::{FindDataReply, RpcClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortlistEntry {
    pub contact: Contact,
    pub distance: Distance,
    pub probed: bool,
}

/// The k closest contacts seen so far in one lookup, sorted by distance to
/// the target.
#[derive(Debug, Clone)]
pub struct Shortlist {
    target: KademliaId,
    me: KademliaId,
    k: usize,
    entries: Vec<ShortlistEntry>,
    // every id probed in this lookup, including ones since pushed out of the top k
    queried: HashSet<KademliaId>,
}

impl Shortlist {
    pub fn new(target: KademliaId, me: KademliaId, k: usize) -> Self {
        Self {
            target,
            me,
            k,
            entries: Vec::with_capacity(k + 1),
            queried: HashSet::new(),
        }
    }

    /// Fold contacts in: known ids get their address updated, new ids are
    /// inserted, then the list is re-sorted and cut back to k.
    pub fn merge<I: IntoIterator<Item = Contact>>(&mut self, contacts: I) {
        for mut contact in contacts {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.contact.id == contact.id)
            {
                entry.contact.address = contact.address;
                continue;
            }
            contact.calc_distance(&self.target);
            // the local node is listed but never probed
            let probed = contact.id == self.me || self.queried.contains(&contact.id);
            self.entries.push(ShortlistEntry {
                distance: contact.id.distance(&self.target),
                contact,
                probed,
            });
        }
        self.entries.sort_by_key(|e| e.distance);
        self.entries.truncate(self.k);
    }

    /// Up to `count` unprobed contacts, closest first.
    pub fn unprobed(&self, count: usize) -> Vec<Contact> {
        self.entries
            .iter()
            .filter(|e| !e.probed)
            .take(count)
            .map(|e| e.contact.clone())
            .collect()
    }

    pub fn mark_probed<'a, I: IntoIterator<Item = &'a KademliaId>>(&mut self, ids: I) {
        for id in ids {
            self.queried.insert(*id);
            if let Some(entry) = self.entries.iter_mut().find(|e| e.contact.id == *id) {
                entry.probed = true;
            }
        }
    }

    pub fn closest(&self) -> Option<KademliaId> {
        self.entries.first().map(|e| e.contact.id)
    }

    pub fn probed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.probed).count()
    }

    pub fn has_unprobed(&self) -> bool {
        self.entries.iter().any(|e| !e.probed)
    }

    pub fn entries(&self) -> &[ShortlistEntry] {
        &self.entries
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.entries.iter().map(|e| e.contact.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Converging,
    FinalSweep,
    Done,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Probe(Vec<Contact>),
    Done,
}

/// One peer's answer to a lookup probe. Errors and timeouts collapse to
/// `Failed`, which contributes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReply {
    Contacts(Vec<Contact>),
    Data(Value),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHit {
    pub contact: Contact,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutcome {
    pub contacts: Vec<Contact>,
    pub found: Option<DataHit>,
}

/// Iterative lookup as a state machine, free of any I/O.
///
/// The driver calls [`Lookup::start`], probes the returned batch, feeds each
/// reply to [`Lookup::absorb`] and then asks [`Lookup::end_round`] for the
/// next batch. Progress means the closest shortlist entry changed. Once a
/// round makes no progress, every remaining unprobed entry of the k closest
/// is probed in one last sweep. If that sweep still brings nothing closer
/// the lookup is done.
///
/// Every round marks at least one id as queried and ids are never probed
/// twice, so a lookup over a finite network always ends.
#[derive(Debug, Clone)]
pub struct Lookup {
    target: KademliaId,
    k: usize,
    alpha: usize,
    shortlist: Shortlist,
    closest: Option<KademliaId>,
    phase: Phase,
    rounds: usize,
}

impl Lookup {
    pub fn new(
        me: KademliaId,
        target: KademliaId,
        k: usize,
        alpha: usize,
        seed: Vec<Contact>,
    ) -> Self {
        let mut shortlist = Shortlist::new(target, me, k);
        shortlist.merge(seed);
        let closest = shortlist.closest();
        Self {
            target,
            k,
            alpha,
            shortlist,
            closest,
            phase: Phase::Converging,
            rounds: 0,
        }
    }

    pub fn shortlist(&self) -> &Shortlist {
        &self.shortlist
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn start(&mut self) -> Step {
        self.next_batch(self.alpha)
    }

    /// Take in one reply. Returns the hit if the peer had the data.
    pub fn absorb(&mut self, from: &Contact, reply: ProbeReply) -> Option<DataHit> {
        match reply {
            ProbeReply::Contacts(contacts) => {
                trace!(
                    peer = %from.id.short_hex(),
                    learned = contacts.len(),
                    "Merging probe reply"
                );
                self.shortlist.merge(contacts);
                None
            }
            ProbeReply::Data(value) => Some(DataHit {
                contact: from.clone(),
                value,
            }),
            ProbeReply::Failed => None,
        }
    }

    /// Close the round that probed `batch` and decide the next step.
    pub fn end_round(&mut self, batch: &[Contact]) -> Step {
        self.shortlist.mark_probed(batch.iter().map(|c| &c.id));

        let closest = self.shortlist.closest();
        if closest != self.closest {
            self.closest = closest;
            self.phase = Phase::Converging;
            return self.next_batch(self.alpha);
        }

        match self.phase {
            Phase::Converging
                if self.shortlist.probed_count() < self.k && self.shortlist.has_unprobed() =>
            {
                debug!(
                    target_id = %self.target.short_hex(),
                    round = self.rounds,
                    "No closer contact; sweeping the remaining unprobed contacts"
                );
                self.phase = Phase::FinalSweep;
                self.next_batch(self.k)
            }
            _ => self.done(),
        }
    }

    pub fn finish(self, found: Option<DataHit>) -> LookupOutcome {
        LookupOutcome {
            contacts: self.shortlist.contacts(),
            found,
        }
    }

    fn next_batch(&mut self, count: usize) -> Step {
        let batch = self.shortlist.unprobed(count);
        if batch.is_empty() {
            return self.done();
        }
        self.rounds += 1;
        Step::Probe(batch)
    }

    fn done(&mut self) -> Step {
        self.phase = Phase::Done;
        Step::Done
    }
}

/// Send one lookup probe to `peer`: FIND_DATA when a content hash is set,
/// FIND_NODE otherwise. Never waits longer than `wait`.
///
/// Data that does not hash to the requested key is treated as a failed probe.
pub async fn probe<R: RpcClient + ?Sized>(
    rpc: &R,
    peer: &Contact,
    target: KademliaId,
    content_hash: Option<KademliaId>,
    wait: Duration,
) -> ProbeReply {
    let reply = match content_hash {
        None => timeout(wait, rpc.find_node(peer, target))
            .await
            .map(|r| r.map(ProbeReply::Contacts)),
        Some(key) => timeout(wait, rpc.find_data(peer, key)).await.map(|r| {
            r.map(|reply| match reply {
                FindDataReply::Data(value) => ProbeReply::Data(value),
                FindDataReply::Contacts(contacts) => ProbeReply::Contacts(contacts),
            })
        }),
    };
    match reply {
        Ok(Ok(ProbeReply::Data(value)))
            if content_hash.is_some_and(|key| KademliaId::from_hashed(&value) != key) =>
        {
            warn!(
                event = "forged_value",
                peer = %peer.address,
                "Peer returned data that does not match the requested key"
            );
            ProbeReply::Failed
        }
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            debug!(event = "probe_failed", peer = %peer.address, error = %e, "Probe failed");
            ProbeReply::Failed
        }
        Err(_) => {
            debug!(event = "probe_timeout", peer = %peer.address, "Probe timed out");
            ProbeReply::Failed
        }
    }
}
