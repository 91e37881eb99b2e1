use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::core::bucket::InsertResult;
use crate::core::contact::Contact;
use crate::core::identifier::KademliaId;
use crate::core::storage::{StoreStatus, Value};
use crate::error::DhtError;
use crate::lookup::{probe, Lookup, LookupOutcome, ProbeReply, Step};
use crate::node::{Admission, BucketDump, NodeActor, NodeHandle};
use crate::protocol::{Request, Response, RpcClient};

/// Result of [`KademliaDht::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutcome {
    pub value: Option<Value>,
    /// Who answered with the value. The local node for a local hit.
    pub found_on: Option<Contact>,
    /// The lookup's shortlist. Empty when the value was held locally.
    pub contacts: Vec<Contact>,
}

/// Result of [`KademliaDht::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    pub key: KademliaId,
    /// Outcome of the local store.
    pub status: StoreStatus,
    /// Remote contacts a replica was sent to.
    pub attempted: usize,
    /// Remote contacts that confirmed they hold the value.
    pub replicated: usize,
}

impl StoreReceipt {
    /// More than half of the replicas landed, or there was no one to ask and
    /// the value is held locally.
    pub fn is_success(&self) -> bool {
        if self.attempted == 0 {
            return self.status != StoreStatus::Conflict;
        }
        self.replicated * 2 > self.attempted
    }
}

/// The node's public face: lookups, get and store, contact admission and
/// inbound request handling, all on top of one [`NodeActor`] and an
/// [`RpcClient`].
pub struct KademliaDht<R: RpcClient> {
    me: Contact,
    node: NodeHandle,
    rpc: Arc<R>,
    config: NodeConfig,
}

impl<R: RpcClient> Clone for KademliaDht<R> {
    fn clone(&self) -> Self {
        Self {
            me: self.me.clone(),
            node: self.node.clone(),
            rpc: Arc::clone(&self.rpc),
            config: self.config.clone(),
        }
    }
}

impl<R: RpcClient> KademliaDht<R> {
    /// Validate `config` and spawn the node actor. Must be called from within
    /// a tokio runtime.
    pub fn start(me: Contact, rpc: Arc<R>, config: NodeConfig) -> Result<Self, DhtError> {
        config.validate()?;
        let node = NodeActor::spawn(me.clone(), config.k, config.command_buffer);
        info!(me = %me.id, addr = %me.address, k = config.k, alpha = config.alpha, "DHT started");
        Ok(Self {
            me,
            node,
            rpc,
            config,
        })
    }

    pub fn me(&self) -> &Contact {
        &self.me
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    /// Offer a peer to the routing table. When its bucket is full the LRU
    /// contact is pinged first and this call waits for the outcome.
    ///
    /// The ping runs on its own task, so dropping this future does not leave
    /// the LRU marked as being probed.
    pub async fn admit_contact(&self, contact: Contact) -> Result<Admission, DhtError> {
        let admission = self.node.update_routing_table(contact).await?;
        if let Admission::ProbeRequired { lru } = &admission {
            let dht = self.clone();
            let lru = lru.clone();
            match tokio::spawn(async move { dht.probe_and_resolve(lru).await }).await {
                Ok(resolved) => {
                    resolved?;
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                // the runtime is shutting down
                Err(_) => return Err(DhtError::ChannelClosed),
            }
        }
        Ok(admission)
    }

    /// Like [`Self::admit_contact`] but any liveness probe runs in the
    /// background. Used on the hot paths where a peer was just heard from.
    pub async fn observe_contact(&self, contact: Contact) -> Result<Admission, DhtError> {
        let admission = self.node.update_routing_table(contact).await?;
        if let Admission::ProbeRequired { lru } = &admission {
            let dht = self.clone();
            let lru = lru.clone();
            tokio::spawn(async move {
                if let Err(e) = dht.probe_and_resolve(lru).await {
                    warn!(error = %e, "Could not resolve liveness probe");
                }
            });
        }
        Ok(admission)
    }

    async fn probe_and_resolve(&self, lru: Contact) -> Result<InsertResult, DhtError> {
        let alive = matches!(
            timeout(self.config.rpc_timeout, self.rpc.ping(&lru)).await,
            Ok(Ok(()))
        );
        debug!(
            event = "lru_probe",
            lru = %lru.id.short_hex(),
            addr = %lru.address,
            alive,
            "Pinged LRU contact"
        );
        self.node.resolve_probe(lru, alive).await
    }

    /// Iterative lookup for `target`. With a `content_hash` peers are asked
    /// for the data and the first one to return it ends the lookup.
    ///
    /// Peer failures are absorbed; this only errors when the node actor is
    /// gone.
    pub async fn node_lookup(
        &self,
        target: KademliaId,
        content_hash: Option<KademliaId>,
    ) -> Result<LookupOutcome, DhtError> {
        let seed = self.node.closest(target, self.config.alpha).await?;
        let mut lookup = Lookup::new(self.me.id, target, self.config.k, self.config.alpha, seed);

        let mut step = lookup.start();
        while let Step::Probe(batch) = step {
            trace!(
                target_id = %target.short_hex(),
                round = lookup.rounds(),
                peers = batch.len(),
                "Lookup round"
            );
            let mut replies: FuturesUnordered<_> = batch
                .iter()
                .map(|peer| async move {
                    let reply = probe(
                        self.rpc.as_ref(),
                        peer,
                        target,
                        content_hash,
                        self.config.rpc_timeout,
                    )
                    .await;
                    (peer, reply)
                })
                .collect();

            while let Some((peer, reply)) = replies.next().await {
                if reply != ProbeReply::Failed {
                    self.observe_contact(peer.clone()).await?;
                }
                if let Some(hit) = lookup.absorb(peer, reply) {
                    info!(
                        event = "data_found",
                        key = %target.short_hex(),
                        on = %hit.contact.id.short_hex(),
                        "Found value during lookup"
                    );
                    // dropping `replies` abandons the rest of the round
                    return Ok(lookup.finish(Some(hit)));
                }
            }
            step = lookup.end_round(&batch);
        }

        debug!(
            target_id = %target.short_hex(),
            rounds = lookup.rounds(),
            found = lookup.shortlist().len(),
            "Lookup finished"
        );
        Ok(lookup.finish(None))
    }

    /// The k closest contacts to `target` the network knows of.
    pub async fn lookup_contact(&self, target: KademliaId) -> Result<Vec<Contact>, DhtError> {
        let outcome = self.node_lookup(target, None).await?;
        if outcome.contacts.is_empty() {
            return Err(DhtError::NoContactsFound(target));
        }
        Ok(outcome.contacts)
    }

    pub async fn get(&self, key: KademliaId) -> Result<GetOutcome, DhtError> {
        if let Some(value) = self.node.get(key).await? {
            return Ok(GetOutcome {
                value: Some(value),
                found_on: Some(self.me.clone()),
                contacts: Vec::new(),
            });
        }

        let outcome = self.node_lookup(key, Some(key)).await?;
        Ok(match outcome.found {
            Some(hit) => GetOutcome {
                value: Some(hit.value),
                found_on: Some(hit.contact),
                contacts: outcome.contacts,
            },
            None => GetOutcome {
                value: None,
                found_on: None,
                contacts: outcome.contacts,
            },
        })
    }

    /// Store `payload` under its SHA-1 locally and on the k closest remote
    /// contacts to that hash.
    ///
    /// Storing a payload the node already holds is a no-op: no lookup and no
    /// replication.
    pub async fn store(&self, payload: Value) -> Result<StoreReceipt, DhtError> {
        let key = KademliaId::from_hashed(&payload);
        let status = self.node.store(key, payload.clone()).await?;
        if status != StoreStatus::Stored {
            info!(key = %key, ?status, "Value not replicated");
            return Ok(StoreReceipt {
                key,
                status,
                attempted: 0,
                replicated: 0,
            });
        }

        let outcome = self.node_lookup(key, None).await?;
        let targets: Vec<Contact> = outcome
            .contacts
            .into_iter()
            .filter(|c| c.id != self.me.id)
            .collect();

        let results = join_all(targets.iter().map(|peer| {
            let value = payload.clone();
            async move { timeout(self.config.rpc_timeout, self.rpc.store(peer, key, value)).await }
        }))
        .await;

        let mut replicated = 0;
        for (peer, result) in targets.iter().zip(results) {
            match result {
                Ok(Ok(StoreStatus::Stored | StoreStatus::Duplicate)) => replicated += 1,
                Ok(Ok(StoreStatus::Conflict)) => {
                    warn!(
                        peer = %peer.address,
                        key = %key.short_hex(),
                        "Peer holds a different value for this key"
                    )
                }
                Ok(Err(e)) => debug!(peer = %peer.address, error = %e, "Replica store failed"),
                Err(_) => debug!(peer = %peer.address, "Replica store timed out"),
            }
        }

        info!(key = %key, replicated, attempted = targets.len(), "Stored value");
        Ok(StoreReceipt {
            key,
            status,
            attempted: targets.len(),
            replicated,
        })
    }

    /// Answer one inbound request from `from`. The sender is admitted to the
    /// routing table first since it evidently is alive.
    pub async fn handle_request(
        &self,
        from: Contact,
        request: Request,
    ) -> Result<Response, DhtError> {
        let requester = from.id;
        self.observe_contact(from).await?;

        let response = match request {
            Request::Ping => Response::Pong,
            Request::FindNode { target } => Response::Nodes {
                contacts: self.closest_excluding(target, requester).await?,
            },
            Request::FindData { key } => match self.node.get(key).await? {
                Some(value) => Response::Data { value },
                None => Response::Nodes {
                    contacts: self.closest_excluding(key, requester).await?,
                },
            },
            Request::Store { key, value } if KademliaId::from_hashed(&value) != key => {
                warn!(
                    event = "forged_store",
                    peer = %requester.short_hex(),
                    key = %key.short_hex(),
                    "Refusing a value that does not hash to its key"
                );
                Response::Stored {
                    status: StoreStatus::Conflict,
                }
            }
            Request::Store { key, value } => Response::Stored {
                status: self.node.store(key, value).await?,
            },
        };
        Ok(response)
    }

    async fn closest_excluding(
        &self,
        target: KademliaId,
        excluded: KademliaId,
    ) -> Result<Vec<Contact>, DhtError> {
        let mut contacts = self.node.closest(target, self.config.k + 1).await?;
        contacts.retain(|c| c.id != excluded);
        contacts.truncate(self.config.k);
        Ok(contacts)
    }

    /// Join the network through `seed`: admit it, then look up our own id so
    /// the peers near us learn about us and we about them.
    pub async fn bootstrap(&self, seed: Contact) -> Result<Vec<Contact>, DhtError> {
        info!(
            event = "bootstrap",
            seed = %seed.id.short_hex(),
            addr = %seed.address,
            "Joining network"
        );
        self.admit_contact(seed).await?;
        let outcome = self.node_lookup(self.me.id, None).await?;
        Ok(outcome
            .contacts
            .into_iter()
            .filter(|c| c.id != self.me.id)
            .collect())
    }

    pub async fn dump_routing_table(&self) -> Result<Vec<BucketDump>, DhtError> {
        self.node.dump_routing_table().await
    }
}
