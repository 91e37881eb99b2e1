use std::collections::VecDeque;

use super::contact::Contact;
use super::identifier::KademliaId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Normal insertion at the front.
    Inserted,
    /// Same id and address, moved to the front.
    AlreadyPresent,
    /// The id existed with a different address.
    Updated,
    /// Bucket is full; the lru is handed back for a liveness probe.
    Full { lru: Contact },
    /// The local node itself.
    Ignored,
}

impl InsertResult {
    pub fn is_full(&self) -> bool {
        matches!(self, InsertResult::Full { .. })
    }

    /// The least-recently-seen contact a caller should probe before evicting.
    pub fn eviction_candidate(&self) -> Option<&Contact> {
        match self {
            InsertResult::Full { lru } => Some(lru),
            _ => None,
        }
    }
}

/// Contacts sharing one prefix-length class with the local node.
/// Most recently seen at the front, LRU at the back.
#[derive(Debug, Clone)]
pub struct Bucket {
    k: usize,
    contacts: VecDeque<Contact>,
}

impl Bucket {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            contacts: VecDeque::with_capacity(k),
        }
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.k
    }

    /// Insert or refresh a contact.
    /// A known id moves to the front (taking the new address if it changed).
    /// An unknown id goes to the front if there is room; otherwise nothing is
    /// inserted and the back of the list is returned as the eviction candidate.
    pub fn add_contact(&mut self, contact: Contact) -> InsertResult {
        let known = self
            .position(&contact.id)
            .and_then(|pos| self.contacts.remove(pos));
        if let Some(mut existing) = known {
            let result = if existing.address == contact.address {
                InsertResult::AlreadyPresent
            } else {
                existing.address = contact.address;
                InsertResult::Updated
            };
            self.contacts.push_front(existing);
            result
        } else if self.is_full() {
            match self.contacts.back() {
                Some(lru) => InsertResult::Full { lru: lru.clone() },
                // k == 0 buckets never hold anything
                None => InsertResult::Ignored,
            }
        } else {
            self.contacts.push_front(contact);
            InsertResult::Inserted
        }
    }

    /// Move a known contact to the front without touching its address.
    pub fn refresh(&mut self, id: &KademliaId) -> bool {
        match self.position(id).and_then(|pos| self.contacts.remove(pos)) {
            Some(contact) => {
                self.contacts.push_front(contact);
                true
            }
            None => false,
        }
    }

    /// Remove by id. Returns whether the contact was present.
    pub fn remove_contact(&mut self, id: &KademliaId) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.contacts.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: &KademliaId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == *id)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    /// Copies of every member with the distance to `target` filled in.
    /// The stored contacts are left untouched.
    pub fn contacts_with_distance(&self, target: &KademliaId) -> Vec<Contact> {
        self.contacts
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.calc_distance(target);
                c
            })
            .collect()
    }

    fn position(&self, id: &KademliaId) -> Option<usize> {
        self.contacts.iter().position(|c| c.id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_contact;
    use std::collections::HashSet;

    #[test]
    fn new_contacts_go_to_the_front() {
        let mut bucket = Bucket::new(3);
        assert_eq!(
            bucket.add_contact(make_contact(1, 8001)),
            InsertResult::Inserted
        );
        assert_eq!(
            bucket.add_contact(make_contact(2, 8002)),
            InsertResult::Inserted
        );
        let order: Vec<_> = bucket.contacts().map(|c| c.address.port()).collect();
        assert_eq!(order, vec![8002, 8001]);
    }

    #[test]
    fn sighting_moves_to_front_and_updates_address() {
        let mut bucket = Bucket::new(3);
        bucket.add_contact(make_contact(1, 8001));
        bucket.add_contact(make_contact(2, 8002));

        assert_eq!(
            bucket.add_contact(make_contact(1, 8001)),
            InsertResult::AlreadyPresent
        );
        assert_eq!(bucket.contacts().next().unwrap().address.port(), 8001);

        assert_eq!(
            bucket.add_contact(make_contact(2, 9002)),
            InsertResult::Updated
        );
        let front = bucket.contacts().next().unwrap();
        assert_eq!(front.address.port(), 9002);
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn full_bucket_returns_lru_without_growing() {
        let k = 4;
        let mut bucket = Bucket::new(k);
        for i in 1..=k as u8 {
            bucket.add_contact(make_contact(i, 8000 + i as u16));
        }
        let oldest = make_contact(1, 8001);

        let result = bucket.add_contact(make_contact(0x50, 8050));
        assert!(result.is_full());
        assert_eq!(result.eviction_candidate(), Some(&oldest));
        assert_eq!(bucket.len(), k);
        assert!(bucket.find(&make_contact(0x50, 8050).id).is_none());
    }

    #[test]
    fn never_exceeds_k_or_duplicates_ids() {
        let k = 5;
        let mut bucket = Bucket::new(k);
        for round in 0..4u8 {
            for i in 0..12u8 {
                bucket.add_contact(make_contact(i, 7000 + round as u16));
                assert!(bucket.len() <= k);
                let ids: HashSet<_> = bucket.contacts().map(|c| c.id).collect();
                assert_eq!(ids.len(), bucket.len());
            }
        }
    }

    #[test]
    fn remove_and_refresh() {
        let mut bucket = Bucket::new(3);
        let a = make_contact(1, 8001);
        let b = make_contact(2, 8002);
        bucket.add_contact(a.clone());
        bucket.add_contact(b.clone());

        assert!(bucket.refresh(&a.id));
        assert_eq!(bucket.contacts().next(), Some(&a));

        assert!(bucket.remove_contact(&a.id));
        assert!(!bucket.remove_contact(&a.id));
        assert_eq!(bucket.len(), 1);
        assert!(!bucket.refresh(&a.id));
    }

    #[test]
    fn distances_are_computed_on_read() {
        let mut bucket = Bucket::new(3);
        bucket.add_contact(make_contact(1, 8001));
        let target = KademliaId::random();
        let with = bucket.contacts_with_distance(&target);
        assert!(with[0].distance().is_some());
        assert!(bucket.contacts().all(|c| c.distance().is_none()));
    }
}
