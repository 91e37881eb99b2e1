use super::bucket::{Bucket, InsertResult};
use super::contact::Contact;
use super::identifier::KademliaId;
use super::NUM_BUCKETS;

/// One k-bucket per possible common-prefix length with the local id.
///
/// Bucket `i` holds the contacts whose id shares exactly `i` leading bits with
/// `me`, i.e. the index is the number of leading zeros of the XOR distance.
/// The local node never appears in any bucket.
#[derive(Debug)]
pub struct RoutingTable {
    me: Contact,
    k: usize,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    pub fn new(me: Contact, k: usize) -> Self {
        Self {
            me,
            k,
            buckets: (0..NUM_BUCKETS).map(|_| Bucket::new(k)).collect(),
        }
    }

    pub fn me(&self) -> &Contact {
        &self.me
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Bucket slot for `id`, or None for our own id.
    pub fn bucket_index(&self, id: &KademliaId) -> Option<usize> {
        let distance = self.me.id.distance(id);
        if distance.is_zero() {
            None
        } else {
            Some(distance.leading_zeros() as usize)
        }
    }

    pub fn add_contact(&mut self, contact: Contact) -> InsertResult {
        match self.bucket_index(&contact.id) {
            Some(index) => self.buckets[index].add_contact(contact),
            None => InsertResult::Ignored,
        }
    }

    pub fn remove_contact(&mut self, id: &KademliaId) -> bool {
        match self.bucket_index(id) {
            Some(index) => self.buckets[index].remove_contact(id),
            None => false,
        }
    }

    /// Apply the outcome of a liveness probe of a full bucket's LRU contact.
    /// Alive: the LRU is refreshed and the newcomer discarded.
    /// Dead: the LRU is evicted and the newcomer takes its place.
    pub fn resolve_probe(
        &mut self,
        lru: &Contact,
        candidate: Option<Contact>,
        alive: bool,
    ) -> InsertResult {
        let Some(index) = self.bucket_index(&lru.id) else {
            return InsertResult::Ignored;
        };
        if alive {
            self.buckets[index].refresh(&lru.id);
            return InsertResult::AlreadyPresent;
        }
        self.buckets[index].remove_contact(&lru.id);
        match candidate {
            Some(candidate) => self.add_contact(candidate),
            None => InsertResult::Ignored,
        }
    }

    pub fn find(&self, id: &KademliaId) -> Option<&Contact> {
        self.bucket_index(id)
            .and_then(|index| self.buckets[index].find(id))
    }

    pub fn contains(&self, id: &KademliaId) -> bool {
        self.find(id).is_some()
    }

    /// Total number of contacts across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// Non-empty buckets with their index, nearest prefix class last.
    pub fn occupied_buckets(&self) -> impl Iterator<Item = (usize, &Bucket)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
    }

    /// Given a target, return up to `count` known contacts sorted by ascending
    /// XOR distance to it.
    /// Note: we gather from every bucket, since the target's own bucket may be sparse.
    pub fn find_closest_contacts(&self, target: &KademliaId, count: usize) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.contacts_with_distance(target))
            .collect();
        contacts.sort_by_key(|c| c.id.distance(target));
        contacts.truncate(count);
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{contact_from_hex, make_contact};

    fn table() -> RoutingTable {
        RoutingTable::new(
            contact_from_hex("FFFFFFFF00000000000000000000000000000000", 8000),
            20,
        )
    }

    #[test]
    fn bucket_index_is_common_prefix_length() {
        let rt = table();
        let id = |hex: &str| KademliaId::from_hex(hex).unwrap();
        let same_first_bit = id("F000000000000000000000000000000000000000");
        let other_half = id("0FFFFFFF00000000000000000000000000000000");
        let last_bit = id("FFFFFFFF00000000000000000000000000000001");
        assert_eq!(rt.bucket_index(&other_half), Some(0));
        assert_eq!(rt.bucket_index(&same_first_bit), Some(4));
        assert_eq!(rt.bucket_index(&last_bit), Some(159));
        assert_eq!(rt.bucket_index(&rt.me().id), None);
    }

    #[test]
    fn add_contact_ignores_self() {
        let mut rt = table();
        let me = rt.me().clone();
        assert_eq!(rt.add_contact(me.clone()), InsertResult::Ignored);
        assert!(rt.is_empty());
        assert!(!rt.contains(&me.id));
    }

    #[test]
    fn add_and_remove() {
        let mut rt = table();
        let c1 = contact_from_hex("FFFFFFFF00000000000000000000000000000001", 8001);
        let c2 = contact_from_hex("1111111100000000000000000000000000000001", 8002);
        assert!(!rt.add_contact(c1.clone()).is_full());
        assert!(!rt.add_contact(c2.clone()).is_full());
        assert_eq!(rt.len(), 2);

        assert!(rt.remove_contact(&c1.id));
        assert!(rt.find_closest_contacts(&c1.id, 1).iter().all(|c| c.id != c1.id));
        assert!(rt.contains(&c2.id));
    }

    #[test]
    fn find_closest_contacts_sorted_across_buckets() {
        let mut rt = table();
        for (hex, port) in [
            ("FFFFFFFF00000000000000000000000000000001", 8001),
            ("1111111100000000000000000000000000000001", 8002),
            ("1111111200000000000000000000000000000002", 8003),
            ("1111111300000000000000000000000000000003", 8004),
            ("1111111400000000000000000000000000000004", 8005),
            ("1111111500000000000000000000000000000005", 8006),
        ] {
            rt.add_contact(contact_from_hex(hex, port));
        }

        let target = KademliaId::from_hex("1111111600000000000000000000000000000006").unwrap();
        let closest = rt.find_closest_contacts(&target, 3);
        let ports: Vec<u16> = closest.iter().map(|c| c.address.port()).collect();
        assert_eq!(ports, vec![8005, 8006, 8003]);

        for pair in closest.windows(2) {
            assert!(pair[0].less(&pair[1]));
        }
    }

    #[test]
    fn find_closest_contacts_bounded_by_known() {
        let mut rt = table();
        assert!(rt.find_closest_contacts(&KademliaId::random(), 5).is_empty());

        rt.add_contact(make_contact(0x01, 8001));
        rt.add_contact(make_contact(0x02, 8002));
        let target = KademliaId::random();
        assert_eq!(rt.find_closest_contacts(&target, 5).len(), 2);
        assert_eq!(rt.find_closest_contacts(&target, 1).len(), 1);
        assert_eq!(rt.find_closest_contacts(&target, 0).len(), 0);
    }

    #[test]
    fn resolve_probe_keeps_live_lru_or_admits_candidate() {
        let me = contact_from_hex("0000000000000000000000000000000000000000", 8000);
        let k = 3;

        for alive in [true, false] {
            let mut rt = RoutingTable::new(me.clone(), k);
            // all of these share bucket 0 (top bit set)
            for i in 0..k as u8 {
                rt.add_contact(make_contact(0x80 | i, 8001 + i as u16));
            }
            let newcomer = make_contact(0xF0, 8100);
            let result = rt.add_contact(newcomer.clone());
            let lru = result.eviction_candidate().cloned().unwrap();
            assert_eq!(lru, make_contact(0x80, 8001));

            rt.resolve_probe(&lru, Some(newcomer.clone()), alive);
            assert_eq!(rt.len(), k);
            assert_eq!(rt.contains(&lru.id), alive);
            assert_eq!(rt.contains(&newcomer.id), !alive);
        }
    }
}
