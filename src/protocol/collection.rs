//! Ordered packet sets
//!
//! Set-like containers whose membership and order are governed by a single
//! key drawn from the packet, not by full packet equality. Inserting a packet
//! whose key is already present keeps the existing entry.
//!
//! None of these types lock internally. A set written from more than one
//! task must be wrapped by the caller, see [`SharedPacketSet`].

use std::collections::btree_map::{self, BTreeMap, Entry};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::Packet;

/// Extracts the ordering key of a packet
pub trait OrderKey {
    type Key: Ord + Copy + std::fmt::Debug;

    fn key(packet: &Packet) -> Self::Key;
}

/// Orders by the raw 16-bit sequence number
#[derive(Debug, Clone, Copy, Default)]
pub struct BySequence;

impl OrderKey for BySequence {
    type Key = u16;

    fn key(packet: &Packet) -> u16 {
        packet.sequence()
    }
}

/// Orders by local receipt/creation time
#[derive(Debug, Clone, Copy, Default)]
pub struct ByTimestamp;

impl OrderKey for ByTimestamp {
    type Key = SystemTime;

    fn key(packet: &Packet) -> SystemTime {
        packet.timestamp()
    }
}

/// A set of packets ordered by `K`
pub struct PacketSet<K: OrderKey> {
    entries: BTreeMap<K::Key, Packet>,
    _order: PhantomData<K>,
}

/// Per-endpoint record of sent or received packets
pub type SequenceOrdered = PacketSet<BySequence>;

/// Combined log across endpoints
pub type TimestampOrdered = PacketSet<ByTimestamp>;

/// A set guarded for use from several tasks
pub type SharedPacketSet<K> = Arc<Mutex<PacketSet<K>>>;

impl<K: OrderKey> PacketSet<K> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            _order: PhantomData,
        }
    }

    /// Wrap a new, empty set for sharing
    pub fn shared() -> SharedPacketSet<K> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Insert a packet. Returns `false` and keeps the existing entry if a
    /// packet with the same key is already present.
    pub fn insert(&mut self, packet: Packet) -> bool {
        match self.entries.entry(K::key(&packet)) {
            Entry::Vacant(slot) => {
                slot.insert(packet);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&Packet> {
        self.entries.values().next()
    }

    pub fn last(&self) -> Option<&Packet> {
        self.entries.values().next_back()
    }

    /// Remove and return the lowest entry
    pub fn pop_first(&mut self) -> Option<Packet> {
        self.entries.pop_first().map(|(_, packet)| packet)
    }

    /// Remove and return the highest entry
    pub fn pop_last(&mut self) -> Option<Packet> {
        self.entries.pop_last().map(|(_, packet)| packet)
    }

    /// Look up the entry stored under `key`
    pub fn get(&self, key: K::Key) -> Option<&Packet> {
        self.entries.get(&key)
    }

    /// Whether an entry with the same key as `packet` is present
    pub fn contains(&self, packet: &Packet) -> bool {
        self.entries.contains_key(&K::key(packet))
    }

    /// Remove the entry sharing `packet`'s key, whatever its other fields
    pub fn remove(&mut self, packet: &Packet) -> Option<Packet> {
        self.entries.remove(&K::key(packet))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate in ascending key order
    pub fn iter(&self) -> btree_map::Values<'_, K::Key, Packet> {
        self.entries.values()
    }

    pub fn into_vec(self) -> Vec<Packet> {
        self.entries.into_values().collect()
    }
}

impl<K: OrderKey> Default for PacketSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: OrderKey> Clone for PacketSet<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            _order: PhantomData,
        }
    }
}

impl<K: OrderKey> std::fmt::Debug for PacketSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.values()).finish()
    }
}

impl<K: OrderKey> Extend<Packet> for PacketSet<K> {
    fn extend<I: IntoIterator<Item = Packet>>(&mut self, iter: I) {
        for packet in iter {
            self.insert(packet);
        }
    }
}

impl<K: OrderKey> FromIterator<Packet> for PacketSet<K> {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a, K: OrderKey> IntoIterator for &'a PacketSet<K> {
    type Item = &'a Packet;
    type IntoIter = btree_map::Values<'a, K::Key, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, UNIX_EPOCH};

    fn packet(sequence: u16, marker: u8) -> Packet {
        Packet::new(0, 0, sequence, vec![marker], UNIX_EPOCH)
    }

    fn at(sequence: u16, secs: u64) -> Packet {
        Packet::new(0, 0, sequence, Vec::new(), UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn test_sequence_order() {
        let mut set = SequenceOrdered::new();
        set.insert(packet(5, 0));
        set.insert(packet(2, 1));
        set.insert(packet(19, 2));
        set.insert(packet(0, 3));

        assert_eq!(&set.pop_first().unwrap().payload()[..], &[3]);
        assert_eq!(&set.pop_first().unwrap().payload()[..], &[1]);
        assert_eq!(&set.pop_first().unwrap().payload()[..], &[0]);
        assert_eq!(&set.pop_first().unwrap().payload()[..], &[2]);
        assert!(set.pop_first().is_none());
    }

    #[test]
    fn test_iteration_is_ascending() {
        let set: SequenceOrdered = [5, 2, 19, 0].into_iter().map(|s| packet(s, 0)).collect();
        let order: Vec<u16> = set.iter().map(Packet::sequence).collect();
        assert_eq!(order, vec![0, 2, 5, 19]);
    }

    #[test]
    fn test_no_wraparound_ordering() {
        let set: SequenceOrdered = [65535, 0, 1].into_iter().map(|s| packet(s, 0)).collect();
        assert_eq!(set.first().unwrap().sequence(), 0);
        assert_eq!(set.last().unwrap().sequence(), 65535);
    }

    #[test]
    fn test_key_collision_keeps_first() {
        let mut set = SequenceOrdered::new();
        assert!(set.insert(packet(7, 1)));
        assert!(!set.insert(packet(7, 2)));

        assert_eq!(set.len(), 1);
        assert_eq!(&set.get(7).unwrap().payload()[..], &[1]);
        assert!(set.contains(&packet(7, 99)));
    }

    #[test]
    fn test_timestamp_order() {
        let mut log = TimestampOrdered::new();
        log.insert(at(1, 30));
        log.insert(at(1, 10));
        log.insert(at(0, 20));

        let order: Vec<u64> = log
            .iter()
            .map(|p| p.timestamp().duration_since(UNIX_EPOCH).unwrap().as_secs())
            .collect();
        assert_eq!(order, vec![10, 20, 30]);

        // Same instant collides even with different sequences
        assert!(!log.insert(at(9, 20)));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut set = SequenceOrdered::new();
        set.extend([packet(1, 0), packet(2, 0), packet(3, 0)]);

        assert_eq!(set.remove(&packet(2, 42)).map(|p| p.sequence()), Some(2));
        assert!(set.remove(&packet(2, 0)).is_none());
        assert_eq!(set.pop_last().unwrap().sequence(), 3);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_shared_set_across_threads() {
        let log = TimestampOrdered::shared();

        let workers: Vec<_> = (0..4u64)
            .map(|worker| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..25u64 {
                        let packet = at(i as u16, worker * 100 + i);
                        log.lock().unwrap().insert(packet);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 100);
        let times: Vec<SystemTime> = log.iter().map(Packet::timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}
