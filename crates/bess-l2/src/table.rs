//! The cuckoo table itself: bucket layout, hashing, and the
//! insert/lookup/delete/flush control surface, spec §4.3.

use bess_core::{Error, ErrorKind};

use crate::entry::Entry;
use crate::simd;

/// Number of entries per bucket. The SIMD bucket compare only kicks in at
/// width 4; widths 1 and 2 always take the scalar path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketWidth {
    One = 1,
    Two = 2,
    Four = 4,
}

impl BucketWidth {
    fn as_usize(self) -> usize {
        self as usize
    }
}

/// Two-hash cuckoo table over 48-bit MAC addresses.
///
/// `size` is the number of *buckets*, always a power of two; each bucket
/// holds `bucket` entries, so `entries.len() == size * bucket`. A MAC's
/// primary bucket is `hash(mac) & (size - 1)`; its alternate bucket is
/// `primary ^ f(hash)` for some odd-ish mixing of the hash, so that
/// `alt(alt(idx)) == idx` (spec §4.3, "two candidate buckets").
pub struct CuckooTable {
    size: u32,
    size_log2: u32,
    bucket: BucketWidth,
    entries: Vec<Entry>,
    count: u32,
}

const MAX_SIZE_LOG2: u32 = 30;

/// Mixing constant used to derive the alternate bucket from the primary
/// one; grounded on the spec's own `0x5bd1e995` (MurmurHash2's `m`).
const ALT_MIX: u32 = 0x5bd1_e995;

impl CuckooTable {
    /// Creates a table with `size` buckets (must be a power of two, at
    /// most `2^30` per spec §4.3) of width `bucket`.
    pub fn new(size: u32, bucket: BucketWidth) -> Result<Self, Error> {
        if size == 0 || !size.is_power_of_two() {
            return Err(Error::new(
                ErrorKind::InvalidArg,
                "l2 table size must be a nonzero power of two",
            ));
        }
        let size_log2 = size.trailing_zeros();
        if size_log2 > MAX_SIZE_LOG2 {
            return Err(Error::new(ErrorKind::InvalidArg, "l2 table size exceeds 2^30 buckets"));
        }
        let total = size as usize * bucket.as_usize();
        Ok(Self {
            size,
            size_log2,
            bucket,
            entries: vec![Entry::EMPTY; total],
            count: 0,
        })
    }

    /// Number of occupied entries.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn hash(addr: u64) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&addr.to_le_bytes()[..6]);
        hasher.finalize()
    }

    fn primary_idx(&self, hash: u32) -> u32 {
        hash & (self.size - 1)
    }

    /// The alternate bucket for a MAC whose primary bucket is `idx`.
    ///
    /// The mask is `size - 1` (the full bucket range), not `size/2 - 1`: a
    /// half-range mask underflows for a one-bucket table (`size_log2 ==
    /// 0`, spec scenario S1) and needlessly restricts eviction targets to
    /// half the table otherwise.
    fn alt_idx(&self, hash: u32, idx: u32) -> u32 {
        let mix = (hash >> self.size_log2).wrapping_add(1).wrapping_mul(ALT_MIX);
        (idx ^ mix) & (self.size - 1)
    }

    fn bucket_slice(&self, bucket_idx: u32) -> &[Entry] {
        let w = self.bucket.as_usize();
        let start = bucket_idx as usize * w;
        &self.entries[start..start + w]
    }

    fn bucket_slice_mut(&mut self, bucket_idx: u32) -> &mut [Entry] {
        let w = self.bucket.as_usize();
        let start = bucket_idx as usize * w;
        &mut self.entries[start..start + w]
    }

    /// Looks up `mac`'s output gate. Hot path: no allocation, no logging.
    #[must_use]
    pub fn lookup(&self, mac: u64) -> Option<u16> {
        let h = Self::hash(mac);
        let primary = self.primary_idx(h);
        if let Some(i) = simd::find_match(self.bucket_slice(primary), mac) {
            return Some(self.bucket_slice(primary)[i].gate());
        }
        let alt = self.alt_idx(h, primary);
        let i = simd::find_match(self.bucket_slice(alt), mac)?;
        Some(self.bucket_slice(alt)[i].gate())
    }

    /// Inserts `mac -> gate`. Rejects duplicates; tries an empty slot in
    /// either candidate bucket first, then a single level of eviction from
    /// the primary bucket before giving up.
    pub fn insert(&mut self, mac: u64, gate: u16) -> Result<(), Error> {
        let h = Self::hash(mac);
        let primary = self.primary_idx(h);
        let alt = self.alt_idx(h, primary);

        if simd::find_match(self.bucket_slice(primary), mac).is_some()
            || simd::find_match(self.bucket_slice(alt), mac).is_some()
        {
            return Err(Error::new(ErrorKind::AlreadyExists, "mac already present in l2 table"));
        }

        if let Some(slot) = self.bucket_slice_mut(primary).iter_mut().find(|e| !e.is_occupied()) {
            *slot = Entry::new(mac, gate);
            self.count += 1;
            return Ok(());
        }
        if let Some(slot) = self.bucket_slice_mut(alt).iter_mut().find(|e| !e.is_occupied()) {
            *slot = Entry::new(mac, gate);
            self.count += 1;
            return Ok(());
        }

        // One level of eviction: move an occupant of the primary bucket to
        // its own alternate bucket, if that bucket has room.
        let width = self.bucket.as_usize();
        for slot_idx in 0..width {
            let victim = self.bucket_slice(primary)[slot_idx];
            if !victim.is_occupied() {
                continue;
            }
            let victim_hash = Self::hash(victim.addr());
            let victim_primary = self.primary_idx(victim_hash);
            let victim_alt = self.alt_idx(victim_hash, victim_primary);
            // The victim must actually consider `primary` its primary
            // bucket for this move to be reversible by a later lookup.
            let victim_home = if victim_primary == primary { victim_alt } else { victim_primary };
            if let Some(dst) = self.bucket_slice_mut(victim_home).iter_mut().find(|e| !e.is_occupied())
            {
                *dst = victim;
                self.bucket_slice_mut(primary)[slot_idx] = Entry::new(mac, gate);
                self.count += 1;
                return Ok(());
            }
        }

        Err(Error::new(ErrorKind::OutOfMemory, "l2 table full: no eviction path found"))
    }

    /// Removes `mac`. `NotFound` if it isn't present.
    pub fn delete(&mut self, mac: u64) -> Result<(), Error> {
        let h = Self::hash(mac);
        let primary = self.primary_idx(h);
        if let Some(i) = simd::find_match(self.bucket_slice(primary), mac) {
            self.bucket_slice_mut(primary)[i] = Entry::EMPTY;
            self.count -= 1;
            return Ok(());
        }
        let alt = self.alt_idx(h, primary);
        if let Some(i) = simd::find_match(self.bucket_slice(alt), mac) {
            self.bucket_slice_mut(alt)[i] = Entry::EMPTY;
            self.count -= 1;
            return Ok(());
        }
        Err(Error::new(ErrorKind::NotFound, "mac not present in l2 table"))
    }

    /// Clears every entry, keeping the table's allocated size and width.
    pub fn flush(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = Entry::EMPTY);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_single_entry_round_trips() {
        let mut t = CuckooTable::new(4, BucketWidth::Four).unwrap();
        t.insert(0x0000_0000_0001, 7).unwrap();
        assert_eq!(t.lookup(0x0000_0000_0001), Some(7));
        assert_eq!(t.lookup(0x0000_0000_0002), None);
    }

    #[test]
    fn single_bucket_table_does_not_panic_on_alt_idx() {
        // size_log2 == 0: the formula must not underflow shifting/masking.
        let mut t = CuckooTable::new(1, BucketWidth::Four).unwrap();
        t.insert(1, 1).unwrap();
        t.insert(2, 2).unwrap();
        assert_eq!(t.lookup(1), Some(1));
        assert_eq!(t.lookup(2), Some(2));
    }

    #[test]
    fn rejects_duplicate_insert() {
        let mut t = CuckooTable::new(4, BucketWidth::Four).unwrap();
        t.insert(1, 1).unwrap();
        assert!(matches!(t.insert(1, 2), Err(e) if e.kind == ErrorKind::AlreadyExists));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let mut t = CuckooTable::new(4, BucketWidth::Four).unwrap();
        assert!(matches!(t.delete(0xdead), Err(e) if e.kind == ErrorKind::NotFound));
    }

    #[test]
    fn s5_eviction_keeps_both_entries_retrievable() {
        // Bucket width 1 forces every primary collision into eviction.
        let mut t = CuckooTable::new(4, BucketWidth::One).unwrap();
        let mut inserted = Vec::new();
        for mac in 0u64..64 {
            if t.insert(mac, (mac % 16) as u16 + 1).is_ok() {
                inserted.push(mac);
            }
        }
        for mac in &inserted {
            assert_eq!(t.lookup(*mac), Some((*mac % 16) as u16 + 1), "mac {mac} lost after eviction");
        }
    }

    #[test]
    fn flush_clears_everything() {
        let mut t = CuckooTable::new(4, BucketWidth::Four).unwrap();
        t.insert(1, 1).unwrap();
        t.flush();
        assert_eq!(t.len(), 0);
        assert_eq!(t.lookup(1), None);
    }

    #[test]
    fn new_rejects_non_power_of_two_size() {
        assert!(CuckooTable::new(3, BucketWidth::Four).is_err());
    }
}
