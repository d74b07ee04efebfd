//! DIR-24-8 IPv4 longest-prefix-match table, spec §4.4.
//!
//! `tbl24` is a flat, densely-indexed array of `2^24` entries covering
//! every possible top-24-bit prefix; prefixes longer than `/24` overflow
//! into one of `number_tbl8s` 256-entry `tbl8` groups. A lookup is exactly
//! one or two array reads, no hashing, so it is cheap enough to call once
//! per packet from the IP lookup forwarder module (spec §4.5).
//!
//! Table mutation (`add`/`delete`) is control-plane only: each call walks
//! only the `tbl24`/`tbl8` range the changed prefix covers and
//! re-derives it from the surviving rule set, so the cost is proportional
//! to the prefix's specificity, not to the whole table.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::collections::HashMap;

use bess_core::{Error, ErrorKind};

const TBL8_BIT: u32 = 1 << 31;
const VALID_BIT: u32 = 1 << 30;

/// Default rule-count ceiling, matching the module default of spec §4.5.
pub const DEFAULT_MAX_RULES: u32 = 1024;
/// Default `tbl8` group pool size.
pub const DEFAULT_NUMBER_TBL8S: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tbl24Entry(u32);

impl Tbl24Entry {
    const EMPTY: Tbl24Entry = Tbl24Entry(0);

    fn direct(next_hop: u16, len: u8) -> Self {
        Tbl24Entry(VALID_BIT | (u32::from(len) << 16) | u32::from(next_hop))
    }

    fn tbl8(pool_idx: usize) -> Self {
        Tbl24Entry(TBL8_BIT | pool_idx as u32)
    }

    fn is_tbl8(self) -> bool {
        self.0 & TBL8_BIT != 0
    }

    fn is_valid(self) -> bool {
        self.0 & VALID_BIT != 0
    }

    fn pool_idx(self) -> usize {
        (self.0 & !TBL8_BIT) as usize
    }

    fn next_hop(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    fn len(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }
}

#[derive(Debug, Clone)]
struct Tbl8Group {
    base_len: u8,
    base_next_hop: Option<u16>,
    entry_len: [u8; 256],
    entry_val: [Option<u16>; 256],
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    prefix: u32,
    len: u8,
    next_hop: u16,
}

/// Snapshot of table occupancy, surfaced through the owning module's
/// `get_desc()` the way the original's `ip_lookup.cc` reports lookup
/// table stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpmStats {
    pub rules: usize,
    pub max_rules: u32,
    pub tbl8_groups_used: usize,
    pub tbl8_groups_total: usize,
}

fn netmask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        !0u32 << (32 - u32::from(len))
    }
}

/// A DIR-24-8 table bounded by `max_rules` rules and `number_tbl8s`
/// `tbl8` groups.
pub struct LpmTable {
    max_rules: u32,
    tbl24: Vec<Tbl24Entry>,
    groups: Vec<Option<Tbl8Group>>,
    group_index_of: HashMap<u32, usize>,
    free_groups: Vec<usize>,
    rules: Vec<Rule>,
    default_next_hop: Option<u16>,
}

impl LpmTable {
    /// Allocates a table with `max_rules` rule capacity and
    /// `number_tbl8s` `tbl8` groups.
    #[must_use]
    pub fn new(max_rules: u32, number_tbl8s: u32) -> Self {
        Self {
            max_rules,
            tbl24: vec![Tbl24Entry::EMPTY; 1 << 24],
            groups: vec![None; number_tbl8s as usize],
            group_index_of: HashMap::new(),
            free_groups: (0..number_tbl8s as usize).rev().collect(),
            rules: Vec::new(),
            default_next_hop: None,
        }
    }

    /// A table sized per [`DEFAULT_MAX_RULES`] / [`DEFAULT_NUMBER_TBL8S`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S)
    }

    #[must_use]
    pub fn stats(&self) -> LpmStats {
        LpmStats {
            rules: self.rules.len(),
            max_rules: self.max_rules,
            tbl8_groups_used: self.groups.len() - self.free_groups.len(),
            tbl8_groups_total: self.groups.len(),
        }
    }

    /// Adds `prefix_be/prefix_len -> next_hop`. `prefix_be` is the
    /// address as a raw native load of wire bytes (needs the same
    /// `u32::from_be` conversion `lookup_x4` applies), not a
    /// `u32::from_be_bytes`-assembled value.
    pub fn add(&mut self, prefix_be: u32, prefix_len: u8, next_hop: u16) -> Result<(), Error> {
        if prefix_len > 32 {
            return Err(Error::new(ErrorKind::InvalidArg, "prefix length must be <= 32"));
        }
        let prefix = u32::from_be(prefix_be);
        if prefix_len == 0 {
            self.default_next_hop = Some(next_hop);
            tracing::debug!(next_hop, "lpm::add default route");
            return Ok(());
        }
        let mask = netmask(prefix_len);
        if prefix & !mask != 0 {
            return Err(Error::new(ErrorKind::InvalidArg, "prefix has host bits set"));
        }
        if self.rules.iter().any(|r| r.prefix == prefix && r.len == prefix_len) {
            return Err(Error::new(ErrorKind::AlreadyExists, "prefix already present"));
        }
        if self.rules.len() >= self.max_rules as usize {
            return Err(Error::new(ErrorKind::OutOfMemory, "lpm table rule limit reached"));
        }
        self.apply_rule(prefix, prefix_len, next_hop)?;
        self.rules.push(Rule { prefix, len: prefix_len, next_hop });
        tracing::debug!(prefix, prefix_len, next_hop, "lpm::add");
        Ok(())
    }

    /// Removes `prefix_be/prefix_len`. `NotFound` if it isn't present.
    pub fn delete(&mut self, prefix_be: u32, prefix_len: u8) -> Result<(), Error> {
        if prefix_len > 32 {
            return Err(Error::new(ErrorKind::InvalidArg, "prefix length must be <= 32"));
        }
        let prefix = u32::from_be(prefix_be);
        if prefix_len == 0 {
            return match self.default_next_hop.take() {
                Some(_) => Ok(()),
                None => Err(Error::new(ErrorKind::NotFound, "no default route present")),
            };
        }
        let pos = self
            .rules
            .iter()
            .position(|r| r.prefix == prefix && r.len == prefix_len)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "prefix not present"))?;
        self.rules.remove(pos);
        self.unapply_rule(prefix, prefix_len);
        tracing::debug!(prefix, prefix_len, "lpm::delete");
        Ok(())
    }

    /// Single-address lookup. Hot path: no allocation, no logging.
    #[must_use]
    pub fn lookup(&self, ip_be: u32) -> (bool, u16) {
        let ip = u32::from_be(ip_be);
        let slot = self.tbl24[(ip >> 8) as usize];
        if slot.is_tbl8() {
            let group = self.groups[slot.pool_idx()].as_ref().expect("allocated group");
            let oct = (ip & 0xFF) as usize;
            if let Some(nh) = group.entry_val[oct] {
                return (true, nh);
            }
            if let Some(nh) = group.base_next_hop {
                return (true, nh);
            }
        } else if slot.is_valid() {
            return (true, slot.next_hop());
        }
        match self.default_next_hop {
            Some(nh) => (true, nh),
            None => (false, 0),
        }
    }

    /// 4-wide lookup for a burst's worth of destination addresses; misses
    /// (and an absent default route) fall back to `default_next_hop`.
    #[must_use]
    pub fn lookup_x4(&self, ips_be: [u32; 4], default_next_hop: u16) -> [u16; 4] {
        let mut out = [default_next_hop; 4];
        for (dst, ip_be) in out.iter_mut().zip(ips_be) {
            let (hit, next_hop) = self.lookup(ip_be);
            if hit {
                *dst = next_hop;
            }
        }
        out
    }

    fn group_for(&mut self, group_key: u32) -> Result<usize, Error> {
        if let Some(&idx) = self.group_index_of.get(&group_key) {
            return Ok(idx);
        }
        let pool_idx = self
            .free_groups
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::OutOfMemory, "lpm tbl8 group pool exhausted"))?;
        let slot = self.tbl24[group_key as usize];
        let (base_len, base_next_hop) =
            if slot.is_valid() && !slot.is_tbl8() { (slot.len(), Some(slot.next_hop())) } else { (0, None) };
        self.groups[pool_idx] = Some(Tbl8Group {
            base_len,
            base_next_hop,
            entry_len: [0; 256],
            entry_val: [None; 256],
        });
        self.group_index_of.insert(group_key, pool_idx);
        self.tbl24[group_key as usize] = Tbl24Entry::tbl8(pool_idx);
        Ok(pool_idx)
    }

    fn apply_rule(&mut self, prefix: u32, len: u8, next_hop: u16) -> Result<(), Error> {
        if len <= 24 {
            let start = prefix >> 8;
            let count = 1u32 << (24 - u32::from(len));
            for idx in start..start + count {
                let idx = idx as usize;
                let slot = self.tbl24[idx];
                if slot.is_tbl8() {
                    let group = self.groups[slot.pool_idx()].as_mut().expect("allocated group");
                    if len >= group.base_len {
                        group.base_len = len;
                        group.base_next_hop = Some(next_hop);
                    }
                } else if !slot.is_valid() || len >= slot.len() {
                    self.tbl24[idx] = Tbl24Entry::direct(next_hop, len);
                }
            }
        } else {
            let group_key = prefix >> 8;
            let pool_idx = self.group_for(group_key)?;
            let start = (prefix & 0xFF) as usize;
            let count = 1usize << (8 - u32::from(len - 24));
            let group = self.groups[pool_idx].as_mut().expect("allocated group");
            for oct in start..start + count {
                if len >= group.entry_len[oct] {
                    group.entry_len[oct] = len;
                    group.entry_val[oct] = Some(next_hop);
                }
            }
        }
        Ok(())
    }

    fn unapply_rule(&mut self, prefix: u32, len: u8) {
        if len <= 24 {
            let start = prefix >> 8;
            let count = 1u32 << (24 - u32::from(len));
            for idx in start..start + count {
                self.recompute_tbl24_slot(idx as usize);
            }
        } else {
            let group_key = prefix >> 8;
            if let Some(&pool_idx) = self.group_index_of.get(&group_key) {
                let start = (prefix & 0xFF) as usize;
                let count = 1usize << (8 - u32::from(len - 24));
                for oct in start..start + count {
                    self.recompute_group_octet(pool_idx, group_key, oct);
                }
                self.maybe_free_group(pool_idx, group_key);
            }
        }
    }

    fn recompute_tbl24_slot(&mut self, idx: usize) {
        let addr_hint = (idx as u32) << 8;
        let best = self
            .rules
            .iter()
            .filter(|r| r.len <= 24 && (addr_hint & netmask(r.len)) == r.prefix)
            .max_by_key(|r| r.len);
        let slot = self.tbl24[idx];
        if slot.is_tbl8() {
            let group = self.groups[slot.pool_idx()].as_mut().expect("allocated group");
            match best {
                Some(r) => {
                    group.base_len = r.len;
                    group.base_next_hop = Some(r.next_hop);
                }
                None => {
                    group.base_len = 0;
                    group.base_next_hop = None;
                }
            }
        } else {
            self.tbl24[idx] = match best {
                Some(r) => Tbl24Entry::direct(r.next_hop, r.len),
                None => Tbl24Entry::EMPTY,
            };
        }
    }

    fn recompute_group_octet(&mut self, pool_idx: usize, group_key: u32, oct: usize) {
        let addr = (group_key << 8) | oct as u32;
        let best = self
            .rules
            .iter()
            .filter(|r| r.len > 24 && (addr & netmask(r.len)) == r.prefix)
            .max_by_key(|r| r.len);
        let group = self.groups[pool_idx].as_mut().expect("allocated group");
        match best {
            Some(r) => {
                group.entry_len[oct] = r.len;
                group.entry_val[oct] = Some(r.next_hop);
            }
            None => {
                group.entry_len[oct] = 0;
                group.entry_val[oct] = None;
            }
        }
    }

    fn maybe_free_group(&mut self, pool_idx: usize, group_key: u32) {
        let group = self.groups[pool_idx].as_ref().expect("allocated group");
        if group.entry_val.iter().all(Option::is_none) {
            let restored = match group.base_next_hop {
                Some(nh) => Tbl24Entry::direct(nh, group.base_len),
                None => Tbl24Entry::EMPTY,
            };
            self.tbl24[group_key as usize] = restored;
            self.groups[pool_idx] = None;
            self.group_index_of.remove(&group_key);
            self.free_groups.push(pool_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test inputs are written as plain host-order IPv4 integers and
    /// converted with `to_be()`, the exact inverse of the `from_be()` the
    /// table applies, so the round trip is endianness-independent.
    fn be(ip: u32) -> u32 {
        ip.to_be()
    }

    #[test]
    fn s2_longest_prefix_wins_on_overlap() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        t.add(be(0x0A00_0000), 8, 1).unwrap(); // 10.0.0.0/8 -> 1
        t.add(be(0x0A01_0000), 16, 2).unwrap(); // 10.1.0.0/16 -> 2

        assert_eq!(t.lookup(be(0x0A01_0203)), (true, 2)); // 10.1.2.3
        assert_eq!(t.lookup(be(0x0A02_0001)), (true, 1)); // 10.2.0.1
        assert_eq!(t.lookup(be(0x0B00_0001)), (false, 0)); // 11.0.0.1, no match
    }

    #[test]
    fn lookup_x4_fills_misses_with_caller_default() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        t.add(be(0x0A00_0000), 8, 1).unwrap();
        let out = t.lookup_x4([be(0x0A01_0203), be(0x0B00_0001), be(0x0A00_0001), be(0xC000_0201)], 99);
        assert_eq!(out, [1, 99, 1, 99]);
    }

    #[test]
    fn rejects_prefix_with_host_bits_set() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        let err = t.add(be(0x0A00_0001), 8, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArg);
    }

    #[test]
    fn delete_restores_the_next_best_covering_prefix() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        t.add(be(0x0A00_0000), 8, 1).unwrap();
        t.add(be(0x0A01_0000), 16, 2).unwrap();
        assert_eq!(t.lookup(be(0x0A01_0203)), (true, 2));

        t.delete(be(0x0A01_0000), 16).unwrap();
        assert_eq!(t.lookup(be(0x0A01_0203)), (true, 1));

        t.delete(be(0x0A00_0000), 8).unwrap();
        assert_eq!(t.lookup(be(0x0A01_0203)), (false, 0));
    }

    #[test]
    fn long_prefix_beyond_24_bits_uses_tbl8_group() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        t.add(be(0xC0A8_0000), 24, 5).unwrap(); // 192.168.0.0/24 -> 5
        t.add(be(0xC0A8_0080), 25, 6).unwrap(); // 192.168.0.128/25 -> 6

        assert_eq!(t.lookup(be(0xC0A8_0010)), (true, 5));
        assert_eq!(t.lookup(be(0xC0A8_0090)), (true, 6));

        t.delete(be(0xC0A8_0080), 25).unwrap();
        assert_eq!(t.lookup(be(0xC0A8_0090)), (true, 5));
        assert_eq!(t.stats().tbl8_groups_used, 0);
    }

    #[test]
    fn default_route_covers_unmatched_addresses_until_deleted() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        t.add(be(0), 0, 42).unwrap();
        assert_eq!(t.lookup(be(0x0102_0304)), (true, 42));
        t.delete(be(0), 0).unwrap();
        assert_eq!(t.lookup(be(0x0102_0304)), (false, 0));
    }

    #[test]
    fn duplicate_add_is_already_exists() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        t.add(be(0x0A00_0000), 8, 1).unwrap();
        let err = t.add(be(0x0A00_0000), 8, 2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[test]
    fn rejects_prefix_length_over_32() {
        let mut t = LpmTable::new(DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S);
        assert_eq!(t.add(be(0), 33, 1).unwrap_err().kind, ErrorKind::InvalidArg);
    }
}
