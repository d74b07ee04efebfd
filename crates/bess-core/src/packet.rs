//! Packet handle, spec §3 ("Packet handle") and the packet-pool interface
//! consumed from spec §6.
//!
//! The NIC drivers and the real packet-buffer memory pool are external
//! collaborators out of scope for this crate (spec §1); [`PacketPool`] is
//! the seam through which they would be plugged in. This crate ships one
//! concrete, heap-backed implementation so the dataflow runtime and its
//! tests are self-contained.

use crate::constants::METADATA_TOTAL;

/// An owned packet buffer.
///
/// Ownership transfers when a batch is handed to `process_batch`: the
/// callee either forwards the packet downstream (ownership passes along)
/// or drops it (and must free it back to the pool it came from).
#[derive(Debug, Clone)]
pub struct Packet {
    buf: Vec<u8>,
    head: usize,
    len: usize,
    metadata: [u8; METADATA_TOTAL],
}

impl Packet {
    /// Allocates a packet with `capacity` total bytes and `headroom` bytes
    /// reserved in front of the data for later `prepend` calls.
    ///
    /// # Panics
    ///
    /// Panics if `headroom > capacity`.
    #[must_use]
    pub fn with_headroom(capacity: usize, headroom: usize) -> Self {
        assert!(headroom <= capacity, "headroom cannot exceed capacity");
        Self {
            buf: vec![0u8; capacity],
            head: headroom,
            len: 0,
            metadata: [0u8; METADATA_TOTAL],
        }
    }

    /// Allocates a packet carrying `data` verbatim, with `headroom` bytes
    /// of spare room in front for `prepend`.
    #[must_use]
    pub fn from_bytes(data: &[u8], headroom: usize) -> Self {
        let mut pkt = Self::with_headroom(headroom + data.len(), headroom);
        pkt.buf[headroom..headroom + data.len()].copy_from_slice(data);
        pkt.len = data.len();
        pkt
    }

    /// Current head-data pointer contents (the live payload).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.head..self.head + self.len]
    }

    /// Mutable view of the live payload.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..self.head + self.len]
    }

    /// Payload length, i.e. total length (this crate has no separate
    /// segment chain, so "payload length" and "total length" coincide).
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.len
    }

    /// Bytes currently available before the head-data pointer.
    #[must_use]
    pub fn headroom(&self) -> usize {
        self.head
    }

    /// Bytes currently available after the payload.
    #[must_use]
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.head - self.len
    }

    /// Grows the payload by `n` bytes at the front, returning the newly
    /// exposed prefix, or `None` if there isn't `n` bytes of headroom.
    ///
    /// Per spec §7's data-plane error policy, a failed `prepend` is not an
    /// error the caller must propagate: the packet is simply left
    /// unchanged and the leaf module decides whether to still forward it.
    pub fn prepend(&mut self, n: usize) -> Option<&mut [u8]> {
        if n > self.head {
            return None;
        }
        self.head -= n;
        self.len += n;
        Some(&mut self.buf[self.head..self.head + n])
    }

    /// Shrinks the payload by `n` bytes at the front (e.g. to strip a
    /// decoded header), returning `None` if `n` exceeds the current length.
    pub fn adj(&mut self, n: usize) -> Option<()> {
        if n > self.len {
            return None;
        }
        self.head += n;
        self.len -= n;
        Some(())
    }

    /// Grows the payload by `n` bytes at the back, returning the newly
    /// exposed suffix, or `None` if there isn't `n` bytes of tailroom.
    pub fn append(&mut self, n: usize) -> Option<&mut [u8]> {
        if n > self.tailroom() {
            return None;
        }
        let start = self.head + self.len;
        self.len += n;
        Some(&mut self.buf[start..start + n])
    }

    /// The per-packet metadata scratch region (spec §3, `METADATA_TOTAL` bytes).
    #[must_use]
    pub fn metadata(&self) -> &[u8; METADATA_TOTAL] {
        &self.metadata
    }

    /// Mutable view of the metadata scratch region.
    pub fn metadata_mut(&mut self) -> &mut [u8; METADATA_TOTAL] {
        &mut self.metadata
    }
}

/// The packet-buffer memory pool interface consumed from spec §6.
///
/// Implementations are expected to be backed by a NIC driver's DMA-able
/// buffer pool in production; this crate only needs the shape of the
/// interface to keep modules decoupled from any one pool implementation.
pub trait PacketPool {
    /// Allocates up to `count` packets of `size` bytes each into `out`,
    /// returning how many were actually allocated (fewer than `count`
    /// means the pool is under memory pressure, not an error).
    fn alloc_bulk(&mut self, out: &mut Vec<Packet>, count: usize, size: usize) -> usize;

    /// Returns packets to the pool.
    fn free_bulk(&mut self, packets: Vec<Packet>);
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! A trivial heap-backed pool for use in tests.

    use super::{Packet, PacketPool};

    /// Default headroom reserved by [`HeapPool`], enough for common encap
    /// prepends (Ethernet + VXLAN + outer IP/UDP).
    pub const DEFAULT_HEADROOM: usize = 128;

    /// A [`PacketPool`] that simply heap-allocates every packet; has no
    /// notion of exhaustion, so `alloc_bulk` always returns `count`.
    #[derive(Debug, Default)]
    pub struct HeapPool {
        freed: usize,
    }

    impl HeapPool {
        /// Number of packets freed through this pool so far.
        #[must_use]
        pub fn freed_count(&self) -> usize {
            self.freed
        }
    }

    impl PacketPool for HeapPool {
        fn alloc_bulk(&mut self, out: &mut Vec<Packet>, count: usize, size: usize) -> usize {
            for _ in 0..count {
                out.push(Packet::with_headroom(size + DEFAULT_HEADROOM, DEFAULT_HEADROOM));
            }
            count
        }

        fn free_bulk(&mut self, packets: Vec<Packet>) {
            self.freed += packets.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_adj_append_round_trip() {
        let mut pkt = Packet::from_bytes(&[1, 2, 3, 4], 16);
        assert_eq!(pkt.total_len(), 4);
        assert_eq!(pkt.headroom(), 16);

        let hdr = pkt.prepend(4).expect("enough headroom");
        hdr.copy_from_slice(&[9, 9, 9, 9]);
        assert_eq!(pkt.total_len(), 8);
        assert_eq!(pkt.data(), &[9, 9, 9, 9, 1, 2, 3, 4]);

        pkt.adj(4).expect("enough payload to trim");
        assert_eq!(pkt.data(), &[1, 2, 3, 4]);

        let tail = pkt.append(2).expect("enough tailroom");
        tail.copy_from_slice(&[7, 7]);
        assert_eq!(pkt.data(), &[1, 2, 3, 4, 7, 7]);
    }

    #[test]
    fn prepend_fails_past_headroom_and_leaves_packet_unchanged() {
        let mut pkt = Packet::from_bytes(&[1, 2, 3], 2);
        let before = pkt.data().to_vec();
        assert!(pkt.prepend(3).is_none());
        assert_eq!(pkt.data(), before.as_slice());
    }
}
