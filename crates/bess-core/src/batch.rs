//! Packet batch, spec §3 ("Packet batch").

use arrayvec::ArrayVec;

use crate::constants::MAX_BURST;
use crate::packet::Packet;

/// An ordered sequence of up to [`MAX_BURST`] live packets.
///
/// Must not outlive a single `process_batch` invocation chain (spec §3):
/// nothing in this type tries to enforce that at the type level, it is a
/// property of how the dataflow runtime uses it.
#[derive(Debug, Default)]
pub struct PacketBatch {
    packets: ArrayVec<Packet, MAX_BURST>,
}

impl PacketBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            packets: ArrayVec::new(),
        }
    }

    /// Builds a batch from an iterator, silently capping at [`MAX_BURST`]
    /// (callers that source from drivers are expected to request bursts no
    /// larger than this already).
    pub fn from_iter_capped(iter: impl IntoIterator<Item = Packet>) -> Self {
        let mut batch = Self::new();
        for pkt in iter {
            if batch.push(pkt).is_err() {
                break;
            }
        }
        batch
    }

    /// Number of live packets, `cnt` in spec terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// True if the batch holds no packets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Appends a packet, failing if the batch is already at [`MAX_BURST`].
    pub fn push(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.packets.try_push(pkt).map_err(|e| e.element())
    }

    /// Borrows the live packets in order.
    #[must_use]
    pub fn as_slice(&self) -> &[Packet] {
        &self.packets
    }

    /// Mutably borrows the live packets in order.
    pub fn as_mut_slice(&mut self) -> &mut [Packet] {
        &mut self.packets
    }

    /// Consumes the batch, yielding its packets in order.
    pub fn into_vec(self) -> Vec<Packet> {
        self.packets.into_iter().collect()
    }

    /// Consumes the batch, returning an iterator over its packets.
    pub fn into_iter(self) -> impl Iterator<Item = Packet> {
        self.packets.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_max_burst() {
        let mut batch = PacketBatch::new();
        for _ in 0..MAX_BURST {
            batch.push(Packet::with_headroom(64, 16)).expect("room");
        }
        let rejected = batch.push(Packet::with_headroom(64, 16));
        assert!(rejected.is_err());
        assert_eq!(batch.len(), MAX_BURST);
    }
}
