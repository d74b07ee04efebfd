//! Metadata compiler: the offline, whole-graph pass that assigns each
//! `(module, attribute)` pair a byte offset into the per-packet scratch
//! region, per spec §4.2.
//!
//! This crate has no knowledge of gates, modules, or packets as such — it
//! operates over the [`ModuleGraph`] trait so it can be exercised with a
//! hand-built mock graph in tests independent of the dataflow runtime
//! (`bess-core` implements the trait for its pipeline type).

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod compiler;
pub mod descriptor;
pub mod graph;
mod offset;

pub use compiler::{CompiledAttrs, compile};
pub use descriptor::{AttrDesc, AttrMode, AttrName};
pub use graph::{ModuleGraph, ModuleRef};
pub use offset::Offset;

/// Total bytes available in the per-packet metadata scratch region.
///
/// Mirrors `METADATA_TOTAL` from spec §2/§6; duplicated here (rather than
/// imported from `bess-core`) so this crate stays a leaf dependency.
pub const METADATA_TOTAL: u16 = 96;

/// Rounds `size` up to the next power of two, capped at 32 bytes (the
/// largest attribute size allowed by spec §3).
#[must_use]
pub fn align_ceil_pow2(size: u8) -> u16 {
    let size = size.max(1) as u16;
    size.next_power_of_two().min(32)
}
