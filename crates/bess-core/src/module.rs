//! The module trait, spec §4.1 and §9 ("Dynamic dispatch on modules").
//!
//! The original implementation dispatches through virtual methods plus a
//! static command table keyed by string; here that becomes a polymorphic
//! trait plus a per-type static command registry the builder registry
//! looks up by name (see [`crate::registry`]), so the registry stores type
//! descriptors rather than vtables.

use bess_metadata::AttrDesc;
use serde_json::Value;

use crate::batch::PacketBatch;
use crate::error::Error;

/// Opaque argument handed to [`Module::run_task`] by the scheduler.
///
/// The scheduler itself (which decides which task to run next, and when)
/// is out of scope (spec §1); this crate only needs the shape of the
/// call a source-like module receives.
#[derive(Debug, Clone, Default)]
pub struct TaskArg {
    /// Scheduler-assigned task index, for modules that expose more than
    /// one runnable task.
    pub task_index: usize,
}

/// Result of a `run_task` invocation: how much work was actually done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskResult {
    /// Packets produced or consumed by this invocation.
    pub packets: u64,
    /// Bits produced or consumed by this invocation.
    pub bits: u64,
}

/// A node in the dataflow graph, spec §4.1.
///
/// `process_batch` and `run_task` on the same instance are never called
/// concurrently (spec §5): a module is bound to exactly one worker for its
/// entire lifetime, so implementations may freely use unsynchronized
/// interior mutability (e.g. `RefCell`/`Cell`) for per-instance state such
/// as lookup tables.
pub trait Module {
    /// Validates `config` and allocates any internal state.
    ///
    /// `config` is an arbitrary JSON blob (SPEC_FULL §4.7): the RPC/config
    /// surface that produces it is out of scope, so this crate never needs
    /// to know a module's concrete config type.
    fn init(&mut self, config: Value) -> Result<(), Error>;

    /// Releases internal state. Must be idempotent.
    fn deinit(&mut self) {}

    /// Consumes a batch delivered on one of this module's input gates.
    ///
    /// Implementations dispatch to zero or more downstream gates via the
    /// [`crate::pipeline::Pipeline`] dispatch primitives (`run_next`,
    /// `run_choose`, `run_split`) and may drop any subset of packets.
    fn process_batch(&mut self, igate: u16, batch: PacketBatch) -> Dispatch;

    /// Invoked by the scheduler for source-like modules; produces zero or
    /// one batch to forward downstream.
    ///
    /// Must return promptly (spec §5: O(microseconds), no suspension
    /// points on the fast path).
    fn run_task(&mut self, _arg: TaskArg) -> (TaskResult, Option<Dispatch>) {
        (TaskResult::default(), None)
    }

    /// Human-readable status string for the control plane.
    fn get_desc(&self) -> String {
        String::new()
    }

    /// Runtime control-plane command dispatch.
    fn run_command(&mut self, _name: &str, _arg: Value) -> Result<Value, Error> {
        Err(Error::new(crate::error::ErrorKind::InvalidArg, "no commands are defined"))
    }

    /// Attributes this module declares reading and/or writing (spec §3).
    ///
    /// Declared statically: the same slice every time, independent of
    /// `config` (the metadata compiler runs once over the frozen graph
    /// before the data plane starts, spec §5).
    fn declared_attrs(&self) -> &[AttrDesc] {
        &[]
    }
}

/// What a module asked the runtime to do with a batch it just processed,
/// returned from `process_batch` so the pipeline (not the module) performs
/// the actual gate traversal and bookkeeping.
pub enum Dispatch {
    /// Forward the whole batch out gate 0 (`run_next`).
    Next(PacketBatch),
    /// Forward the whole batch out a specific gate, or free it if the gate
    /// is [`crate::constants::DROP_GATE`] (`run_choose`).
    Choose {
        /// Target gate index, or `DROP_GATE`.
        gate: u16,
        /// The batch to forward or drop.
        batch: PacketBatch,
    },
    /// Partition the batch across gates by a per-packet gate assignment
    /// (`run_split`); `gates[i]` is the destination for `batch`'s `i`-th
    /// live packet, `DROP_GATE` meaning "free this packet".
    Split {
        /// Per-packet destination gate indices, same length as `batch`.
        gates: Vec<u16>,
        /// The batch to partition.
        batch: PacketBatch,
    },
    /// Nothing to forward (all packets consumed or dropped by the module
    /// itself).
    None,
}
