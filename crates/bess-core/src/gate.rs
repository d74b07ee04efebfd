//! Gates, spec §3 ("Gate") and §9 ("Cyclic graph with back-references").
//!
//! Gates are modeled as arena-allocated nodes indexed by `(module, gate
//! index)` pairs; neighbors are stored as indices rather than owning
//! pointers, which keeps `connect`/`disconnect` O(1) and sidesteps the
//! ownership cycles a graph of mutually-pointing nodes would otherwise
//! create.

use crate::constants::MAX_GATES;

/// Index of a gate within one module's sparse gate array, `< MAX_GATES`.
pub type GateIndex = u16;

/// Direction of a gate relative to its owning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateDirection {
    /// An output gate; a source module forwards batches through these.
    Output,
    /// An input gate; a sink module receives batches through these.
    Input,
}

/// Identifies one gate: its owning module, its index, and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateId {
    /// Index of the owning module in the pipeline's module arena.
    pub module: usize,
    /// Gate index within the module's `igates`/`ogates` array.
    pub index: GateIndex,
    /// Whether this is an input or output gate.
    pub direction: GateDirection,
}

impl GateId {
    /// Builds an output gate identifier.
    #[must_use]
    pub fn output(module: usize, index: GateIndex) -> Self {
        Self {
            module,
            index,
            direction: GateDirection::Output,
        }
    }

    /// Builds an input gate identifier.
    #[must_use]
    pub fn input(module: usize, index: GateIndex) -> Self {
        Self {
            module,
            index,
            direction: GateDirection::Input,
        }
    }
}

/// An output gate: holds a pointer (by index) to its peer input gate, if
/// connected.
#[derive(Debug, Clone, Default)]
pub struct OutputGate {
    /// The connected input gate, if any.
    pub peer: Option<GateId>,
}

/// An input gate: holds the set of upstream output gates that target it
/// (spec: "a doubly-linked list of all upstream output gates"; a `Vec` of
/// indices gives the same traversal capability without the ownership
/// complexity of an intrusive list).
#[derive(Debug, Clone, Default)]
pub struct InputGate {
    /// Upstream output gates connected to this input.
    pub upstream: Vec<GateId>,
}

/// Validates a gate index against the spec's per-module ceiling.
pub fn check_gate_index(index: GateIndex) -> Result<(), crate::error::Error> {
    if (index as usize) >= MAX_GATES {
        return Err(crate::error::Error::new(
            crate::error::ErrorKind::OutOfRange,
            format!("gate index {index} exceeds MAX_GATES ({MAX_GATES})"),
        ));
    }
    Ok(())
}
