//! Module/gate dataflow runtime: the run-to-completion packet-processing
//! graph described in spec §4.1, plus the packet batch and gate plumbing
//! of §3.
//!
//! The fast path (`Module::process_batch`) never blocks and never logs per
//! packet; only the control plane (module creation, `connect`/`disconnect`,
//! command dispatch) is instrumented with `tracing`, per SPEC_FULL §4.8.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod batch;
pub mod constants;
pub mod control;
pub mod error;
pub mod gate;
pub mod module;
pub mod names;
pub mod packet;
pub mod pipeline;
pub mod registry;

pub use batch::PacketBatch;
pub use constants::*;
pub use error::{Error, ErrorKind};
pub use gate::{GateDirection, GateId};
pub use module::{Module, TaskArg, TaskResult};
pub use names::ModuleName;
pub use packet::{Packet, PacketPool};
pub use pipeline::Pipeline;
