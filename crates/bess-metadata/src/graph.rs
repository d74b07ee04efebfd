//! The view of a module graph the compiler needs. `bess-core`'s `Pipeline`
//! implements this trait; tests in this crate use a small hand-built mock.

use crate::descriptor::AttrDesc;

/// Opaque handle to a module, stable for the duration of one compilation pass.
pub type ModuleRef = usize;

/// Read-only view over a module graph sufficient to run the metadata compiler.
pub trait ModuleGraph {
    /// All modules in the graph, in a stable order.
    fn modules(&self) -> Vec<ModuleRef>;

    /// The attributes a module declares, in declaration order.
    fn attrs(&self, module: ModuleRef) -> &[AttrDesc];

    /// Modules directly reachable by following this module's output gates
    /// to their connected peer input gates' owning modules.
    fn downstream(&self, module: ModuleRef) -> Vec<ModuleRef>;

    /// Modules directly reachable by following this module's input gates'
    /// upstream (reverse) lists back to their owning modules.
    fn upstream(&self, module: ModuleRef) -> Vec<ModuleRef>;
}
