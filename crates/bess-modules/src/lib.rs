//! Concrete forwarding modules, spec §4.5 and §4.6.
//!
//! Both modules are plain [`bess_core::Module`] implementations over the
//! lookup tables from [`bess_l2`] / [`bess_lpm`]; registering them with a
//! [`bess_core::registry::BuilderRegistry`] is the caller's job (see
//! `bessd` for a small wiring example).

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod ip_lookup;
mod l2_forward;
mod mac;

pub use ip_lookup::{IpLookupBuilder, IpLookupConfig, IpLookupModule};
pub use l2_forward::{L2ForwardBuilder, L2ForwardConfig, L2ForwardModule};
