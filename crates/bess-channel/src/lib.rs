//! Error types for the control-plane channels used to deliver commands to
//! modules bound to a worker thread.
//!
//! The dataflow fast path (`process_batch`) never uses these; they only
//! guard the infrequent command path described in spec §5 ("Shared
//! resources").

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
