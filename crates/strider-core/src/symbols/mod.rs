//! Symbol helpers that work on the executable image directly.
//!
//! Address-to-symbol resolution for a live process is the backend's job
//! (see [`DebuggerBackend::resolve_address`](crate::backend::DebuggerBackend::resolve_address)).
//! What lives here runs before the process exists or formats what the
//! backend returns.

pub mod demangle;
pub mod entry;

pub use demangle::make_symbol_name;
pub use entry::{entry_point_from_bytes, find_entry_point, EntryPoint};
