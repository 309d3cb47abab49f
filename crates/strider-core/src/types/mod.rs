//! # Types
//!
//! Backend-agnostic types used throughout the tracer.
//!
//! These types abstract away how a particular debugger backend names things,
//! so the step engine can work with "addresses", "threads", and "line entries"
//! without knowing which backend produced them.

pub mod address;
pub mod process;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use process::{Architecture, ProcessId, ProcessState, ThreadId};
pub use symbols::{LineEntry, ResolvedSymbol, SourceLocation, SymbolKind, SymbolLanguage, SymbolName};
