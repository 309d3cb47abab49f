//! # strider-core
//!
//! Instruction-level stepping engine for Strider.
//!
//! This crate turns a native debugger's primitives into an execution trace:
//! - Module catalog and skip ranges (which code is worth tracing)
//! - Step decisions at every stop (step in, over, or out)
//! - Return-address breakpoints for skipped calls
//! - Source statement reconstruction for the log line
//! - Calling-convention decoding of hooked libc calls
//!
//! ## Backends
//!
//! The engine never touches the process itself. Everything it needs (run
//! control, disassembly, symbolication, memory) comes through
//! [`DebuggerBackend`](backend::DebuggerBackend), so an LLDB bridge, a
//! ptrace layer, or a scripted test double can drive it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strider_core::backend::{create_backend, LaunchRequest};
//! use strider_core::tracer::TraceSession;
//! use strider_utils::ConfigStore;
//!
//! let store = Arc::new(ConfigStore::open("config.yaml")?);
//! let request = LaunchRequest {
//!     program: "./a.out".into(),
//!     ..LaunchRequest::default()
//! };
//! let outcome = TraceSession::new(create_backend()?, store, request).run()?;
//! std::process::exit(outcome.exit_code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod abi;
pub mod backend;
pub mod breakpoints;
pub mod capture;
pub mod error;
pub mod events;
pub mod modules;
pub mod prelude;
pub mod ranges;
pub mod source;
pub mod step;
pub mod symbols;
pub mod tracer;
pub mod types;

pub use backend::{create_backend, DebuggerBackend, LaunchRequest};
// Re-export commonly used types
pub use error::{TracerError, TracerResult};
pub use step::{StepAction, StepDecisionEngine};
pub use tracer::{ModuleSelector, SessionExit, SessionOutcome, TraceSession};
pub use types::{Address, Architecture, ProcessId, ThreadId};
