//! Common module for library exports

pub use crate::backend::{DebuggerBackend, FrameInfo, LaunchRequest, MemoryReader, StepCommand};
pub use crate::breakpoints::{BreakpointId, ReturnAddressBreakpointCache};
pub use crate::error::{TracerError, TracerResult};
pub use crate::events::{ProcessEvent, StopReason};
pub use crate::modules::{Module, ModuleCatalog, SkipPolicy};
pub use crate::step::{StepAction, StepDecisionEngine, StepState, TraceTables};
pub use crate::tracer::{ModuleSelector, SessionExit, SessionOutcome, TraceSession};
pub use crate::types::address::Address;
pub use crate::types::process::{Architecture, ProcessId, ProcessState, ThreadId};
