//! # Debugger Backend
//!
//! The interface between the tracer and whatever actually controls the
//! process.
//!
//! The tracer never disassembles, symbolizes, or patches memory itself. A
//! backend (an LLDB bridge, a ptrace layer, a scripted test double) provides
//! those primitives and the tracer layers its decisions on top. Everything
//! the tracer needs from a backend is on [`DebuggerBackend`].
//!
//! ## Threading
//!
//! A backend is driven from a single thread: the event loop issues one
//! command, waits for the resulting event, and only then issues the next.
//! Implementations do not need interior locking.

use std::path::PathBuf;
use std::time::Duration;

use crate::breakpoints::BreakpointId;
use crate::error::{TracerError, TracerResult};
use crate::events::{ProcessEvent, StopReason};
use crate::types::{Address, Architecture, LineEntry, ProcessId, ResolvedSymbol, SourceLocation, ThreadId};

/// How to start the traced program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest
{
    /// Executable path
    pub program: PathBuf,
    /// Arguments, not including the program name
    pub args: Vec<String>,
    /// Working directory; the tracer's own when `None`
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub environment: Vec<(String, String)>,
}

/// A section of a loaded module as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor
{
    /// Section name (`__TEXT`, `.text`, ...)
    pub name: String,
    /// Load address, or `None` if the section is not mapped
    pub load_address: Option<Address>,
    /// Size in bytes
    pub size: u64,
}

/// A loaded module (executable or shared library).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor
{
    /// Full path on disk
    pub path: PathBuf,
    /// Sections in the order the backend lists them
    pub sections: Vec<SectionDescriptor>,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledInstruction
{
    /// Load address
    pub address: Address,
    /// Mnemonic (`bl`, `call`, `ret`, ...)
    pub mnemonic: String,
    /// Operand text as the disassembler prints it
    pub operands: String,
    /// Encoded size in bytes
    pub size: u32,
}

/// A stack frame of a stopped thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo
{
    /// Position in the stack, 0 being the innermost frame
    pub index: usize,
    /// Program counter
    pub pc: Address,
    /// Canonical frame address; stable for the lifetime of the frame
    pub cfa: Address,
    /// Function containing `pc`, when symbolized
    pub function: Option<ResolvedSymbol>,
    /// Line-table location of `pc`, when debug info is available
    pub location: Option<SourceLocation>,
}

/// Step primitive requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepCommand
{
    /// Execute one machine instruction, entering calls.
    InstructionInto,
    /// Execute one machine instruction, running calls to completion.
    InstructionOver,
    /// Run to the next source line, entering calls.
    SourceInto,
    /// Run to the next source line, running calls to completion.
    SourceOver,
    /// Run until the current frame returns.
    SourceOut,
}

impl StepCommand
{
    /// Name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            Self::InstructionInto => "step_instruction",
            Self::InstructionOver => "step_instruction_over",
            Self::SourceInto => "step_into",
            Self::SourceOver => "step_over",
            Self::SourceOut => "step_out",
        }
    }
}

/// Capabilities the tracer consumes from a native debugger.
///
/// Lookups that can legitimately come up empty (`resolve_address`) return
/// `Option`; commands and reads return [`TracerResult`].
pub trait DebuggerBackend
{
    /// Create the target and start it. The process must stop at the first
    /// breakpoint set before this call.
    ///
    /// ## Errors
    ///
    /// `LaunchFailed` if the program cannot be started.
    fn launch(&mut self, request: &LaunchRequest) -> TracerResult<ProcessId>;

    /// Architecture of the target.
    fn architecture(&self) -> Architecture;

    /// Every module currently mapped, with its sections.
    ///
    /// ## Errors
    ///
    /// Fails if the process is not stopped.
    fn modules(&self) -> TracerResult<Vec<ModuleDescriptor>>;

    /// Resolve a load address to its symbol and module.
    fn resolve_address(&self, address: Address) -> Option<ResolvedSymbol>;

    /// Read a named register in a frame of a stopped thread.
    ///
    /// ## Errors
    ///
    /// `RegisterReadFailed` if the register does not exist or is unavailable.
    fn read_register(&self, thread: ThreadId, frame: usize, name: &str) -> TracerResult<u64>;

    /// Read `length` bytes of target memory.
    ///
    /// ## Errors
    ///
    /// `MemoryReadFailed` if any part of the range is unreadable.
    fn read_memory(&self, address: Address, length: usize) -> TracerResult<Vec<u8>>;

    /// Create an enabled breakpoint at a load address.
    ///
    /// ## Errors
    ///
    /// `BreakpointFailed` if the backend cannot place it.
    fn create_breakpoint(&mut self, address: Address) -> TracerResult<BreakpointId>;

    /// Create an enabled breakpoint on every location of a symbol name.
    ///
    /// ## Errors
    ///
    /// `BreakpointFailed` if the backend cannot place it.
    fn create_breakpoint_by_name(&mut self, name: &str) -> TracerResult<BreakpointId>;

    /// Make a breakpoint delete itself after its next hit.
    ///
    /// ## Errors
    ///
    /// `BreakpointIdNotFound` for unknown ids.
    fn set_breakpoint_one_shot(&mut self, id: BreakpointId, one_shot: bool) -> TracerResult<()>;

    /// Enable or disable a breakpoint.
    ///
    /// ## Errors
    ///
    /// `BreakpointIdNotFound` for unknown ids.
    fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> TracerResult<()>;

    /// Remove a breakpoint.
    ///
    /// ## Errors
    ///
    /// `BreakpointIdNotFound` for unknown ids.
    fn delete_breakpoint(&mut self, id: BreakpointId) -> TracerResult<()>;

    /// Issue a step primitive on a thread. Returns once the command is
    /// accepted; completion arrives as an event.
    ///
    /// ## Errors
    ///
    /// `CommandFailed` if the backend rejects the command.
    fn step(&mut self, thread: ThreadId, command: StepCommand) -> TracerResult<()>;

    /// Resume every thread.
    ///
    /// ## Errors
    ///
    /// `CommandFailed` if the backend rejects the command.
    fn resume(&mut self) -> TracerResult<()>;

    /// Thread the backend considers current after the last stop.
    fn selected_thread(&self) -> Option<ThreadId>;

    /// Why `thread` is stopped.
    fn stop_reason(&self, thread: ThreadId) -> StopReason;

    /// Stack of a stopped thread, innermost first.
    ///
    /// ## Errors
    ///
    /// Fails if the thread is gone or running.
    fn frames(&self, thread: ThreadId) -> TracerResult<Vec<FrameInfo>>;

    /// Innermost frame of a stopped thread.
    ///
    /// ## Errors
    ///
    /// Fails if the thread has no frames.
    fn current_frame(&self, thread: ThreadId) -> TracerResult<FrameInfo>
    {
        self.frames(thread)?
            .into_iter()
            .next()
            .ok_or_else(|| TracerError::command("frames", format!("thread {thread} has no frames")))
    }

    /// Stack depth of a stopped thread.
    ///
    /// ## Errors
    ///
    /// See [`frames`](Self::frames).
    fn frame_count(&self, thread: ThreadId) -> TracerResult<usize>
    {
        self.frames(thread).map(|frames| frames.len())
    }

    /// Line table of the compile unit that contains `frame` of `thread`,
    /// restricted to rows for the frame's own source file.
    ///
    /// ## Errors
    ///
    /// Fails if the frame has no debug info.
    fn line_entries(&self, thread: ThreadId, frame: usize) -> TracerResult<Vec<LineEntry>>;

    /// Disassemble `[start, end)`.
    ///
    /// ## Errors
    ///
    /// Fails if the range cannot be read or decoded.
    fn disassemble(&self, start: Address, end: Address) -> TracerResult<Vec<DisassembledInstruction>>;

    /// Block until the next process event or `timeout`.
    ///
    /// ## Errors
    ///
    /// Fails if the connection to the process is lost.
    fn wait_for_event(&mut self, timeout: Duration) -> TracerResult<Option<ProcessEvent>>;
}

/// Read-only view of target memory.
///
/// Every backend is one; argument decoders only need this much.
pub trait MemoryReader
{
    /// Read `length` bytes at `address`.
    ///
    /// ## Errors
    ///
    /// `MemoryReadFailed` if any part of the range is unreadable.
    fn read_bytes(&self, address: Address, length: usize) -> TracerResult<Vec<u8>>;
}

impl<T> MemoryReader for T
where
    T: DebuggerBackend + ?Sized,
{
    fn read_bytes(&self, address: Address, length: usize) -> TracerResult<Vec<u8>>
    {
        self.read_memory(address, length)
    }
}

/// Factory function to create the native backend for this platform
///
/// Native process control is provided by external debugger bridges; this
/// build does not link one, so the factory reports that clearly instead of
/// failing later.
///
/// ## Errors
///
/// Returns `BackendUnavailable` when no native backend is compiled in.
pub fn create_backend() -> TracerResult<Box<dyn DebuggerBackend>>
{
    Err(TracerError::BackendUnavailable(format!(
        "no native debugger backend is linked into this build ({}/{})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )))
}
