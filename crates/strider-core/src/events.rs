//! Process events and per-thread stop reasons.
//!
//! The backend publishes a [`ProcessEvent`] whenever the traced process
//! changes state. When the state is `Stopped`, the event loop asks the
//! backend for the [`StopReason`] of the selected thread and dispatches on it.

use std::fmt;
use std::sync::mpsc;

use crate::breakpoints::BreakpointId;
use crate::types::{Address, ProcessId, ProcessState};

/// Event emitted by a debugger backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent
{
    /// The process moved to a new state.
    StateChanged(ProcessState),
    /// A line the target wrote to stdout.
    Stdout(String),
    /// A line the target wrote to stderr.
    Stderr(String),
}

impl ProcessEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::StateChanged(ProcessState::Running) => "Process is running".to_string(),
            Self::StateChanged(ProcessState::Stopped) => "Process stopped".to_string(),
            Self::StateChanged(ProcessState::Exited { status, description }) => match description {
                Some(text) => format!("Process exited with status {status} ({text})"),
                None => format!("Process exited with status {status}"),
            },
            Self::StateChanged(ProcessState::Crashed { description }) => {
                format!("Process crashed: {}", description.as_deref().unwrap_or("no description"))
            }
            Self::StateChanged(ProcessState::Detached) => "Process detached".to_string(),
            Self::Stdout(line) => format!("stdout: {line}"),
            Self::Stderr(line) => format!("stderr: {line}"),
        }
    }
}

/// Thread or process lifecycle change that stopped a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadLifecycle
{
    /// The thread is about to exit.
    Exiting,
    /// The process called `exec`.
    Exec,
    /// The process forked a child.
    Fork(ProcessId),
    /// The process vforked a child.
    VFork(ProcessId),
    /// A vforked child released the parent.
    VForkDone,
}

/// Why a particular thread is stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason
{
    /// The backend has not produced the stop data yet.
    ///
    /// The event loop polls briefly and then resumes rather than waiting
    /// forever.
    None,
    /// A breakpoint trapped.
    ///
    /// `None` means the backend did not attribute the trap to a breakpoint id
    /// (id zero): an internal return-address trap.
    Breakpoint(Option<BreakpointId>),
    /// A step command finished.
    PlanComplete,
    /// A signal was delivered.
    Signal(i32),
    /// A machine exception (bad access, illegal instruction, ...).
    Exception(String),
    /// A watchpoint triggered.
    Watchpoint
    {
        /// Backend watchpoint id
        id: u64,
        /// Watched address, when reported
        address: Option<Address>,
    },
    /// Thread or process lifecycle change.
    ThreadLifecycle(ThreadLifecycle),
    /// Anything else, with the backend's description.
    Other(String),
}

impl fmt::Display for StopReason
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::None => write!(f, "no stop reason yet"),
            Self::Breakpoint(Some(id)) => write!(f, "breakpoint {}", id.raw()),
            Self::Breakpoint(None) => write!(f, "internal breakpoint"),
            Self::PlanComplete => write!(f, "step complete"),
            Self::Signal(signo) => write!(f, "signal {} ({signo})", signal_name(*signo)),
            Self::Exception(description) => write!(f, "exception: {description}"),
            Self::Watchpoint { id, address: Some(address) } => write!(f, "watchpoint {id} at {address}"),
            Self::Watchpoint { id, address: None } => write!(f, "watchpoint {id}"),
            Self::ThreadLifecycle(change) => write!(f, "thread lifecycle: {change:?}"),
            Self::Other(description) => write!(f, "{description}"),
        }
    }
}

/// Conventional name of a signal number on the host.
#[must_use]
pub fn signal_name(signo: i32) -> &'static str
{
    match signo {
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGBUS => "SIGBUS",
        libc::SIGILL => "SIGILL",
        libc::SIGFPE => "SIGFPE",
        libc::SIGABRT => "SIGABRT",
        libc::SIGTRAP => "SIGTRAP",
        libc::SIGSTOP => "SIGSTOP",
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGKILL => "SIGKILL",
        libc::SIGCHLD => "SIGCHLD",
        libc::SIGPIPE => "SIGPIPE",
        _ => "unknown",
    }
}

/// Signals after which the target cannot meaningfully continue.
#[must_use]
pub fn is_fatal_signal(signo: i32) -> bool
{
    matches!(signo, libc::SIGSEGV | libc::SIGBUS | libc::SIGILL | libc::SIGFPE | libc::SIGABRT)
}

/// Sender side of a process event channel.
pub type ProcessEventSender = mpsc::Sender<ProcessEvent>;
/// Receiver side of a process event channel.
pub type ProcessEventReceiver = mpsc::Receiver<ProcessEvent>;

/// Create a new process event channel.
///
/// Backends that learn about state changes on a separate thread push into
/// the sender and serve [`wait_for_event`](crate::backend::DebuggerBackend::wait_for_event)
/// from the receiver with `recv_timeout`.
#[must_use]
pub fn event_channel() -> (ProcessEventSender, ProcessEventReceiver)
{
    mpsc::channel()
}
