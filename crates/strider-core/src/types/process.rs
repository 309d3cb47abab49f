//! Process, thread, and architecture types.

use std::fmt;
use std::str::FromStr;

use crate::error::TracerError;

/// Process identifier (PID) of the traced program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// The value is whatever the backend uses to name a thread (a TID on Linux, a
/// Mach thread id on macOS). The tracer only compares and hashes it: it keys
/// per-thread step state and recognises the main thread.
///
/// ## Example
///
/// ```rust
/// use strider_core::types::ThreadId;
///
/// let thread = ThreadId::from(12345);
/// assert_eq!(thread.raw(), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Coarse state of the traced process, as published by the backend.
///
/// `Exited`, `Crashed`, and `Detached` are terminal: the event loop records
/// them and returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState
{
    /// The process is executing.
    Running,
    /// At least one thread is stopped; query [`StopReason`](crate::events::StopReason) per thread.
    Stopped,
    /// The process exited normally.
    Exited
    {
        /// Exit status reported by the OS
        status: i32,
        /// Backend-provided description, if any
        description: Option<String>,
    },
    /// The process was killed by a fatal signal or exception.
    Crashed
    {
        /// Backend-provided description, if any
        description: Option<String>,
    },
    /// The backend lost control of the process.
    Detached,
}

impl ProcessState
{
    /// Whether the session cannot continue from this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool
    {
        matches!(self, Self::Exited { .. } | Self::Crashed { .. } | Self::Detached)
    }
}

/// CPU architecture of the traced process
///
/// The architecture selects the calling-convention table used to decode
/// arguments, return values, and return addresses, and the instruction
/// mnemonics the step engine treats as branches.
///
/// ## Example
///
/// ```rust
/// use strider_core::types::Architecture;
///
/// let arch: Architecture = "aarch64-apple-darwin".parse().unwrap();
/// assert_eq!(arch, Architecture::Arm64);
/// assert_eq!(arch.to_string(), "arm64");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit ARM
    ///
    /// Arguments in x0-x7, return value in x0, return address in the link
    /// register (x30, `lr`).
    Arm64,
    /// 64-bit x86 (System V ABI)
    ///
    /// Arguments in rdi, rsi, rdx, rcx, r8, r9, return value in rax, return
    /// address on top of the stack at call entry.
    X86_64,
    /// Any other architecture (or unknown)
    ///
    /// The `&'static str` is the architecture name of the host build.
    Unknown(&'static str),
}

impl Architecture
{
    /// Get the architecture of the currently running tracer binary
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        8
    }
}

impl FromStr for Architecture
{
    type Err = TracerError;

    /// Parse an architecture name or a target triple (`arm64-apple-macosx14.0`,
    /// `x86_64-unknown-linux-gnu`).
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let name = s.split('-').next().unwrap_or(s).to_ascii_lowercase();
        match name.as_str() {
            "arm64" | "arm64e" | "aarch64" => Ok(Architecture::Arm64),
            "x86_64" | "x86-64" | "amd64" | "x86_64h" => Ok(Architecture::X86_64),
            _ => Err(TracerError::UnsupportedArchitecture(s.to_string())),
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}
