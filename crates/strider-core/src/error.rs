//! # Error Types
//!
//! General error handling for the tracer.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Most lookups the tracer performs on a stopped process are allowed to fail
//! quietly (a missing source file becomes `<no line>`, an unreadable string
//! becomes `<invalid_addr:0x...>`). The variants here are for failures that
//! change the course of a session: a backend refusing a command, a target
//! that cannot be launched, or a configuration that cannot be loaded.

use thiserror::Error;

use crate::breakpoints::BreakpointId;
use crate::types::Address;

/// Main error type for tracer operations
///
/// ## Error Categories
///
/// 1. **Backend errors**: BackendUnavailable, LaunchFailed, CommandFailed
/// 2. **Target state errors**: MemoryReadFailed, RegisterReadFailed, SymbolNotFound
/// 3. **Breakpoint errors**: BreakpointFailed, BreakpointIdNotFound
/// 4. **Architecture errors**: UnsupportedArchitecture
/// 5. **Collaborator errors**: Config, Object, Ui
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum TracerError
{
    /// No native debugger backend is available on this platform
    #[error("No debugger backend available: {0}")]
    BackendUnavailable(String),

    /// The target could not be created or started
    #[error("Failed to launch {program}: {reason}")]
    LaunchFailed
    {
        /// Executable path
        program: String,
        /// Backend-provided reason
        reason: String,
    },

    /// The backend rejected a step, continue, or other control command
    ///
    /// This usually means the process is already running or has gone away.
    #[error("Backend command '{command}' failed: {reason}")]
    CommandFailed
    {
        /// Name of the command (e.g. `step_instruction`)
        command: &'static str,
        /// Backend-provided reason
        reason: String,
    },

    /// The target architecture has no calling-convention table
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// Reading target memory failed
    #[error("Failed to read {length} bytes at {address}")]
    MemoryReadFailed
    {
        /// Start of the read
        address: Address,
        /// Number of bytes requested
        length: usize,
    },

    /// Reading a named register failed
    #[error("Failed to read register {0}")]
    RegisterReadFailed(String),

    /// No symbol covers the given address
    #[error("No symbol at {0}")]
    SymbolNotFound(Address),

    /// The backend could not create a breakpoint
    #[error("Failed to create breakpoint at {location}: {reason}")]
    BreakpointFailed
    {
        /// Address or symbol name
        location: String,
        /// Backend-provided reason
        reason: String,
    },

    /// No breakpoint exists for the given identifier.
    #[error("No breakpoint with id {}", .0.raw())]
    BreakpointIdNotFound(BreakpointId),

    /// The module picker failed to run
    #[error("Module picker failed: {0}")]
    Ui(String),

    /// Loading or saving the configuration failed
    #[error(transparent)]
    Config(#[from] strider_utils::ConfigError),

    /// The executable could not be parsed
    #[error("Failed to parse executable: {0}")]
    Object(#[from] object::read::Error),

    /// I/O error (for reading the executable, source files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TracerError
{
    /// Shorthand for [`TracerError::CommandFailed`].
    pub fn command(command: &'static str, reason: impl Into<String>) -> Self
    {
        Self::CommandFailed {
            command,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for `Result<T, TracerError>`
///
/// ```rust
/// use strider_core::error::TracerResult;
/// fn foo() -> TracerResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type TracerResult<T> = std::result::Result<T, TracerError>;
