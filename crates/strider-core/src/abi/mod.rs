//! # Calling Conventions
//!
//! Per-architecture register conventions used to read call arguments,
//! return values, and return addresses from a stopped frame.
//!
//! ## Return addresses
//!
//! arm64 passes the return address in the link register. x86_64 pushes it on
//! the stack, so at function entry it is the 8 bytes at `rsp`.

pub mod libc;
pub mod structs;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::trace;

use crate::backend::DebuggerBackend;
use crate::error::{TracerError, TracerResult};
use crate::types::{Address, Architecture, ThreadId};

pub use self::libc::LibcArgDecoder;
pub use self::structs::{StatLayout, StructLayout, StructRegistry};

/// Where the return address of the current call lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnAddressSource
{
    /// In the named link register.
    LinkRegister(&'static str),
    /// In memory at the value of the named stack pointer register.
    StackTop(&'static str),
}

/// Register conventions of one architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiDescriptor
{
    /// Architecture this table applies to
    pub architecture: Architecture,
    /// Integer argument registers, in order
    pub arg_registers: &'static [&'static str],
    /// Integer return value register
    pub return_register: &'static str,
    /// Where the return address is found at function entry
    pub return_address: ReturnAddressSource,
}

/// A raw argument read from its register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterArg
{
    /// Register the value came from
    pub register: &'static str,
    /// Raw value
    pub value: u64,
}

static ABI_TABLE: Lazy<HashMap<Architecture, AbiDescriptor>> = Lazy::new(|| {
    HashMap::from([
        (
            Architecture::Arm64,
            AbiDescriptor {
                architecture: Architecture::Arm64,
                arg_registers: &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
                return_register: "x0",
                return_address: ReturnAddressSource::LinkRegister("lr"),
            },
        ),
        (
            Architecture::X86_64,
            AbiDescriptor {
                architecture: Architecture::X86_64,
                arg_registers: &["rdi", "rsi", "rdx", "rcx", "r8", "r9"],
                return_register: "rax",
                return_address: ReturnAddressSource::StackTop("rsp"),
            },
        ),
    ])
});

impl AbiDescriptor
{
    /// Conventions for `architecture`.
    ///
    /// ## Errors
    ///
    /// `UnsupportedArchitecture` when no table exists.
    pub fn for_architecture(architecture: Architecture) -> TracerResult<&'static AbiDescriptor>
    {
        ABI_TABLE
            .get(&architecture)
            .ok_or_else(|| TracerError::UnsupportedArchitecture(architecture.to_string()))
    }

    /// Conventions for an architecture name or target triple.
    ///
    /// ## Errors
    ///
    /// `UnsupportedArchitecture` for unknown names.
    pub fn for_triple(triple: &str) -> TracerResult<&'static AbiDescriptor>
    {
        Self::for_architecture(triple.parse()?)
    }

    /// Register holding argument `index`, if it is passed in a register.
    #[must_use]
    pub fn arg_register(&self, index: usize) -> Option<&'static str>
    {
        self.arg_registers.get(index).copied()
    }

    /// Read up to `count` argument registers. Registers that cannot be read
    /// are left out.
    pub fn get_args<B>(&self, backend: &B, thread: ThreadId, frame: usize, count: usize) -> Vec<RegisterArg>
    where
        B: DebuggerBackend + ?Sized,
    {
        self.arg_registers
            .iter()
            .take(count)
            .filter_map(|register| match backend.read_register(thread, frame, register) {
                Ok(value) => Some(RegisterArg { register, value }),
                Err(e) => {
                    trace!("Skipping argument register {register}: {e}");
                    None
                }
            })
            .collect()
    }

    /// Read the return value register.
    ///
    /// ## Errors
    ///
    /// Propagates the register read failure.
    pub fn get_return_value<B>(&self, backend: &B, thread: ThreadId, frame: usize) -> TracerResult<u64>
    where
        B: DebuggerBackend + ?Sized,
    {
        backend.read_register(thread, frame, self.return_register)
    }

    /// Return address of the call the frame is currently at the entry of.
    ///
    /// ## Errors
    ///
    /// Propagates register or memory read failures.
    pub fn get_return_address<B>(&self, backend: &B, thread: ThreadId, frame: usize) -> TracerResult<Address>
    where
        B: DebuggerBackend + ?Sized,
    {
        match self.return_address {
            ReturnAddressSource::LinkRegister(register) => backend.read_register(thread, frame, register).map(Address::new),
            ReturnAddressSource::StackTop(register) => {
                let sp = Address::new(backend.read_register(thread, frame, register)?);
                let width = usize::from(self.architecture.pointer_size_bytes());
                let bytes = backend.read_memory(sp, width)?;
                let raw: [u8; 8] = bytes
                    .get(..8)
                    .and_then(|slice| slice.try_into().ok())
                    .ok_or_else(|| TracerError::MemoryReadFailed {
                        address: sp,
                        length: width,
                    })?;
                Ok(Address::new(u64::from_le_bytes(raw)))
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_arm64_table()
    {
        let abi = AbiDescriptor::for_architecture(Architecture::Arm64).unwrap();
        assert_eq!(abi.arg_registers.len(), 8);
        assert_eq!(abi.arg_register(2), Some("x2"));
        assert_eq!(abi.return_register, "x0");
        assert_eq!(abi.return_address, ReturnAddressSource::LinkRegister("lr"));
    }

    #[test]
    fn test_x86_64_table()
    {
        let abi = AbiDescriptor::for_triple("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(abi.arg_registers, ["rdi", "rsi", "rdx", "rcx", "r8", "r9"]);
        assert_eq!(abi.arg_register(6), None);
        assert_eq!(abi.return_address, ReturnAddressSource::StackTop("rsp"));
    }

    #[test]
    fn test_unknown_architecture()
    {
        assert!(matches!(
            AbiDescriptor::for_architecture(Architecture::Unknown("riscv64")),
            Err(TracerError::UnsupportedArchitecture(_))
        ));
        assert!(AbiDescriptor::for_triple("mips-unknown-linux").is_err());
    }
}
