//! Per-address cache of decoded instructions.
//!
//! The first stop inside a function disassembles the whole function in one
//! backend call; every later stop in that function is a map lookup. Entries
//! are never invalidated, which assumes code does not change while the
//! process runs. Targets that generate code set `enable_jit` and bypass the
//! cache.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::backend::DebuggerBackend;
use crate::error::TracerResult;
use crate::types::{Address, ResolvedSymbol};

/// Bytes disassembled around `pc` when no function covers it.
const FALLBACK_WINDOW: u64 = 16;

/// A decoded instruction as the step engine uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionInfo
{
    /// Mnemonic
    pub mnemonic: String,
    /// Raw operand text
    pub operands: String,
    /// Encoded size in bytes
    pub size: u32,
    /// Offset from the start of the containing function
    pub offset: u64,
}

/// Load address to [`InstructionInfo`] cache.
#[derive(Debug, Default)]
pub struct InstructionCache
{
    entries: HashMap<Address, InstructionInfo>,
    disassembly_calls: u64,
}

impl InstructionCache
{
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Instruction at `pc`, disassembling `function` on a miss.
    ///
    /// With `bypass` set nothing is read from or written to the cache.
    ///
    /// ## Errors
    ///
    /// Propagates the backend's disassembly failure.
    pub fn lookup(
        &mut self,
        backend: &dyn DebuggerBackend,
        pc: Address,
        function: Option<&ResolvedSymbol>,
        bypass: bool,
    ) -> TracerResult<Option<InstructionInfo>>
    {
        if !bypass {
            if let Some(info) = self.entries.get(&pc) {
                return Ok(Some(info.clone()));
            }
        }

        let (start, end) = match function.filter(|f| f.contains(pc)) {
            Some(function) => (function.start, function.end),
            None => (pc, pc + FALLBACK_WINDOW),
        };
        self.disassembly_calls += 1;
        let instructions = backend.disassemble(start, end)?;
        trace!("Disassembled {} instructions in {start}-{end}", instructions.len());

        let mut found = None;
        for instruction in instructions {
            let info = InstructionInfo {
                offset: instruction.address.offset_from(start).unwrap_or_default(),
                mnemonic: instruction.mnemonic,
                operands: instruction.operands,
                size: instruction.size,
            };
            if instruction.address == pc {
                found = Some(info.clone());
            }
            if !bypass {
                self.entries.insert(instruction.address, info);
            }
        }
        if found.is_none() {
            debug!("No instruction decoded at {pc}");
        }
        Ok(found)
    }

    /// Number of cached instructions.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Number of backend disassembly calls made so far.
    #[must_use]
    pub fn disassembly_calls(&self) -> u64
    {
        self.disassembly_calls
    }
}
