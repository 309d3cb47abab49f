//! Values shown next to each traced instruction.

use crate::backend::DebuggerBackend;
use crate::step::operands::Operand;
use crate::types::ThreadId;

/// Produces `name=value` strings for a stop.
///
/// Implementations must not fail: anything they cannot read is left out.
pub trait ValueCapture
{
    /// Values for the instruction at the top frame of `thread`.
    fn capture(&mut self, backend: &dyn DebuggerBackend, thread: ThreadId, operands: &[Operand]) -> Vec<String>;
}

/// Shows the current value of every register operand.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOperandCapture;

impl ValueCapture for RegisterOperandCapture
{
    fn capture(&mut self, backend: &dyn DebuggerBackend, thread: ThreadId, operands: &[Operand]) -> Vec<String>
    {
        operands
            .iter()
            .filter_map(Operand::register_name)
            .filter_map(|name| {
                let value = backend.read_register(thread, 0, name).ok()?;
                Some(format!("{name}=0x{value:x}"))
            })
            .collect()
    }
}

/// Captures nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

impl ValueCapture for NoCapture
{
    fn capture(&mut self, _backend: &dyn DebuggerBackend, _thread: ThreadId, _operands: &[Operand]) -> Vec<String>
    {
        Vec::new()
    }
}
