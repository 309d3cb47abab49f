//! Scripted debugger backend shared by the integration tests.
//!
//! The backend answers queries from fixed tables and records every command
//! the tracer issues. The command log is shared through an `Rc` so tests can
//! inspect it after handing the backend to a session.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use strider_core::backend::{
    DebuggerBackend, DisassembledInstruction, FrameInfo, LaunchRequest, ModuleDescriptor, SectionDescriptor, StepCommand,
};
use strider_core::breakpoints::BreakpointId;
use strider_core::error::{TracerError, TracerResult};
use strider_core::events::{ProcessEvent, StopReason};
use strider_core::types::{
    Address, Architecture, LineEntry, ProcessId, ProcessState, ResolvedSymbol, SourceLocation, SymbolKind, ThreadId,
};

pub const THREAD: ThreadId = ThreadId(1);
pub const CFA: Address = Address::new(0x7ff0_0000);

/// A command the tracer sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command
{
    Launch(PathBuf),
    CreateBreakpoint(Address),
    CreateBreakpointByName(String),
    OneShot(BreakpointId, bool),
    Enable(BreakpointId, bool),
    Delete(BreakpointId),
    Step(ThreadId, StepCommand),
    Resume,
}

/// One scripted process event.
#[derive(Debug, Clone)]
pub enum Scripted
{
    /// The selected thread stops at `pc` for `reason`.
    Stop
    {
        reason: StopReason,
        pc: u64,
    },
    /// Any other event, delivered as is.
    Event(ProcessEvent),
}

/// Backend double driven from tables.
#[derive(Debug)]
pub struct ScriptedBackend
{
    pub architecture: Architecture,
    pub modules: Vec<ModuleDescriptor>,
    pub symbols: Vec<ResolvedSymbol>,
    pub instructions: Vec<DisassembledInstruction>,
    pub registers: HashMap<String, u64>,
    pub memory: Vec<(Address, Vec<u8>)>,
    pub lines: Vec<LineEntry>,
    pub location: Option<SourceLocation>,
    pub pc: Address,
    pub depth: usize,
    pub reason: StopReason,
    pub script: VecDeque<Scripted>,
    pub log: Rc<RefCell<Vec<Command>>>,
    next_breakpoint: u64,
}

impl ScriptedBackend
{
    pub fn new(architecture: Architecture) -> Self
    {
        Self {
            architecture,
            modules: Vec::new(),
            symbols: Vec::new(),
            instructions: Vec::new(),
            registers: HashMap::new(),
            memory: Vec::new(),
            lines: Vec::new(),
            location: None,
            pc: Address::ZERO,
            depth: 1,
            reason: StopReason::None,
            script: VecDeque::new(),
            log: Rc::new(RefCell::new(Vec::new())),
            next_breakpoint: 0,
        }
    }

    /// Add a module with a single `__TEXT` section.
    pub fn with_module(mut self, path: &str, start: u64, size: u64) -> Self
    {
        self.modules.push(ModuleDescriptor {
            path: PathBuf::from(path),
            sections: vec![SectionDescriptor {
                name: "__TEXT".to_string(),
                load_address: Some(Address::new(start)),
                size,
            }],
        });
        self
    }

    pub fn with_symbol(mut self, name: &str, module: &str, start: u64, end: u64) -> Self
    {
        self.symbols.push(ResolvedSymbol {
            name: name.to_string(),
            module: PathBuf::from(module),
            kind: SymbolKind::Code,
            start: Address::new(start),
            end: Address::new(end),
            prologue_size: 0,
        });
        self
    }

    pub fn with_instruction(mut self, address: u64, mnemonic: &str, operands: &str) -> Self
    {
        self.instructions.push(DisassembledInstruction {
            address: Address::new(address),
            mnemonic: mnemonic.to_string(),
            operands: operands.to_string(),
            size: 4,
        });
        self
    }

    pub fn with_register(mut self, name: &str, value: u64) -> Self
    {
        self.registers.insert(name.to_string(), value);
        self
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = Scripted>) -> Self
    {
        self.script.extend(script);
        self
    }

    /// Handle on the command log that survives boxing the backend.
    pub fn commands(&self) -> Rc<RefCell<Vec<Command>>>
    {
        Rc::clone(&self.log)
    }

    fn record(&self, command: Command)
    {
        self.log.borrow_mut().push(command);
    }
}

/// Commands of one kind, in order.
pub fn count(log: &Rc<RefCell<Vec<Command>>>, wanted: &Command) -> usize
{
    log.borrow().iter().filter(|command| *command == wanted).count()
}

/// Only the step and resume commands, in order.
pub fn run_control(log: &Rc<RefCell<Vec<Command>>>) -> Vec<Command>
{
    log.borrow()
        .iter()
        .filter(|command| matches!(command, Command::Step(..) | Command::Resume))
        .cloned()
        .collect()
}

impl DebuggerBackend for ScriptedBackend
{
    fn launch(&mut self, request: &LaunchRequest) -> TracerResult<ProcessId>
    {
        self.record(Command::Launch(request.program.clone()));
        Ok(ProcessId(4242))
    }

    fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    fn modules(&self) -> TracerResult<Vec<ModuleDescriptor>>
    {
        Ok(self.modules.clone())
    }

    fn resolve_address(&self, address: Address) -> Option<ResolvedSymbol>
    {
        self.symbols.iter().find(|symbol| symbol.contains(address)).cloned()
    }

    fn read_register(&self, _thread: ThreadId, _frame: usize, name: &str) -> TracerResult<u64>
    {
        self.registers
            .get(name)
            .copied()
            .ok_or_else(|| TracerError::RegisterReadFailed(name.to_string()))
    }

    fn read_memory(&self, address: Address, length: usize) -> TracerResult<Vec<u8>>
    {
        for (start, bytes) in &self.memory {
            let Some(offset) = address.offset_from(*start) else {
                continue;
            };
            let offset = usize::try_from(offset).unwrap_or(usize::MAX);
            if let Some(slice) = offset.checked_add(length).and_then(|end| bytes.get(offset..end)) {
                return Ok(slice.to_vec());
            }
        }
        Err(TracerError::MemoryReadFailed { address, length })
    }

    fn create_breakpoint(&mut self, address: Address) -> TracerResult<BreakpointId>
    {
        self.record(Command::CreateBreakpoint(address));
        self.next_breakpoint += 1;
        Ok(BreakpointId::from_raw(self.next_breakpoint))
    }

    fn create_breakpoint_by_name(&mut self, name: &str) -> TracerResult<BreakpointId>
    {
        self.record(Command::CreateBreakpointByName(name.to_string()));
        self.next_breakpoint += 1;
        Ok(BreakpointId::from_raw(self.next_breakpoint))
    }

    fn set_breakpoint_one_shot(&mut self, id: BreakpointId, one_shot: bool) -> TracerResult<()>
    {
        self.record(Command::OneShot(id, one_shot));
        Ok(())
    }

    fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> TracerResult<()>
    {
        self.record(Command::Enable(id, enabled));
        Ok(())
    }

    fn delete_breakpoint(&mut self, id: BreakpointId) -> TracerResult<()>
    {
        self.record(Command::Delete(id));
        Ok(())
    }

    fn step(&mut self, thread: ThreadId, command: StepCommand) -> TracerResult<()>
    {
        self.record(Command::Step(thread, command));
        Ok(())
    }

    fn resume(&mut self) -> TracerResult<()>
    {
        self.record(Command::Resume);
        Ok(())
    }

    fn selected_thread(&self) -> Option<ThreadId>
    {
        Some(THREAD)
    }

    fn stop_reason(&self, _thread: ThreadId) -> StopReason
    {
        self.reason.clone()
    }

    fn frames(&self, _thread: ThreadId) -> TracerResult<Vec<FrameInfo>>
    {
        let innermost = FrameInfo {
            index: 0,
            pc: self.pc,
            cfa: CFA,
            function: None,
            location: self.location.clone(),
        };
        let callers = (1..self.depth).map(|index| FrameInfo {
            index,
            pc: Address::ZERO,
            cfa: CFA + (index as u64) * 0x100,
            function: None,
            location: None,
        });
        Ok(std::iter::once(innermost).chain(callers).collect())
    }

    fn line_entries(&self, _thread: ThreadId, _frame: usize) -> TracerResult<Vec<LineEntry>>
    {
        Ok(self.lines.clone())
    }

    fn disassemble(&self, start: Address, end: Address) -> TracerResult<Vec<DisassembledInstruction>>
    {
        Ok(self
            .instructions
            .iter()
            .filter(|instruction| instruction.address >= start && instruction.address < end)
            .cloned()
            .collect())
    }

    fn wait_for_event(&mut self, _timeout: Duration) -> TracerResult<Option<ProcessEvent>>
    {
        match self.script.pop_front() {
            Some(Scripted::Stop { reason, pc }) => {
                self.reason = reason;
                self.pc = Address::new(pc);
                Ok(Some(ProcessEvent::StateChanged(ProcessState::Stopped)))
            }
            Some(Scripted::Event(event)) => Ok(Some(event)),
            None => Err(TracerError::command("wait_for_event", "script exhausted")),
        }
    }
}
