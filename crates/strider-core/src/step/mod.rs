//! # Step Decisions
//!
//! At every stop the engine looks at the instruction under the program
//! counter and decides how the tracer should move on:
//!
//! - returns leave the frame when the engine earlier decided the frame is
//!   looping, and otherwise continue stepping;
//! - calls into a skipped module are stepped over, with a one-shot
//!   breakpoint on the return address so tracing resumes afterwards, and
//!   jumps into one are stepped over without it;
//! - branches inside the current function are followed, but counted, so
//!   that a tight loop eventually gets left;
//! - everything else is stepped into.
//!
//! Each stop also produces one trace line: address, offset into the
//! function, the instruction, the source location, the reconstructed
//! statement and any captured values.

pub mod instruction;
pub mod operands;
pub mod state;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use strider_utils::config::ConfiguredAction;
use strider_utils::TracerConfig;
use tracing::{debug, info, warn};

pub use instruction::{InstructionCache, InstructionInfo};
pub use operands::{classify_branch, parse_operands, BranchKind, Operand, OperandKind, Operands};
pub use state::{StepState, LOOP_TOLERANCE};

use crate::abi::AbiDescriptor;
use crate::backend::{DebuggerBackend, FrameInfo};
use crate::breakpoints::ReturnAddressBreakpointCache;
use crate::capture::{RegisterOperandCapture, ValueCapture};
use crate::error::TracerResult;
use crate::modules::{glob_match, ModuleCatalog, ModuleHit, SkipPolicy};
use crate::source::SourceStatementResolver;
use crate::types::{Address, Architecture, ResolvedSymbol, SourceLocation, ThreadId};

/// What to do after a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepAction
{
    /// Step into the next instruction or statement.
    StepIn,
    /// Step over the current instruction or statement.
    StepOver,
    /// Run until the current frame returns.
    StepOut,
    /// Resume without stepping.
    Continue,
}

impl From<ConfiguredAction> for StepAction
{
    fn from(action: ConfiguredAction) -> Self
    {
        match action {
            ConfiguredAction::StepIn => Self::StepIn,
            ConfiguredAction::StepOver => Self::StepOver,
            ConfiguredAction::StepOut => Self::StepOut,
            ConfiguredAction::Continue => Self::Continue,
        }
    }
}

impl fmt::Display for StepAction
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Self::StepIn => "step_in",
            Self::StepOver => "step_over",
            Self::StepOut => "step_out",
            Self::Continue => "continue",
        };
        write!(f, "{name}")
    }
}

/// Address-indexed tables shared by the engine and the event loop.
#[derive(Debug, Default)]
pub struct TraceTables
{
    /// Loaded modules
    pub modules: ModuleCatalog,
    /// Modules that are not stepped into
    pub skip: SkipPolicy,
    /// Return-address breakpoints planted for step-over
    pub return_breakpoints: ReturnAddressBreakpointCache,
}

impl TraceTables
{
    /// Tables for a session using `config`.
    #[must_use]
    pub fn new(config: &TracerConfig) -> Self
    {
        Self {
            modules: ModuleCatalog::new(),
            skip: SkipPolicy::new(config.skip_modules.clone()),
            return_breakpoints: ReturnAddressBreakpointCache::new(config.return_breakpoint_capacity),
        }
    }

    /// Re-enumerate modules and rebuild the skip ranges from them.
    ///
    /// ## Errors
    ///
    /// Propagates the backend's module enumeration failure.
    pub fn refresh(&mut self, backend: &dyn DebuggerBackend) -> TracerResult<usize>
    {
        let count = self.modules.load_modules(backend)?;
        self.skip.build_skip_ranges(self.modules.modules());
        Ok(count)
    }
}

/// Everything known about the instruction a thread is stopped at.
#[derive(Debug, Clone)]
pub struct StopPoint
{
    /// Thread that stopped
    pub thread: ThreadId,
    /// Innermost frame
    pub frame: FrameInfo,
    /// Function containing the program counter, when known
    pub function: Option<ResolvedSymbol>,
    /// Mnemonic of the instruction at the program counter
    pub mnemonic: String,
    /// Parsed operands
    pub operands: Operands,
    /// Address of the following instruction
    pub next_pc: Address,
    /// Indentation for log lines
    pub indent: String,
}

/// Decides step actions and writes the per-stop trace line.
pub struct StepDecisionEngine
{
    architecture: Architecture,
    abi: &'static AbiDescriptor,
    config: Arc<TracerConfig>,
    instructions: InstructionCache,
    sources: SourceStatementResolver,
    symbols: HashMap<Address, Option<ResolvedSymbol>>,
    capture: Box<dyn ValueCapture>,
}

impl fmt::Debug for StepDecisionEngine
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("StepDecisionEngine")
            .field("architecture", &self.architecture)
            .field("cached_instructions", &self.instructions.len())
            .field("cached_symbols", &self.symbols.len())
            .finish_non_exhaustive()
    }
}

impl StepDecisionEngine
{
    /// Create an engine for `architecture`.
    ///
    /// ## Errors
    ///
    /// `UnsupportedArchitecture` when there is no calling-convention table.
    pub fn new(architecture: Architecture, config: Arc<TracerConfig>) -> TracerResult<Self>
    {
        let abi = AbiDescriptor::for_architecture(architecture)?;
        Ok(Self {
            architecture,
            abi,
            sources: SourceStatementResolver::new(config.source_search_paths.clone()),
            config,
            instructions: InstructionCache::new(),
            symbols: HashMap::new(),
            capture: Box::new(RegisterOperandCapture),
        })
    }

    /// Replace the value capture collaborator.
    #[must_use]
    pub fn with_capture(mut self, capture: Box<dyn ValueCapture>) -> Self
    {
        self.capture = capture;
        self
    }

    /// Apply a reloaded configuration.
    pub fn update_config(&mut self, config: Arc<TracerConfig>)
    {
        self.sources.set_search_paths(config.source_search_paths.clone());
        self.config = config;
    }

    /// Calling conventions of the target.
    #[must_use]
    pub fn abi(&self) -> &'static AbiDescriptor
    {
        self.abi
    }

    /// Instruction cache (for inspection).
    #[must_use]
    pub fn instructions(&self) -> &InstructionCache
    {
        &self.instructions
    }

    /// Resolve `address` through the backend, remembering the answer.
    pub fn resolve_cached(&mut self, backend: &dyn DebuggerBackend, address: Address) -> Option<ResolvedSymbol>
    {
        self.symbols
            .entry(address)
            .or_insert_with(|| backend.resolve_address(address))
            .clone()
    }

    /// Handle a completed step of `thread`: log the stop and decide what to
    /// do next.
    ///
    /// ## Errors
    ///
    /// Propagates backend failures reading the frame, disassembling or
    /// planting a return breakpoint.
    pub fn on_step(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        tables: &mut TraceTables,
        state: &mut StepState,
        thread: ThreadId,
    ) -> TracerResult<StepAction>
    {
        let frame = backend.current_frame(thread)?;
        let depth = backend.frame_count(thread)?;
        let pc = frame.pc;
        let function = match frame.function.clone() {
            Some(function) => Some(function),
            None => self.resolve_cached(&*backend, pc),
        };

        let module_hint = function
            .as_ref()
            .map(|f| f.module.display().to_string())
            .unwrap_or_default();
        if tables.skip.should_skip(pc, &module_hint) {
            debug!("Stopped at {pc} inside skipped module {module_hint}, stepping out");
            return Ok(StepAction::StepOut);
        }

        let Some(info) = self
            .instructions
            .lookup(&*backend, pc, function.as_ref(), self.config.enable_jit)?
        else {
            warn!("No instruction at {pc}, stepping in");
            return Ok(StepAction::StepIn);
        };

        let operands = parse_operands(&info.operands);
        let indent = state.indent(depth);

        let location = frame.location.clone();
        let resolved_file = location
            .as_ref()
            .and_then(|loc| self.sources.resolve_path(&loc.file));
        let statement = match &location {
            Some(loc) => {
                let view: &dyn DebuggerBackend = &*backend;
                self.sources
                    .get_statement_source(loc, || view.line_entries(thread, 0).unwrap_or_default())
            }
            None => String::new(),
        };
        let captures = self.capture.capture(&*backend, thread, &operands);
        let source = source_info(location.as_ref(), resolved_file.as_ref());
        let line = render_step_line(&indent, pc, info.offset, &info.mnemonic, &info.operands, &source, &statement, &captures);
        info!(thread = %thread, pc = %pc, "{line}");

        if let Some(action) = self.configured_action(location.as_ref(), resolved_file.as_ref()) {
            debug!("Configured action {action} at {source}");
            return Ok(action);
        }

        if let Some(line_number) = location.as_ref().and_then(|loc| loc.line).filter(|line| *line > 0) {
            let visits = state.record_line(frame.cfa, line_number);
            if visits > LOOP_TOLERANCE {
                warn!("{indent}Line {line_number} visited {visits} times in frame {}, stepping out", frame.cfa);
                state.clear_frame(frame.cfa);
                return Ok(StepAction::StepOut);
            }
        }

        let stop = StopPoint {
            thread,
            next_pc: pc + u64::from(info.size),
            frame,
            function,
            mnemonic: info.mnemonic,
            operands,
            indent,
        };
        self.determine_action(backend, tables, state, &stop)
    }

    /// Decide the action for an already decoded stop.
    ///
    /// ## Errors
    ///
    /// Propagates a failure to plant the return breakpoint for a step-over.
    pub fn determine_action(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        tables: &mut TraceTables,
        state: &mut StepState,
        stop: &StopPoint,
    ) -> TracerResult<StepAction>
    {
        match classify_branch(self.architecture, &stop.mnemonic, &stop.operands) {
            BranchKind::Return => {
                self.log_return_value(&*backend, stop);
                state.clear_frame(stop.frame.cfa);
                if state.before_get_out {
                    state.before_get_out = false;
                    return Ok(StepAction::StepOut);
                }
                Ok(StepAction::StepIn)
            }
            kind @ (BranchKind::Direct | BranchKind::Indirect) => self.handle_branch(backend, tables, state, stop, kind),
            BranchKind::Unresolvable | BranchKind::None => Ok(StepAction::StepIn),
        }
    }

    fn handle_branch(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        tables: &mut TraceTables,
        state: &mut StepState,
        stop: &StopPoint,
        kind: BranchKind,
    ) -> TracerResult<StepAction>
    {
        let Some(target) = branch_target(&*backend, stop, kind) else {
            debug!("Branch target of {} {:?} unknown", stop.mnemonic, stop.operands);
            return Ok(StepAction::StepIn);
        };

        if is_internal_branch(stop.function.as_ref(), target) {
            let taken = state.record_branch(stop.frame.cfa, stop.next_pc);
            if taken > LOOP_TOLERANCE && !state.before_get_out {
                warn!(
                    "{}Branch at {} taken {taken} times in frame {}, leaving at next return",
                    stop.indent, stop.frame.pc, stop.frame.cfa
                );
                state.before_get_out = true;
            }
            return Ok(StepAction::StepIn);
        }

        let resolved = self.resolve_cached(&*backend, target);
        let hit = tables.modules.find_module_by_address(target);
        let module = match (&resolved, hit) {
            (Some(symbol), _) if !symbol.module.as_os_str().is_empty() => symbol.module.display().to_string(),
            (_, Some(hit)) => hit.module.path.display().to_string(),
            _ => String::new(),
        };
        let description = describe_target(resolved.as_ref(), hit.as_ref(), target);
        if !tables.skip.should_skip(target, &module) {
            return Ok(StepAction::StepIn);
        }

        // Jumps never come back to the next instruction; the stop inside the
        // skipped module steps out of it instead.
        if operands::is_call(self.architecture, &stop.mnemonic) {
            let id = tables.return_breakpoints.ensure_breakpoint(backend, stop.next_pc, true)?;
            debug!(
                "{}Stepping over call to {description} in {module} (return breakpoint {} at {})",
                stop.indent,
                id.raw(),
                stop.next_pc
            );
        } else {
            debug!("{}Stepping over jump to {description} in {module}", stop.indent);
        }
        Ok(StepAction::StepOver)
    }

    fn log_return_value(&self, backend: &dyn DebuggerBackend, stop: &StopPoint)
    {
        let name = describe_symbol(stop.function.as_ref(), stop.frame.pc);
        match self.abi.get_return_value(backend, stop.thread, 0) {
            Ok(value) => info!(thread = %stop.thread, "{}RETURN VALUE 0x{value:x} from {name}", stop.indent),
            Err(e) => debug!("Could not read return value of {name}: {e}"),
        }
    }

    fn configured_action(&self, location: Option<&SourceLocation>, resolved: Option<&PathBuf>) -> Option<StepAction>
    {
        let location = location?;
        let resolved = resolved.map(|path| path.display().to_string());
        let keys = [Some(location.file.as_str()), resolved.as_deref()];

        if let Some(line) = location.line {
            let rule = keys
                .iter()
                .flatten()
                .find_map(|key| self.config.step_action.get(*key))
                .filter(|rule| rule.covers(line));
            if let Some(rule) = rule {
                return Some(rule.action.into());
            }
        }

        let skipped = keys.iter().flatten().any(|key| {
            self.config
                .skip_source_files
                .iter()
                .any(|pattern| glob_match(pattern, key))
        });
        skipped.then_some(StepAction::StepOver)
    }
}

/// Whether `target` lies inside the function being executed.
#[must_use]
pub fn is_internal_branch(function: Option<&ResolvedSymbol>, target: Address) -> bool
{
    function.is_some_and(|function| !target.is_null() && function.contains(target))
}

fn branch_target(backend: &dyn DebuggerBackend, stop: &StopPoint, kind: BranchKind) -> Option<Address>
{
    match kind {
        BranchKind::Direct => stop.operands.iter().rev().find_map(Operand::address),
        BranchKind::Indirect => {
            let register = stop.operands.iter().find_map(Operand::register_name)?;
            backend
                .read_register(stop.thread, 0, register)
                .ok()
                .map(Address::new)
                .filter(|addr| !addr.is_null())
        }
        _ => None,
    }
}

/// Symbol name, else "module`section+0xoffset", else the bare address.
fn describe_target(symbol: Option<&ResolvedSymbol>, hit: Option<&ModuleHit<'_>>, address: Address) -> String
{
    match (symbol, hit) {
        (Some(symbol), _) if !symbol.name.is_empty() => symbol.name.clone(),
        (_, Some(hit)) => format!("{}`{}+0x{:x}", hit.module.basename(), hit.section.name, hit.offset),
        _ => format!("0x{:x}", address.value()),
    }
}

fn describe_symbol(symbol: Option<&ResolvedSymbol>, address: Address) -> String
{
    match symbol {
        Some(symbol) if !symbol.name.is_empty() => symbol.name.clone(),
        _ => format!("0x{:x}", address.value()),
    }
}

/// `file:line:col` for a stop, using the resolved path when there is one.
///
/// A zero column is left out; a missing line renders as `file:<no line>`,
/// and no location at all as `<no line>`.
#[must_use]
pub fn source_info(location: Option<&SourceLocation>, resolved: Option<&PathBuf>) -> String
{
    let Some(location) = location else {
        return "<no line>".to_string();
    };
    let file = resolved.map_or_else(|| location.file.clone(), |path| path.display().to_string());
    match (location.line.filter(|l| *l > 0), location.column.filter(|c| *c > 0)) {
        (Some(line), Some(column)) => format!("{file}:{line}:{column}"),
        (Some(line), None) => format!("{file}:{line}"),
        (None, _) => format!("{file}:<no line>"),
    }
}

/// One trace line.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn render_step_line(
    indent: &str,
    pc: Address,
    offset: u64,
    mnemonic: &str,
    operands: &str,
    source: &str,
    statement: &str,
    captures: &[String],
) -> String
{
    let values = if captures.is_empty() {
        String::new()
    } else {
        format!(" -> {}", captures.join(", "))
    };
    if statement.is_empty() {
        format!("{indent}0x{:x} <+{offset}> {mnemonic} {operands} ; {source}{values}", pc.value())
    } else {
        format!("{indent}0x{:x} <+{offset}> {mnemonic} {operands} ; {source} // {statement}{values}", pc.value())
    }
}
