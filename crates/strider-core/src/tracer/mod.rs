//! # Trace Session
//!
//! The event loop that drives a traced process from launch to exit.
//!
//! ## Lifecycle
//!
//! 1. A one-shot breakpoint goes on the program's entry symbol (usually
//!    `main`), then the process is launched.
//! 2. When that breakpoint fires the dynamic loader has mapped the startup
//!    libraries: the module table and skip ranges are built, optionally the
//!    module picker runs, and single-stepping starts.
//! 3. Each completed step, and each breakpoint a traced thread stops at, is
//!    handed to the [`StepDecisionEngine`], whose answer becomes the next
//!    step command.
//! 4. The loop ends when the process exits, crashes, or detaches.
//!
//! The loop is strictly sequential: one event is fully handled, and its
//! command issued, before the next event is awaited.

pub mod hooks;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strider_utils::{ConfigStore, StepGranularity, TracerConfig};
use tracing::{debug, error, info, warn};

pub use hooks::LibcHooks;

use crate::backend::{DebuggerBackend, LaunchRequest, StepCommand};
use crate::breakpoints::BreakpointId;
use crate::capture::ValueCapture;
use crate::error::{TracerError, TracerResult};
use crate::events::{is_fatal_signal, signal_name, ProcessEvent, StopReason, ThreadLifecycle};
use crate::modules::Module;
use crate::step::{StepAction, StepDecisionEngine, StepState, TraceTables};
use crate::symbols::find_entry_point;
use crate::types::{Address, ProcessState, ThreadId};

/// How long one wait for a process event may block.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);
/// Polls for a stop reason before giving up and resuming.
pub const STOP_REASON_RETRIES: u32 = 10;
/// Delay between stop reason polls.
pub const STOP_REASON_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Library function whose calls create threads.
pub const THREAD_CREATE_SYMBOL: &str = "pthread_create";
/// Argument index of the new thread's start routine.
pub const THREAD_START_ARG: usize = 2;
/// Frames logged when the target receives a fatal signal.
pub const MAX_CRASH_FRAMES: usize = 5;

/// Interactive choice of the modules to keep tracing.
pub trait ModuleSelector
{
    /// Show `modules` and return the paths the user wants to keep, or
    /// `None` if the selection was cancelled.
    ///
    /// ## Errors
    ///
    /// Fails if the selection UI cannot run.
    fn select_modules_to_keep(&mut self, modules: &[Module]) -> TracerResult<Option<Vec<PathBuf>>>;
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit
{
    /// The target exited with this status.
    Exited(i32),
    /// The target crashed.
    Crashed(String),
    /// The backend lost the process.
    Detached,
    /// The module list was written to the configuration; nothing was traced.
    ModulesDumped,
    /// Tracing stopped on a machine exception.
    Stopped,
}

impl fmt::Display for SessionExit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Exited(status) => write!(f, "exited with status {status}"),
            Self::Crashed(description) => write!(f, "crashed: {description}"),
            Self::Detached => write!(f, "detached"),
            Self::ModulesDumped => write!(f, "module list saved"),
            Self::Stopped => write!(f, "stopped on exception"),
        }
    }
}

/// Result of [`TraceSession::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome
{
    /// How the session ended
    pub exit: SessionExit,
    /// Step decisions made
    pub steps: u64,
}

impl SessionOutcome
{
    /// Process exit code for the tracer itself.
    #[must_use]
    pub fn exit_code(&self) -> i32
    {
        match self.exit {
            SessionExit::Exited(status) => status,
            SessionExit::Crashed(_) | SessionExit::Stopped => 1,
            SessionExit::Detached | SessionExit::ModulesDumped => 0,
        }
    }
}

/// Native step primitive for `action` at `granularity`; `None` means resume.
#[must_use]
pub fn step_command(granularity: StepGranularity, action: StepAction) -> Option<StepCommand>
{
    match (granularity, action) {
        (_, StepAction::Continue) => None,
        (_, StepAction::StepOut) => Some(StepCommand::SourceOut),
        (StepGranularity::Instruction, StepAction::StepIn) => Some(StepCommand::InstructionInto),
        (StepGranularity::Instruction, StepAction::StepOver) => Some(StepCommand::InstructionOver),
        (StepGranularity::Source, StepAction::StepIn) => Some(StepCommand::SourceInto),
        (StepGranularity::Source, StepAction::StepOver) => Some(StepCommand::SourceOver),
    }
}

/// One traced run of a program.
pub struct TraceSession
{
    backend: Box<dyn DebuggerBackend>,
    store: Arc<ConfigStore>,
    config: Arc<TracerConfig>,
    request: LaunchRequest,
    selector: Option<Box<dyn ModuleSelector>>,
    capture: Option<Box<dyn ValueCapture>>,
    engine: Option<StepDecisionEngine>,
    tables: TraceTables,
    states: HashMap<ThreadId, StepState>,
    hooks: LibcHooks,
    entry_breakpoint: Option<BreakpointId>,
    thread_create_breakpoint: Option<BreakpointId>,
    thread_starts: HashMap<Address, BreakpointId>,
    breakpoint_seen: HashSet<BreakpointId>,
    entry_reached: bool,
    main_thread: Option<ThreadId>,
    free_running: bool,
    steps: u64,
}

impl fmt::Debug for TraceSession
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TraceSession")
            .field("program", &self.request.program)
            .field("entry_reached", &self.entry_reached)
            .field("main_thread", &self.main_thread)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl TraceSession
{
    /// Prepare a session; nothing happens until [`run`](Self::run).
    #[must_use]
    pub fn new(backend: Box<dyn DebuggerBackend>, store: Arc<ConfigStore>, request: LaunchRequest) -> Self
    {
        let config = store.snapshot();
        Self {
            backend,
            tables: TraceTables::new(&config),
            store,
            config,
            request,
            selector: None,
            capture: None,
            engine: None,
            states: HashMap::new(),
            hooks: LibcHooks::new(),
            entry_breakpoint: None,
            thread_create_breakpoint: None,
            thread_starts: HashMap::new(),
            breakpoint_seen: HashSet::new(),
            entry_reached: false,
            main_thread: None,
            free_running: false,
            steps: 0,
        }
    }

    /// Use `selector` when `dump_modules_for_skip` is set.
    #[must_use]
    pub fn with_selector(mut self, selector: Box<dyn ModuleSelector>) -> Self
    {
        self.selector = Some(selector);
        self
    }

    /// Replace the default register capture.
    #[must_use]
    pub fn with_capture(mut self, capture: Box<dyn ValueCapture>) -> Self
    {
        self.capture = Some(capture);
        self
    }

    /// Launch the program and trace it until it ends.
    ///
    /// ## Errors
    ///
    /// Fails if the program cannot be launched, its architecture is not
    /// supported, or the connection to the process is lost. Failures while
    /// handling a single stop are logged and the process is resumed.
    pub fn run(mut self) -> TracerResult<SessionOutcome>
    {
        self.prepare()?;
        loop {
            self.sync_config();
            let event = match self.backend.wait_for_event(EVENT_TIMEOUT)? {
                Some(event) => event,
                None => continue,
            };
            let state = match event {
                ProcessEvent::Stdout(line) => {
                    info!(target: "strider::stdout", "{line}");
                    continue;
                }
                ProcessEvent::Stderr(line) => {
                    info!(target: "strider::stderr", "{line}");
                    continue;
                }
                ProcessEvent::StateChanged(state) => state,
            };

            let exit = match state {
                ProcessState::Running => None,
                ProcessState::Stopped => match self.handle_stop() {
                    Ok(exit) => exit,
                    Err(e) => {
                        error!("Failed to handle stop: {e}");
                        self.backend.resume()?;
                        None
                    }
                },
                ProcessState::Exited { status, description } => {
                    match description {
                        Some(text) => info!("Process exited with status {status} ({text})"),
                        None => info!("Process exited with status {status}"),
                    }
                    Some(SessionExit::Exited(status))
                }
                ProcessState::Crashed { description } => {
                    let description = description.unwrap_or_else(|| "unknown".to_string());
                    error!("Process crashed: {description}");
                    Some(SessionExit::Crashed(description))
                }
                ProcessState::Detached => {
                    warn!("Process detached");
                    Some(SessionExit::Detached)
                }
            };

            if let Some(exit) = exit {
                self.states.clear();
                info!("Session {exit} after {} steps", self.steps);
                return Ok(SessionOutcome { exit, steps: self.steps });
            }
        }
    }

    fn prepare(&mut self) -> TracerResult<()>
    {
        let entry_name = match find_entry_point(&self.request.program) {
            Ok(entry) => entry.breakpoint_name().to_string(),
            Err(e) => {
                warn!("Could not read entry point of {}: {e}; using main", self.request.program.display());
                "main".to_string()
            }
        };
        let entry = self.backend.create_breakpoint_by_name(&entry_name)?;
        self.backend.set_breakpoint_one_shot(entry, true)?;
        self.entry_breakpoint = Some(entry);
        debug!("Entry breakpoint {} on {entry_name}", entry.raw());

        match self.backend.create_breakpoint_by_name(THREAD_CREATE_SYMBOL) {
            Ok(id) => self.thread_create_breakpoint = Some(id),
            Err(e) => warn!("Threads created later will not be traced: {e}"),
        }
        let hooked = self.hooks.install(self.backend.as_mut(), &self.config.libc_functions);
        if hooked > 0 {
            info!("Hooked {hooked} library functions");
        }

        let mut request = self.request.clone();
        request
            .environment
            .extend(self.config.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
        let pid = self.backend.launch(&request)?;

        let architecture = self.backend.architecture();
        let mut engine = StepDecisionEngine::new(architecture, Arc::clone(&self.config))?;
        if let Some(capture) = self.capture.take() {
            engine = engine.with_capture(capture);
        }
        self.hooks.set_abi(engine.abi());
        self.engine = Some(engine);

        if self.config.log_target_info {
            info!(
                "Launched {} (pid {pid}, {architecture}) with args {:?}",
                request.program.display(),
                request.args
            );
        }
        Ok(())
    }

    fn sync_config(&mut self)
    {
        let latest = self.store.snapshot();
        if Arc::ptr_eq(&latest, &self.config) {
            return;
        }
        debug!("Configuration changed, applying");
        if latest.skip_modules != self.config.skip_modules {
            self.tables.skip.set_patterns(latest.skip_modules.clone());
            self.tables.skip.build_skip_ranges(self.tables.modules.modules());
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.update_config(Arc::clone(&latest));
        }
        self.config = latest;
    }

    fn handle_stop(&mut self) -> TracerResult<Option<SessionExit>>
    {
        let Some(thread) = self.backend.selected_thread() else {
            warn!("Stopped without a selected thread, resuming");
            self.backend.resume()?;
            return Ok(None);
        };

        match self.stop_reason_with_retry(thread) {
            StopReason::None => {
                warn!("No stop reason for thread {thread} after {STOP_REASON_RETRIES} polls, resuming");
                self.backend.resume()?;
            }
            StopReason::Breakpoint(id) => return self.on_breakpoint(thread, id),
            StopReason::PlanComplete => self.on_plan_complete(thread)?,
            StopReason::Signal(signo) => self.on_signal(thread, signo)?,
            StopReason::Exception(description) => {
                error!("Thread {thread} stopped on exception: {description}");
                self.log_backtrace(thread);
                return Ok(Some(SessionExit::Stopped));
            }
            StopReason::ThreadLifecycle(change) => {
                debug!("Thread {thread}: {change:?}");
                if change == ThreadLifecycle::Exiting {
                    self.states.remove(&thread);
                }
                self.backend.resume()?;
            }
            reason @ (StopReason::Watchpoint { .. } | StopReason::Other(_)) => {
                info!("Thread {thread} stopped: {reason}");
                self.backend.resume()?;
            }
        }
        Ok(None)
    }

    fn stop_reason_with_retry(&self, thread: ThreadId) -> StopReason
    {
        for attempt in 0..STOP_REASON_RETRIES {
            let reason = self.backend.stop_reason(thread);
            if reason != StopReason::None {
                return reason;
            }
            if attempt + 1 < STOP_REASON_RETRIES {
                thread::sleep(STOP_REASON_RETRY_DELAY);
            }
        }
        StopReason::None
    }

    fn on_breakpoint(&mut self, thread: ThreadId, id: Option<BreakpointId>) -> TracerResult<Option<SessionExit>>
    {
        let pc = self.backend.current_frame(thread)?.pc;

        let is_return_trap = match id {
            None => true,
            Some(id) => self.tables.return_breakpoints.owns(id) && self.tables.return_breakpoints.contains(pc),
        };
        if is_return_trap || self.hooks.is_pending_return(thread, pc) {
            self.tables.return_breakpoints.record_hit(pc);
            self.hooks.on_return(self.backend.as_ref(), thread, pc);
            self.continue_tracing(thread)?;
            return Ok(None);
        }

        let Some(id) = id else {
            return Ok(None);
        };
        if Some(id) == self.entry_breakpoint && !self.entry_reached {
            return self.on_entry(thread);
        }
        if Some(id) == self.thread_create_breakpoint {
            self.on_thread_create(thread)?;
            self.backend.resume()?;
            return Ok(None);
        }
        if self.breakpoint_seen.contains(&id) {
            info!("Thread {thread} started at {pc}");
            self.states.entry(thread).or_default();
            self.trace_step(thread)?;
            return Ok(None);
        }
        if self.hooks.function_for(id).is_some() {
            self.hooks
                .on_call(self.backend.as_mut(), &mut self.tables.return_breakpoints, thread, id)?;
            self.backend.resume()?;
            return Ok(None);
        }

        if self.config.log_breakpoint_details {
            info!("Thread {thread} hit breakpoint {} at {pc}", id.raw());
        }
        self.continue_tracing(thread)?;
        Ok(None)
    }

    fn on_entry(&mut self, thread: ThreadId) -> TracerResult<Option<SessionExit>>
    {
        self.entry_reached = true;
        self.main_thread = Some(thread);

        let count = self.tables.refresh(self.backend.as_ref())?;
        if self.config.log_module_info {
            self.tables.modules.log_modules();
        }
        info!(
            "Entry point reached on thread {thread}: {count} modules, {} skip ranges",
            self.tables.skip.entries().len()
        );

        if self.config.dump_modules_for_skip {
            self.dump_modules_for_skip()?;
            return Ok(Some(SessionExit::ModulesDumped));
        }

        if let Some(entry) = self.entry_breakpoint {
            if let Err(e) = self.backend.set_breakpoint_enabled(entry, false) {
                debug!("Entry breakpoint already gone: {e}");
            }
        }
        self.states.entry(thread).or_default();
        self.issue(thread, StepAction::StepIn)?;
        Ok(None)
    }

    fn dump_modules_for_skip(&mut self) -> TracerResult<()>
    {
        let selector = self
            .selector
            .as_mut()
            .ok_or_else(|| TracerError::Ui("no module selector available".to_string()))?;
        let Some(keep) = selector.select_modules_to_keep(self.tables.modules.modules())? else {
            info!("Module selection cancelled, configuration unchanged");
            return Ok(());
        };

        let mut skip: Vec<String> = self
            .tables
            .modules
            .modules()
            .iter()
            .filter(|module| !keep.contains(&module.path))
            .map(|module| module.basename().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        skip.sort();
        skip.dedup();

        let merged = self.store.save_skip_modules(&skip)?;
        info!(
            "Saved {} skip patterns ({} new) to {}",
            merged.len(),
            skip.len(),
            self.store.path().display()
        );
        Ok(())
    }

    fn on_thread_create(&mut self, thread: ThreadId) -> TracerResult<()>
    {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let Some(register) = engine.abi().arg_register(THREAD_START_ARG) else {
            return Ok(());
        };
        let routine = Address::new(self.backend.read_register(thread, 0, register)?);
        if routine.is_null() {
            return Ok(());
        }

        let symbol = engine.resolve_cached(self.backend.as_ref(), routine);
        let body = match &symbol {
            Some(symbol) if symbol.start == routine => routine + symbol.prologue_size,
            _ => routine,
        };
        if self.thread_starts.contains_key(&body) {
            return Ok(());
        }

        let id = self.backend.create_breakpoint(body)?;
        self.thread_starts.insert(body, id);
        self.breakpoint_seen.insert(id);
        let name = symbol.map_or_else(|| format!("{routine}"), |s| s.name);
        info!("Thread start routine {name} at {body}, breakpoint {}", id.raw());
        Ok(())
    }

    fn on_plan_complete(&mut self, thread: ThreadId) -> TracerResult<()>
    {
        self.trace_step(thread)
    }

    /// Log the stop of `thread` and issue the engine's next command.
    ///
    /// Before the entry point and after the step budget the target just runs.
    fn trace_step(&mut self, thread: ThreadId) -> TracerResult<()>
    {
        if !self.entry_reached || self.free_running {
            return self.backend.resume();
        }
        if self.config.step_budget_exhausted(self.steps) {
            info!("Step budget of {} reached, letting the target run", self.config.max_steps);
            self.free_running = true;
            self.tables.return_breakpoints.clear(self.backend.as_mut());
            return self.backend.resume();
        }

        let Some(engine) = self.engine.as_mut() else {
            return self.backend.resume();
        };
        let state = self.states.entry(thread).or_default();
        let action = engine.on_step(self.backend.as_mut(), &mut self.tables, state, thread)?;
        self.steps += 1;
        self.issue(thread, action)
    }

    fn on_signal(&mut self, thread: ThreadId, signo: i32) -> TracerResult<()>
    {
        let name = signal_name(signo);
        if is_fatal_signal(signo) {
            error!("Thread {thread} received {name} ({signo})");
            self.log_backtrace(thread);
            return self.backend.resume();
        }
        if signo == libc::SIGSTOP {
            debug!("Thread {thread} stopped by SIGSTOP");
        } else {
            info!("Thread {thread} received {name} ({signo})");
        }
        self.keep_stepping(thread)
    }

    /// Run the engine on a breakpoint stop of a traced thread, otherwise resume.
    fn continue_tracing(&mut self, thread: ThreadId) -> TracerResult<()>
    {
        if self.states.contains_key(&thread) {
            self.trace_step(thread)
        } else {
            self.backend.resume()
        }
    }

    /// Repeat the interrupted step of a traced thread, otherwise resume.
    fn keep_stepping(&mut self, thread: ThreadId) -> TracerResult<()>
    {
        if self.entry_reached && !self.free_running && self.states.contains_key(&thread) {
            self.issue(thread, StepAction::StepIn)
        } else {
            self.backend.resume()
        }
    }

    fn issue(&mut self, thread: ThreadId, action: StepAction) -> TracerResult<()>
    {
        match step_command(self.config.log_mode, action) {
            Some(command) => self.backend.step(thread, command),
            None => self.backend.resume(),
        }
    }

    fn log_backtrace(&self, thread: ThreadId)
    {
        let frames = match self.backend.frames(thread) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Could not walk the stack of thread {thread}: {e}");
                return;
            }
        };
        for frame in frames.iter().take(MAX_CRASH_FRAMES) {
            let function = frame.function.as_ref().map_or("??", |f| f.name.as_str());
            match &frame.location {
                Some(location) => error!("  #{} {} {function} at {location}", frame.index, frame.pc),
                None => error!("  #{} {} {function}", frame.index, frame.pc),
            }
        }
    }
}
