//! Library call interception.
//!
//! Every function named in `libc_functions` gets a by-name breakpoint. When
//! one fires, the call's arguments are decoded and logged, and a one-shot
//! breakpoint on the return address catches the result.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::abi::{AbiDescriptor, LibcArgDecoder};
use crate::backend::DebuggerBackend;
use crate::breakpoints::{BreakpointId, ReturnAddressBreakpointCache};
use crate::error::TracerResult;
use crate::types::{Address, ThreadId};

/// Argument registers read for every intercepted call.
pub const HOOK_ARG_COUNT: usize = 6;

/// Breakpoints on library functions and the calls still waiting to return.
#[derive(Debug, Default)]
pub struct LibcHooks
{
    functions: HashMap<BreakpointId, String>,
    pending: HashMap<(ThreadId, Address), String>,
    decoder: Option<LibcArgDecoder>,
}

impl LibcHooks
{
    /// No hooks installed.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Set breakpoints on each function in `functions`. Functions the
    /// backend cannot break on are logged and skipped. Returns how many
    /// hooks are active.
    pub fn install(&mut self, backend: &mut dyn DebuggerBackend, functions: &[String]) -> usize
    {
        for name in functions {
            if self.functions.values().any(|existing| existing == name) {
                continue;
            }
            match backend.create_breakpoint_by_name(name) {
                Ok(id) => {
                    debug!("Hooked {name} with breakpoint {}", id.raw());
                    self.functions.insert(id, name.clone());
                }
                Err(e) => warn!("Cannot hook {name}: {e}"),
            }
        }
        self.functions.len()
    }

    /// Use `abi` to decode arguments from now on.
    pub fn set_abi(&mut self, abi: &'static AbiDescriptor)
    {
        self.decoder = Some(LibcArgDecoder::new(abi));
    }

    /// Function hooked by breakpoint `id`.
    #[must_use]
    pub fn function_for(&self, id: BreakpointId) -> Option<&str>
    {
        self.functions.get(&id).map(String::as_str)
    }

    /// Whether a call on `thread` is waiting for its return at `address`.
    #[must_use]
    pub fn is_pending_return(&self, thread: ThreadId, address: Address) -> bool
    {
        self.pending.contains_key(&(thread, address))
    }

    /// Log the call that hit hook `id` and arm a breakpoint for its return.
    ///
    /// Returns the logged `-> CALL` line, or `None` if `id` is not a hook.
    ///
    /// ## Errors
    ///
    /// Propagates failures to read the return address or plant the return
    /// breakpoint.
    pub fn on_call(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        breakpoints: &mut ReturnAddressBreakpointCache,
        thread: ThreadId,
        id: BreakpointId,
    ) -> TracerResult<Option<String>>
    {
        let Some(name) = self.functions.get(&id).cloned() else {
            return Ok(None);
        };
        let Some(decoder) = &self.decoder else {
            return Ok(None);
        };
        let abi = decoder.abi();
        let args = abi.get_args(&*backend, thread, 0, HOOK_ARG_COUNT);
        let rendered = decoder.parse(&name, &args, &*backend).join(", ");
        let line = format!("-> CALL {name}({rendered})");
        info!(thread = %thread, "{line}");

        let return_address = abi.get_return_address(&*backend, thread, 0)?;
        breakpoints.ensure_breakpoint(backend, return_address, true)?;
        self.pending.insert((thread, return_address), name);
        Ok(Some(line))
    }

    /// Log the result of a pending call returning to `address` on `thread`.
    ///
    /// Returns the logged `<- RET` line, or `None` if no call was pending.
    pub fn on_return(&mut self, backend: &dyn DebuggerBackend, thread: ThreadId, address: Address) -> Option<String>
    {
        let name = self.pending.remove(&(thread, address))?;
        let abi = self.decoder.as_ref()?.abi();
        let line = match abi.get_return_value(backend, thread, 0) {
            Ok(value) => format!("<- RET {name} => 0x{value:x}"),
            Err(e) => {
                debug!("Could not read return value of {name}: {e}");
                format!("<- RET {name} => <unavailable>")
            }
        };
        info!(thread = %thread, "{line}");
        Some(line)
    }
}
