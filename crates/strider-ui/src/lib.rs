//! # strider-ui
//!
//! Terminal module picker for the Strider tracer.
//!
//! When a session runs with `dump_modules_for_skip`, the tracer stops at the
//! program's entry point and hands the loaded module list to a
//! [`ModuleSelector`]. [`ModulePicker`] is the interactive one: a `ratatui`
//! table where the user marks the modules to keep tracing. Every module left
//! unmarked is added to `skip_modules` in the configuration file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strider_core::backend::{create_backend, LaunchRequest};
//! use strider_core::tracer::TraceSession;
//! use strider_ui::ModulePicker;
//! use strider_utils::ConfigStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ConfigStore::open("config.yaml")?);
//! let session = TraceSession::new(create_backend()?, store, LaunchRequest::default())
//!     .with_selector(Box::new(ModulePicker::new()));
//! session.run()?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod event;
pub mod tui;
pub mod ui;
pub mod widgets;

use std::io;
use std::path::PathBuf;

pub use app::{App, PickerOutcome};
use strider_core::error::{TracerError, TracerResult};
use strider_core::modules::Module;
use strider_core::tracer::ModuleSelector;
pub use tui::Tui;

/// Run the picker over `modules` on the current terminal
///
/// Drives the async event loop on a current-thread Tokio runtime so it can
/// be called from the tracer's synchronous event loop.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the terminal cannot be
/// initialized or drawn.
pub fn pick_modules(modules: &[Module]) -> io::Result<PickerOutcome>
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
    let mut app = App::new(modules);
    runtime.block_on(async {
        let mut tui = Tui::new()?;
        tui.run(&mut app).await
    })
}

/// Interactive [`ModuleSelector`] backed by [`pick_modules`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModulePicker;

impl ModulePicker
{
    /// Create a picker.
    #[must_use]
    pub fn new() -> Self
    {
        Self
    }
}

impl ModuleSelector for ModulePicker
{
    fn select_modules_to_keep(&mut self, modules: &[Module]) -> TracerResult<Option<Vec<PathBuf>>>
    {
        match pick_modules(modules) {
            Ok(PickerOutcome::Keep(paths)) => Ok(Some(paths)),
            Ok(PickerOutcome::Cancelled) => Ok(None),
            Err(e) => Err(TracerError::Ui(e.to_string())),
        }
    }
}
