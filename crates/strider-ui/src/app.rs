//! Picker state and key handling

use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::TableState;
use strider_core::modules::Module;

/// Rows moved by PageUp/PageDown.
const PAGE_SIZE: isize = 10;

/// One row of the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry
{
    /// Full path of the module
    pub path: PathBuf,
    /// File name shown in the table
    pub name: String,
    /// Number of mapped sections
    pub sections: usize,
    /// Total mapped bytes
    pub mapped_bytes: u64,
    /// Whether the module stays traced
    pub keep: bool,
}

impl ModuleEntry
{
    fn from_module(module: &Module) -> Self
    {
        Self {
            path: module.path.clone(),
            name: module.basename().to_string(),
            sections: module.sections.len(),
            mapped_bytes: module.sections.iter().map(|section| section.size).sum(),
            keep: false,
        }
    }
}

/// How the picker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome
{
    /// The user confirmed; these modules stay traced.
    Keep(Vec<PathBuf>),
    /// The user backed out.
    Cancelled,
}

/// Application state
#[derive(Debug)]
pub struct App
{
    /// Modules in backend order
    pub entries: Vec<ModuleEntry>,
    /// Selection in the module table
    pub table_state: TableState,
    /// Set once the user confirms or cancels
    pub outcome: Option<PickerOutcome>,
    /// Message for the footer (if any)
    pub status_message: Option<String>,
}

impl App
{
    /// Create a picker over `modules`.
    ///
    /// The first module (the executable) starts out kept; everything else
    /// starts out skipped.
    #[must_use]
    pub fn new(modules: &[Module]) -> Self
    {
        let mut entries: Vec<ModuleEntry> = modules.iter().map(ModuleEntry::from_module).collect();
        if let Some(executable) = entries.first_mut() {
            executable.keep = true;
        }

        let mut table_state = TableState::default();
        table_state.select((!entries.is_empty()).then_some(0));

        Self {
            entries,
            table_state,
            outcome: None,
            status_message: None,
        }
    }

    /// Whether the event loop should stop.
    #[must_use]
    pub fn should_quit(&self) -> bool
    {
        self.outcome.is_some()
    }

    /// Number of modules currently kept.
    #[must_use]
    pub fn kept_count(&self) -> usize
    {
        self.entries.iter().filter(|entry| entry.keep).count()
    }

    /// Paths of the kept modules, in table order.
    #[must_use]
    pub fn kept_paths(&self) -> Vec<PathBuf>
    {
        self.entries
            .iter()
            .filter(|entry| entry.keep)
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Handle a keyboard event
    ///
    /// Returns `true` if the application should quit, `false` otherwise.
    pub fn handle_key_event(&mut self, key_event: KeyEvent) -> bool
    {
        self.status_message = None;

        match key_event.code {
            KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                self.outcome = Some(PickerOutcome::Cancelled);
            }
            KeyCode::Char('q' | 'Q') | KeyCode::Esc => {
                self.outcome = Some(PickerOutcome::Cancelled);
            }
            KeyCode::Enter => {
                self.outcome = Some(PickerOutcome::Keep(self.kept_paths()));
            }
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('a' | 'A') => self.toggle_all(),
            KeyCode::Up | KeyCode::Char('k') => self.move_by(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_by(1),
            KeyCode::PageUp => self.move_by(-PAGE_SIZE),
            KeyCode::PageDown => self.move_by(PAGE_SIZE),
            KeyCode::Home => self.select(0),
            KeyCode::End => self.select(self.entries.len().saturating_sub(1)),
            _ => {}
        }

        self.should_quit()
    }

    fn toggle_selected(&mut self)
    {
        let Some(entry) = self.table_state.selected().and_then(|i| self.entries.get_mut(i)) else {
            return;
        };
        entry.keep = !entry.keep;
        let verb = if entry.keep { "Keeping" } else { "Skipping" };
        self.status_message = Some(format!("{verb} {}", entry.name));
    }

    /// Keep everything, or skip everything if everything is already kept.
    fn toggle_all(&mut self)
    {
        let keep = !self.entries.iter().all(|entry| entry.keep);
        for entry in &mut self.entries {
            entry.keep = keep;
        }
        self.status_message = Some(if keep { "Keeping all modules" } else { "Skipping all modules" }.to_string());
    }

    /// Move the selection, wrapping at either end for single steps.
    fn move_by(&mut self, delta: isize)
    {
        if self.entries.is_empty() {
            return;
        }
        let max = self.entries.len() - 1;
        let current = self.table_state.selected().unwrap_or(0);
        let next = match delta {
            -1 if current == 0 => max,
            1 if current >= max => 0,
            _ => current.saturating_add_signed(delta).min(max),
        };
        self.table_state.select(Some(next));
    }

    fn select(&mut self, index: usize)
    {
        if !self.entries.is_empty() {
            self.table_state.select(Some(index.min(self.entries.len() - 1)));
        }
    }
}

#[cfg(test)]
mod tests
{
    use strider_core::backend::{ModuleDescriptor, SectionDescriptor};
    use strider_core::types::Address;

    use super::*;

    fn module(path: &str, size: u64) -> Module
    {
        Module::from_descriptor(&ModuleDescriptor {
            path: PathBuf::from(path),
            sections: vec![SectionDescriptor {
                name: "__TEXT".to_string(),
                load_address: Some(Address::new(0x1000)),
                size,
            }],
        })
    }

    fn app() -> App
    {
        App::new(&[
            module("/bin/app", 0x100),
            module("/usr/lib/libc.so", 0x200),
            module("/usr/lib/libm.so", 0x300),
        ])
    }

    fn key(code: KeyCode) -> KeyEvent
    {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_executable_starts_kept()
    {
        let app = app();
        assert_eq!(app.kept_paths(), vec![PathBuf::from("/bin/app")]);
        assert_eq!(app.entries[1].name, "libc.so");
        assert_eq!(app.entries[2].mapped_bytes, 0x300);
    }

    #[test]
    fn test_space_toggles_selected_row()
    {
        let mut app = app();
        app.handle_key_event(key(KeyCode::Down));
        assert!(!app.handle_key_event(key(KeyCode::Char(' '))));
        assert_eq!(app.kept_count(), 2);
        app.handle_key_event(key(KeyCode::Char(' ')));
        assert_eq!(app.kept_count(), 1);
    }

    #[test]
    fn test_toggle_all()
    {
        let mut app = app();
        app.handle_key_event(key(KeyCode::Char('a')));
        assert_eq!(app.kept_count(), 3);
        app.handle_key_event(key(KeyCode::Char('a')));
        assert_eq!(app.kept_count(), 0);
    }

    #[test]
    fn test_navigation_wraps()
    {
        let mut app = app();
        app.handle_key_event(key(KeyCode::Up));
        assert_eq!(app.table_state.selected(), Some(2));
        app.handle_key_event(key(KeyCode::Down));
        assert_eq!(app.table_state.selected(), Some(0));
        app.handle_key_event(key(KeyCode::PageDown));
        assert_eq!(app.table_state.selected(), Some(2));
    }

    #[test]
    fn test_enter_confirms()
    {
        let mut app = app();
        app.handle_key_event(key(KeyCode::End));
        app.handle_key_event(key(KeyCode::Char(' ')));
        assert!(app.handle_key_event(key(KeyCode::Enter)));
        assert_eq!(
            app.outcome,
            Some(PickerOutcome::Keep(vec![PathBuf::from("/bin/app"), PathBuf::from("/usr/lib/libm.so")]))
        );
    }

    #[test]
    fn test_escape_cancels()
    {
        let mut app = app();
        assert!(app.handle_key_event(key(KeyCode::Esc)));
        assert_eq!(app.outcome, Some(PickerOutcome::Cancelled));
    }

    #[test]
    fn test_empty_module_list()
    {
        let mut app = App::new(&[]);
        assert_eq!(app.table_state.selected(), None);
        app.handle_key_event(key(KeyCode::Down));
        app.handle_key_event(key(KeyCode::Char(' ')));
        assert!(app.handle_key_event(key(KeyCode::Enter)));
        assert_eq!(app.outcome, Some(PickerOutcome::Keep(Vec::new())));
    }
}
