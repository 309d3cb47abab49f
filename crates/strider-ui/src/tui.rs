//! Terminal initialization and the picker event loop

use std::io::{self, Stdout};
use std::panic;
use std::time::Duration;

use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use strider_utils::{debug, info};

use crate::app::{App, PickerOutcome};
use crate::event::{Event, EventHandler};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Terminal owned by the picker
///
/// The terminal is in raw mode on the alternate screen for as long as this
/// value lives.
pub struct Tui
{
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui
{
    /// Take over the terminal
    ///
    /// This enables raw mode and the alternate screen, and installs a panic
    /// hook that restores the terminal before the panic message prints.
    ///
    /// # Errors
    ///
    /// Returns an error if terminal initialization fails (raw mode, alternate screen, etc.)
    pub fn new() -> io::Result<Self>
    {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let _ = Self::restore();
            original_hook(panic_info);
        }));

        Ok(Self { terminal })
    }

    /// Run the picker until the user confirms or cancels
    ///
    /// # Errors
    ///
    /// Returns an error if drawing fails or the input task goes away.
    pub async fn run(&mut self, app: &mut App) -> io::Result<PickerOutcome>
    {
        info!("Module picker started with {} modules", app.entries.len());
        let mut events = EventHandler::new(TICK_RATE);

        while !app.should_quit() {
            self.terminal.draw(|frame| crate::ui::draw(frame, app))?;

            match events.next().await {
                Some(Event::Key(key)) => {
                    app.handle_key_event(key);
                }
                Some(Event::Resize | Event::Tick) => {}
                None => {
                    events.stop();
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal input closed"));
                }
            }
        }

        events.stop();
        let outcome = app.outcome.clone().unwrap_or(PickerOutcome::Cancelled);
        debug!("Module picker finished: {outcome:?}");
        Ok(outcome)
    }

    /// Restore the terminal to its original state
    ///
    /// # Errors
    ///
    /// Returns an error if terminal restoration fails (disabling raw mode, leaving alternate screen, etc.)
    pub fn restore() -> io::Result<()>
    {
        disable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, LeaveAlternateScreen)?;
        Ok(())
    }
}

impl Drop for Tui
{
    fn drop(&mut self)
    {
        let _ = Self::restore();
    }
}
