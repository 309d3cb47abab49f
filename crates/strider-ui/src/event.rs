//! Event handling for the picker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;

/// Events that can occur in the picker
#[derive(Debug, Clone, Copy)]
pub enum Event
{
    /// Keyboard input event
    Key(KeyEvent),
    /// The terminal was resized
    Resize,
    /// Tick event (for periodic redraws)
    Tick,
}

/// Event handler that reads from crossterm and produces picker events
pub struct EventHandler
{
    receiver: mpsc::Receiver<Event>,
    should_stop: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl EventHandler
{
    /// Create a new event handler
    ///
    /// This spawns a blocking task that polls crossterm and forwards key
    /// presses, resizes and ticks to the async receiver.
    #[must_use]
    pub fn new(tick_rate: Duration) -> Self
    {
        let (sender, receiver) = mpsc::channel(100);
        let should_stop = Arc::new(AtomicBool::new(false));

        let stop = Arc::clone(&should_stop);
        let handle = tokio::task::spawn_blocking(move || {
            let mut last_tick = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                let timeout = tick_rate.checked_sub(last_tick.elapsed()).unwrap_or(Duration::ZERO);

                if event::poll(timeout).unwrap_or(false) {
                    let forwarded = match event::read() {
                        Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
                        Ok(CrosstermEvent::Resize(..)) => Some(Event::Resize),
                        _ => None,
                    };
                    // If send fails (receiver dropped), break
                    if let Some(event) = forwarded {
                        if sender.blocking_send(event).is_err() {
                            break;
                        }
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if sender.blocking_send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self {
            receiver,
            should_stop,
            handle,
        }
    }

    /// Get the next event (async)
    pub async fn next(&mut self) -> Option<Event>
    {
        self.receiver.recv().await
    }

    /// Stop the polling task.
    ///
    /// The task exits on its next poll timeout; the receiver is closed so a
    /// pending send fails immediately.
    pub fn stop(&mut self)
    {
        self.should_stop.store(true, Ordering::Relaxed);
        self.receiver.close();
    }

    /// Whether the polling task is still running
    #[must_use]
    pub fn is_running(&self) -> bool
    {
        !self.handle.is_finished()
    }
}

impl Drop for EventHandler
{
    fn drop(&mut self)
    {
        self.stop();
    }
}
