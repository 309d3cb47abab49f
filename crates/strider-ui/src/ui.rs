//! UI rendering logic

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;

/// Draw the UI
pub fn draw(frame: &mut Frame, app: &mut App)
{
    let chunks = Layout::vertical([
        Constraint::Length(3), // Header
        Constraint::Min(0),    // Module table
        Constraint::Length(4), // Details of the selected module
        Constraint::Length(3), // Footer
    ])
    .split(frame.area());

    draw_header(frame, chunks[0], app);
    crate::widgets::draw_module_table(frame, chunks[1], app);
    crate::widgets::draw_module_details(frame, chunks[2], app);
    draw_footer(frame, chunks[3], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App)
{
    let title = format!(
        "Select modules to keep tracing ({} of {} kept)",
        app.kept_count(),
        app.entries.len()
    );
    let header = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).title("Strider"))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    frame.render_widget(header, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App)
{
    let help = "↑/↓:Navigate | Space:Toggle | a:Toggle all | Enter:Save skip list | Esc/q:Cancel";
    let line = match &app.status_message {
        Some(message) => Line::from(vec![
            Span::raw(help),
            Span::raw("  "),
            Span::styled(message.as_str(), Style::default().fg(Color::Yellow)),
        ]),
        None => Line::from(help),
    };

    let footer = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });

    frame.render_widget(footer, area);
}
