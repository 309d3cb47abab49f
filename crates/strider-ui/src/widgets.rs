//! Widget components for the module picker

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use crate::app::{App, ModuleEntry};

/// Draw the module table
pub fn draw_module_table(frame: &mut Frame, area: Rect, app: &mut App)
{
    let header = Row::new(vec!["#", "Keep", "Module", "Sections", "Mapped"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let (mark, style) = if entry.keep {
                ("[x]", Style::default().fg(Color::Green))
            } else {
                ("[ ]", Style::default().fg(Color::DarkGray))
            };
            Row::new(vec![
                Cell::from(index.to_string()),
                Cell::from(mark),
                Cell::from(entry.name.clone()),
                Cell::from(entry.sections.to_string()),
                Cell::from(format_size(entry.mapped_bytes)),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Length(6),
        Constraint::Min(20),
        Constraint::Length(9),
        Constraint::Length(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Modules"))
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut app.table_state);
}

/// Draw the full path and fate of the selected module
pub fn draw_module_details(frame: &mut Frame, area: Rect, app: &App)
{
    let selected: Option<&ModuleEntry> = app.table_state.selected().and_then(|i| app.entries.get(i));
    let lines = match selected {
        Some(entry) => vec![
            Line::from(vec![
                Span::styled("Path: ", Style::default().fg(Color::Yellow)),
                Span::raw(entry.path.display().to_string()),
            ]),
            Line::from(vec![
                Span::styled("On confirm: ", Style::default().fg(Color::Yellow)),
                Span::raw(if entry.keep {
                    "traced".to_string()
                } else {
                    format!("added to skip_modules as '{}'", entry.name)
                }),
            ]),
        ],
        None => vec![Line::from("No modules loaded")],
    };

    let details = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Selected"));
    frame.render_widget(details, area);
}

/// Human-readable byte count.
#[must_use]
pub fn format_size(bytes: u64) -> String
{
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut unit = 0;
    let mut whole = bytes;
    let mut rem = 0;
    while whole >= 1024 && unit + 1 < UNITS.len() {
        rem = whole % 1024;
        whole /= 1024;
        unit += 1;
    }
    if unit == 0 {
        format!("{whole} {}", UNITS[unit])
    } else {
        format!("{whole}.{} {}", rem * 10 / 1024, UNITS[unit])
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_format_size()
    {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KiB");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
