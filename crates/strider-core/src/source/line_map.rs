//! Line-to-next-statement maps built from a compile unit's line table.

use std::collections::HashMap;

use crate::types::LineEntry;

/// Where the statement starting on a line ends: the line and column of the
/// next statement boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementEnd
{
    /// Line of the next statement
    pub line: u32,
    /// Column of the next statement; 0 means the statement ends before `line`
    pub column: u32,
}

/// Maps a source line to the start of the next statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileUnitLineMap
{
    next: HashMap<u32, StatementEnd>,
}

impl CompileUnitLineMap
{
    /// Build the map from unsorted line entries.
    ///
    /// Entries without a line are ignored. Each line maps to the first entry
    /// that starts on a later line; the first mapping seen for a line is kept.
    /// The last line maps to itself with column 0.
    #[must_use]
    pub fn build(entries: &[LineEntry]) -> Self
    {
        let mut sorted: Vec<(u32, u32)> = entries
            .iter()
            .filter(|entry| entry.line > 0)
            .map(|entry| (entry.line, entry.column))
            .collect();
        sorted.sort_unstable();

        let mut next = HashMap::new();
        let Some(&(last_line, _)) = sorted.last() else {
            return Self { next };
        };

        for (idx, &(line, _)) in sorted.iter().enumerate() {
            if next.contains_key(&line) {
                continue;
            }
            if let Some(&(next_line, next_column)) = sorted[idx + 1..].iter().find(|(l, _)| *l > line) {
                next.insert(
                    line,
                    StatementEnd {
                        line: next_line,
                        column: next_column,
                    },
                );
            }
        }
        next.entry(last_line).or_insert(StatementEnd {
            line: last_line,
            column: 0,
        });
        Self { next }
    }

    /// Statement boundary after `line`.
    #[must_use]
    pub fn next_statement(&self, line: u32) -> Option<StatementEnd>
    {
        self.next.get(&line).copied()
    }

    /// Number of mapped lines.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.next.len()
    }

    /// Whether no line is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.next.is_empty()
    }
}

/// Reconstruct the statement that starts on `line` (1-based) of `lines`.
///
/// Without a boundary, or when the next statement starts on the same line,
/// only the current line is returned. Otherwise every line up to the next
/// statement line is joined, plus that line cut before its (1-based) column.
#[must_use]
pub fn statement_text(lines: &[String], line: u32, end: Option<StatementEnd>) -> String
{
    let line_at = |number: u32| -> Option<&str> {
        let idx = usize::try_from(number).ok()?.checked_sub(1)?;
        lines.get(idx).map(String::as_str)
    };

    let end = match end {
        Some(end) if end.line > line => end,
        _ => return line_at(line).map(str::trim).unwrap_or_default().to_string(),
    };

    let mut fragments: Vec<&str> = (line..end.line).filter_map(line_at).collect();
    if end.column > 0 {
        if let Some(last) = line_at(end.line) {
            let cut = usize::try_from(end.column - 1).unwrap_or(usize::MAX);
            let cut = last.char_indices().nth(cut).map_or(last.len(), |(byte, _)| byte);
            fragments.push(&last[..cut]);
        }
    }

    fragments
        .into_iter()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
