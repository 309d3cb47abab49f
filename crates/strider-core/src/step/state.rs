//! Per-thread stepping state.

use std::collections::HashMap;

use crate::types::Address;

/// Visits of the same branch or line within one frame before the engine
/// decides it is looping.
pub const LOOP_TOLERANCE: u32 = 10;

#[derive(Debug, Default)]
struct LineCounter
{
    last: Option<u32>,
    visits: HashMap<u32, u32>,
}

/// What the step engine remembers about one traced thread.
///
/// Frame-scoped counters are keyed by the frame's CFA so that recursion and
/// sibling calls start from zero.
#[derive(Debug, Default)]
pub struct StepState
{
    base_depth: Option<usize>,
    /// Leave the current frame at its next return instruction.
    pub before_get_out: bool,
    branches: HashMap<Address, HashMap<Address, u32>>,
    lines: HashMap<Address, LineCounter>,
}

impl StepState
{
    /// Fresh state for a thread.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Depth of the first traced stop.
    #[must_use]
    pub fn base_depth(&self) -> Option<usize>
    {
        self.base_depth
    }

    /// Frames above the base depth; the first call fixes the base.
    pub fn depth_above_base(&mut self, depth: usize) -> usize
    {
        let base = *self.base_depth.get_or_insert(depth);
        depth.saturating_sub(base)
    }

    /// Two spaces per frame above the base depth.
    pub fn indent(&mut self, depth: usize) -> String
    {
        "  ".repeat(self.depth_above_base(depth))
    }

    /// Count a branch taken in frame `cfa` whose return point is `next_pc`.
    pub fn record_branch(&mut self, cfa: Address, next_pc: Address) -> u32
    {
        let count = self.branches.entry(cfa).or_default().entry(next_pc).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Count a visit to `line` in frame `cfa`. Consecutive stops on the same
    /// line count once.
    pub fn record_line(&mut self, cfa: Address, line: u32) -> u32
    {
        let counter = self.lines.entry(cfa).or_default();
        let visits = counter.visits.entry(line).or_insert(0);
        if counter.last != Some(line) {
            *visits = visits.saturating_add(1);
            counter.last = Some(line);
        }
        *visits
    }

    /// Forget the counters of a frame that returned.
    pub fn clear_frame(&mut self, cfa: Address)
    {
        self.branches.remove(&cfa);
        self.lines.remove(&cfa);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_indent_is_relative_to_first_depth()
    {
        let mut state = StepState::new();
        assert_eq!(state.indent(3), "");
        assert_eq!(state.indent(5), "    ");
        assert_eq!(state.indent(1), "");
        assert_eq!(state.base_depth(), Some(3));
    }

    #[test]
    fn test_branch_counter_is_per_frame()
    {
        let mut state = StepState::new();
        let (a, b) = (Address::new(0x7000), Address::new(0x8000));
        assert_eq!(state.record_branch(a, Address::new(0x1004)), 1);
        assert_eq!(state.record_branch(a, Address::new(0x1004)), 2);
        assert_eq!(state.record_branch(b, Address::new(0x1004)), 1);

        state.clear_frame(a);
        assert_eq!(state.record_branch(a, Address::new(0x1004)), 1);
    }

    #[test]
    fn test_line_counter_ignores_consecutive_stops()
    {
        let mut state = StepState::new();
        let cfa = Address::new(0x7000);
        assert_eq!(state.record_line(cfa, 10), 1);
        assert_eq!(state.record_line(cfa, 10), 1);
        assert_eq!(state.record_line(cfa, 11), 1);
        assert_eq!(state.record_line(cfa, 10), 2);
    }
}
