//! Sorted address-range index.
//!
//! Both the module catalog and the skip policy answer "which range contains
//! this address?" on every stop. They share this index: a vector of
//! `[start, end)` ranges sorted by start, searched with a binary search for
//! the greatest start that is `<=` the address.
//!
//! The index is immutable. Callers rebuild it from scratch when the
//! underlying module table changes.

use tracing::debug;

use crate::types::Address;

/// One `[start, end)` range and the value it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange<T>
{
    /// First covered address
    pub start: Address,
    /// One past the last covered address
    pub end: Address,
    /// Owner of the range (a module/section reference, a skip pattern, ...)
    pub owner: T,
}

impl<T> AddressRange<T>
{
    /// Create a range.
    pub fn new(start: Address, end: Address, owner: T) -> Self
    {
        Self { start, end, owner }
    }

    /// Whether `address` is in `[start, end)`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn size(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }
}

/// Binary-search index over non-overlapping address ranges.
///
/// Empty or inverted ranges (`start >= end`) are dropped when the index is
/// built, so every stored range satisfies `start < end`.
///
/// When input ranges overlap, a lookup considers only the range with the
/// greatest start `<=` the address (ties broken by the larger end). The
/// address may then be reported as not found even if an earlier, wider range
/// covers it.
///
/// ## Example
///
/// ```rust
/// use strider_core::ranges::{AddressRange, AddressRangeIndex};
/// use strider_core::types::Address;
///
/// let index = AddressRangeIndex::build(vec![
///     AddressRange::new(Address::new(0x2000), Address::new(0x3000), "libc"),
///     AddressRange::new(Address::new(0x1000), Address::new(0x1800), "main"),
/// ]);
///
/// assert_eq!(index.find(Address::new(0x1004)).map(|r| r.owner), Some("main"));
/// assert!(index.find(Address::new(0x1900)).is_none()); // gap between ranges
/// assert!(index.find(Address::new(0x3000)).is_none()); // end is exclusive
/// ```
#[derive(Debug, Clone)]
pub struct AddressRangeIndex<T>
{
    ranges: Vec<AddressRange<T>>,
}

impl<T> Default for AddressRangeIndex<T>
{
    fn default() -> Self
    {
        Self { ranges: Vec::new() }
    }
}

impl<T> AddressRangeIndex<T>
{
    /// Build an index from unsorted ranges.
    pub fn build(ranges: impl IntoIterator<Item = AddressRange<T>>) -> Self
    {
        let mut dropped = 0usize;
        let mut ranges: Vec<_> = ranges
            .into_iter()
            .filter(|range| {
                let keep = range.start < range.end;
                if !keep {
                    dropped += 1;
                }
                keep
            })
            .collect();
        if dropped > 0 {
            debug!("Dropped {dropped} empty address ranges");
        }
        ranges.sort_by_key(|range| (range.start, range.end));
        Self { ranges }
    }

    /// Find the range containing `address`. O(log n).
    #[must_use]
    pub fn find(&self, address: Address) -> Option<&AddressRange<T>>
    {
        let upper = self.ranges.partition_point(|range| range.start <= address);
        let candidate = self.ranges.get(upper.checked_sub(1)?)?;
        candidate.contains(address).then_some(candidate)
    }

    /// Whether any range contains `address`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        self.find(address).is_some()
    }

    /// Number of ranges in the index.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.ranges.len()
    }

    /// Whether the index has no ranges.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.ranges.is_empty()
    }

    /// Ranges in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &AddressRange<T>>
    {
        self.ranges.iter()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn range(start: u64, end: u64, owner: u32) -> AddressRange<u32>
    {
        AddressRange::new(Address::new(start), Address::new(end), owner)
    }

    #[test]
    fn test_find_returns_covering_range()
    {
        let index = AddressRangeIndex::build(vec![range(0x3000, 0x4000, 3), range(0x1000, 0x2000, 1)]);
        assert_eq!(index.find(Address::new(0x1000)).map(|r| r.owner), Some(1));
        assert_eq!(index.find(Address::new(0x1fff)).map(|r| r.owner), Some(1));
        assert_eq!(index.find(Address::new(0x3500)).map(|r| r.owner), Some(3));
    }

    #[test]
    fn test_find_outside_ranges()
    {
        let index = AddressRangeIndex::build(vec![range(0x1000, 0x2000, 1)]);
        assert!(index.find(Address::new(0x0fff)).is_none());
        assert!(index.find(Address::new(0x2000)).is_none());
        assert!(index.find(Address::ZERO).is_none());
        assert!(index.find(Address::new(u64::MAX)).is_none());
    }

    #[test]
    fn test_empty_and_inverted_ranges_are_dropped()
    {
        let index = AddressRangeIndex::build(vec![range(0x1000, 0x1000, 1), range(0x2000, 0x1000, 2), range(0x10, 0x20, 3)]);
        assert_eq!(index.len(), 1);
        assert!(index.iter().all(|r| r.start < r.end));
    }

    #[test]
    fn test_empty_index()
    {
        let index: AddressRangeIndex<u32> = AddressRangeIndex::default();
        assert!(index.is_empty());
        assert!(!index.contains(Address::new(0x1000)));
    }

    #[test]
    fn test_lookup_agrees_with_linear_scan()
    {
        let index = AddressRangeIndex::build(vec![
            range(0x100, 0x180, 1),
            range(0x200, 0x210, 2),
            range(0x180, 0x1c0, 3),
            range(0x400, 0x800, 4),
        ]);
        for addr in (0..0x900u64).step_by(4) {
            let expected = index.iter().find(|r| r.contains(Address::new(addr))).map(|r| r.owner);
            assert_eq!(index.find(Address::new(addr)).map(|r| r.owner), expected, "address 0x{addr:x}");
        }
    }
}
