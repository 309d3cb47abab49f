//! Return-address breakpoint bookkeeping.
//!
//! When the step engine steps over a call into a skipped module it plants a
//! one-shot breakpoint on the instruction after the call, so control comes
//! back to the tracer once the callee returns. The same return address is
//! seen many times in a loop; this cache makes sure only one backend
//! breakpoint exists per address, and that the set of live breakpoints stays
//! bounded.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, trace, warn};

use crate::backend::DebuggerBackend;
use crate::error::TracerResult;
use crate::types::Address;

/// Default number of return-address breakpoints kept alive at once.
pub const DEFAULT_RETURN_BREAKPOINT_CAPACITY: usize = 4096;

/// Unique identifier for a breakpoint managed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

/// Public information about a tracked return-address breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRecord
{
    /// Backend identifier
    pub id: BreakpointId,
    /// Return address the breakpoint sits on
    pub address: Address,
    /// Whether the backend deletes it after the first hit
    pub one_shot: bool,
    /// Number of times this breakpoint has been hit
    pub hit_count: u64,
    /// A one-shot breakpoint that already fired; the backend no longer has it.
    pub spent: bool,
}

/// Bounded, address-keyed set of return breakpoints.
///
/// Least recently used entries are evicted (and deleted from the backend) when
/// the capacity is reached.
#[derive(Debug)]
pub struct ReturnAddressBreakpointCache
{
    records: LruCache<Address, BreakpointRecord>,
    by_id: HashMap<BreakpointId, Address>,
}

impl Default for ReturnAddressBreakpointCache
{
    fn default() -> Self
    {
        Self::new(DEFAULT_RETURN_BREAKPOINT_CAPACITY)
    }
}

impl ReturnAddressBreakpointCache
{
    /// Create a cache holding at most `capacity` breakpoints (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self
    {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: LruCache::new(capacity),
            by_id: HashMap::new(),
        }
    }

    /// Make sure a live breakpoint exists at `address`, creating it only if
    /// none is tracked (or the tracked one-shot already fired).
    ///
    /// ## Errors
    ///
    /// Propagates backend failures from creating or configuring the
    /// breakpoint. Failures to delete an evicted breakpoint are only logged.
    pub fn ensure_breakpoint<B>(&mut self, backend: &mut B, address: Address, one_shot: bool) -> TracerResult<BreakpointId>
    where
        B: DebuggerBackend + ?Sized,
    {
        if let Some(record) = self.records.get(&address) {
            if !record.spent {
                trace!("Return breakpoint {} already set at {address}", record.id.raw());
                return Ok(record.id);
            }
        }
        if let Some(stale) = self.records.pop(&address) {
            self.by_id.remove(&stale.id);
        }

        let id = backend.create_breakpoint(address)?;
        if one_shot {
            backend.set_breakpoint_one_shot(id, true)?;
        }
        debug!("Set return breakpoint {} at {address} (one_shot={one_shot})", id.raw());

        let record = BreakpointRecord {
            id,
            address,
            one_shot,
            hit_count: 0,
            spent: false,
        };
        self.by_id.insert(id, address);
        if let Some((evicted_address, evicted)) = self.records.push(address, record) {
            if evicted_address != address {
                self.by_id.remove(&evicted.id);
                if !evicted.spent {
                    if let Err(e) = backend.delete_breakpoint(evicted.id) {
                        warn!("Failed to delete evicted return breakpoint at {evicted_address}: {e}");
                    }
                }
            }
        }
        Ok(id)
    }

    /// Whether a live breakpoint is tracked at `address`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        self.records.peek(&address).is_some_and(|record| !record.spent)
    }

    /// Whether `id` belongs to this cache.
    #[must_use]
    pub fn owns(&self, id: BreakpointId) -> bool
    {
        self.by_id.contains_key(&id)
    }

    /// Note that the breakpoint at `address` was hit.
    ///
    /// One-shot breakpoints become spent; the next [`ensure_breakpoint`](Self::ensure_breakpoint)
    /// for the same address re-creates it.
    pub fn record_hit(&mut self, address: Address) -> Option<BreakpointRecord>
    {
        let record = self.records.get_mut(&address)?;
        record.hit_count = record.hit_count.saturating_add(1);
        if record.one_shot {
            record.spent = true;
        }
        Some(record.clone())
    }

    /// Record for `address`, if tracked.
    #[must_use]
    pub fn get(&self, address: Address) -> Option<&BreakpointRecord>
    {
        self.records.peek(&address)
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.records.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.records.is_empty()
    }

    /// Forget every record, deleting live breakpoints from the backend.
    pub fn clear<B>(&mut self, backend: &mut B)
    where
        B: DebuggerBackend + ?Sized,
    {
        while let Some((address, record)) = self.records.pop_lru() {
            if !record.spent {
                if let Err(e) = backend.delete_breakpoint(record.id) {
                    debug!("Failed to delete return breakpoint at {address}: {e}");
                }
            }
        }
        self.by_id.clear();
    }
}
