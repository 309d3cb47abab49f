//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed load address in the traced process
///
/// This wrapper around `u64` keeps addresses apart from sizes, offsets, and
/// raw register values. Register reads produce plain `u64`s; the step engine
/// converts them into `Address` once it knows the value is a code or data
/// pointer.
///
/// ## Example
///
/// ```rust
/// use strider_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x4; // Next arm64 instruction
/// assert_eq!(next_addr.value(), 0x1004);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// Backends report it for sections without a valid load address, so it
    /// doubles as the "invalid" sentinel.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// ## Example
    ///
    /// ```rust
    /// use strider_core::types::Address;
    ///
    /// const TEXT_BASE: Address = Address::new(0x1_0000_0000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ## Example
    ///
    /// ```rust
    /// use strider_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None); // Overflow
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Distance from `base` to this address, if this address is not below `base`.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use strider_core::types::Address;
    ///
    /// let start = Address::from(0x1000);
    /// assert_eq!(Address::from(0x1010).offset_from(start), Some(0x10));
    /// assert_eq!(Address::from(0x0ff0).offset_from(start), None);
    /// ```
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
