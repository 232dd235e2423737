//! Instruction address type.

use std::fmt;

/// Strongly typed instruction address
///
/// Raw instruction-pointer values arrive from a stack walker as plain integers.
/// Wrapping them keeps runtime addresses from being mixed up with link-time
/// (file) addresses, which differ by the executable's load bias.
///
/// No validation happens here: any 64-bit value is a legal `Address`, and
/// garbage addresses simply fail to resolve further down.
///
/// ## Example
///
/// ```rust
/// use crashsym_core::types::Address;
///
/// let addr = Address::from(0x1000_u64);
/// assert_eq!(addr.checked_sub(0x100), Some(Address::new(0xf00)));
/// assert_eq!(addr.checked_sub(0x2000), None);
/// assert_eq!(addr.to_string(), "0x0000000000001000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// Usable in const contexts, unlike `Address::from`.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Subtract an offset from this address, checking for underflow
    ///
    /// Used to turn a runtime address into a link-time one by removing the
    /// load bias. Returns `None` when the address lies below the bias.
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
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
        write!(f, "0x{:016x}", self.0)
    }
}
