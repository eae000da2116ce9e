//! Fundamental value types shared across the routing and synchronization cores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Orientation
// ----------------------------------------------------------------------------

/// A sub-device's position on the node: the four outward-facing forwarders
/// plus the center. Maps bijectively onto SPI ring slots 1..5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    North,
    East,
    South,
    West,
    Center,
}

impl Orientation {
    pub const ALL: [Orientation; 5] = [
        Orientation::North,
        Orientation::East,
        Orientation::South,
        Orientation::West,
        Orientation::Center,
    ];

    /// Ring slot id, 1-based; center is always 5.
    pub fn slot(self) -> u8 {
        match self {
            Orientation::North => 1,
            Orientation::East => 2,
            Orientation::South => 3,
            Orientation::West => 4,
            Orientation::Center => 5,
        }
    }

    pub fn from_slot(slot: u8) -> Option<Self> {
        match slot {
            1 => Some(Orientation::North),
            2 => Some(Orientation::East),
            3 => Some(Orientation::South),
            4 => Some(Orientation::West),
            5 => Some(Orientation::Center),
            _ => None,
        }
    }

    /// Modular successor slot in the SPI ring, 1-based.
    pub fn next_slot(self) -> u8 {
        (self.slot() % 5) + 1
    }

    /// Lowercase ASCII letter used as the sibling-broadcast originator tag.
    pub fn letter(self) -> char {
        match self {
            Orientation::North => 'n',
            Orientation::East => 'e',
            Orientation::South => 's',
            Orientation::West => 'w',
            Orientation::Center => 'c',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'n' => Some(Orientation::North),
            'e' => Some(Orientation::East),
            's' => Some(Orientation::South),
            'w' => Some(Orientation::West),
            'c' => Some(Orientation::Center),
            _ => None,
        }
    }

    /// Full lowercase name, used in HTTP device-filter paths (§6).
    pub fn name(self) -> &'static str {
        match self {
            Orientation::North => "north",
            Orientation::East => "east",
            Orientation::South => "south",
            Orientation::West => "west",
            Orientation::Center => "center",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Orientation {
    type Err = crate::errors::MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Orientation::from_letter(c)
                .ok_or_else(|| crate::errors::MeshError::invalid_interface(s)),
            _ => match s {
                "north" => Ok(Orientation::North),
                "east" => Ok(Orientation::East),
                "south" => Ok(Orientation::South),
                "west" => Ok(Orientation::West),
                "center" => Ok(Orientation::Center),
                _ => Err(crate::errors::MeshError::invalid_interface(s)),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// IPv4 helpers
// ----------------------------------------------------------------------------

/// Render a 32-bit address as a dotted-quad string.
pub fn ip_to_string(ip: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (ip >> 24) & 0xFF,
        (ip >> 16) & 0xFF,
        (ip >> 8) & 0xFF,
        ip & 0xFF
    )
}

/// Parse a dotted-quad string into a 32-bit address.
pub fn ip_from_str(s: &str) -> Option<u32> {
    let mut octets = [0u32; 4];
    let mut parts = s.split('.');
    for octet in &mut octets {
        *octet = parts.next()?.parse::<u32>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some((octets[0] << 24) | (octets[1] << 16) | (octets[2] << 8) | octets[3])
}

/// Build a contiguous high-bit mask from a prefix length (0..=32).
pub fn mask_from_prefix_len(prefix_len: u32) -> u32 {
    if prefix_len == 0 {
        0
    } else if prefix_len >= 32 {
        u32::MAX
    } else {
        ((1u32 << prefix_len) - 1) << (32 - prefix_len)
    }
}

/// Prefix length of a contiguous mask: its popcount.
pub fn prefix_len_of_mask(mask: u32) -> u32 {
    mask.count_ones()
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn duration_since(&self, other: Self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

/// Indirection over wall-clock access so routing-core timeouts (§4.4.6) are
/// testable without real sleeps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Time-to-Live
// ----------------------------------------------------------------------------

/// Hop-count budget for forwarded packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ttl(u8);

impl Ttl {
    pub const DEFAULT: Self = Self(64);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Decrement, returning `None` when it would reach (or already is) zero.
    pub fn decrement(self) -> Option<Self> {
        if self.0 > 1 {
            Some(Self(self.0 - 1))
        } else {
            None
        }
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_prefix_round_trip() {
        for prefix_len in 0..=32u32 {
            let mask = mask_from_prefix_len(prefix_len);
            assert_eq!(prefix_len_of_mask(mask), prefix_len);
        }
    }

    #[test]
    fn ip_string_round_trip() {
        let addr = ip_from_str("10.32.0.1").unwrap();
        assert_eq!(ip_to_string(addr), "10.32.0.1");
    }

    #[test]
    fn orientation_slot_mapping_is_bijective() {
        for o in Orientation::ALL {
            assert_eq!(Orientation::from_slot(o.slot()), Some(o));
        }
    }

    #[test]
    fn ttl_decrement_reaches_none_at_one() {
        let ttl = Ttl::new(1);
        assert!(ttl.decrement().is_none());
    }
}
