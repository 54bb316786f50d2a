//! Keyspace boundaries used to order freeze passes.
//!
//! The addressable keyspace is `[LOCAL_MAX, KEY_MAX)`. The bootstrap range
//! starts at `LOCAL_MAX` and holds the top-level routing keys (up to
//! `META1_KEY_MAX`); second-level routing keys end at `META2_KEY_MAX` and user
//! data follows.

use std::fmt;

/// Smallest possible key.
pub const KEY_MIN: &[u8] = b"";
/// End of node-local keys and start of the bootstrap range.
pub const LOCAL_MAX: &[u8] = b"\x02";
/// End of the top-level routing keys.
pub const META1_KEY_MAX: &[u8] = b"\x02\xff\xff";
/// End of the second-level routing keys.
pub const META2_KEY_MAX: &[u8] = b"\x03\xff\xff";
/// Largest possible key (exclusive upper bound of every span).
pub const KEY_MAX: &[u8] = b"\xff\xff";

/// Lower bounds of the change requests issued for one pass, in issue order.
///
/// Freezing walks backwards so routing metadata stays reachable until the
/// very last request: user data, then second-level routing, then the
/// bootstrap range. Unfreezing is a single forward request because the
/// remote side walks ranges in key order, reaching the bootstrap range first.
pub fn pass_start_keys(frozen: bool) -> &'static [&'static [u8]] {
    const FREEZE: [&[u8]; 3] = [META2_KEY_MAX, META1_KEY_MAX, LOCAL_MAX];
    const UNFREEZE: [&[u8]; 1] = [LOCAL_MAX];
    if frozen {
        &FREEZE
    } else {
        &UNFREEZE
    }
}

/// Key span, lexicographic and end-exclusive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", display_key(&self.start), display_key(&self.end))
    }
}

/// Render a key for logs: printable ASCII as-is, everything else as `\xNN`.
pub fn display_key(key: &[u8]) -> String {
    if key.is_empty() {
        return "/Min".to_string();
    }
    let mut out = String::with_capacity(key.len());
    for byte in key {
        if byte.is_ascii_graphic() && *byte != b'\\' {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("\\x{byte:02x}"));
        }
    }
    out
}
