//! Engine-native log position cursors.
//!
//! The capture unit tracks "what has already been shipped" using the
//! engine's own log position, never wall-clock time: a wall-clock cursor
//! silently skips log data whenever capture is delayed past the interval
//! or the clock skews. [`WalLsn`] is the relational engine's 64-bit WAL
//! byte position (displayed `X/Y` in hex); [`OplogTimestamp`] is the
//! document engine's `{seconds, increment}` operation-log position
//! (displayed `secs.inc`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A relational-engine WAL position.
///
/// A 64-bit byte offset into the write-ahead log, displayed as `X/Y`
/// where X is the upper 32 bits and Y the lower, both hexadecimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WalLsn(u64);

impl WalLsn {
    /// The zero LSN, the start of the WAL.
    pub const ZERO: WalLsn = WalLsn(0);

    /// Creates an LSN from a raw 64-bit value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        WalLsn(value)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Advances the position by the given number of bytes.
    #[must_use]
    pub const fn advance(self, bytes: u64) -> WalLsn {
        WalLsn(self.0.saturating_add(bytes))
    }
}

impl fmt::Display for WalLsn {
    #[allow(clippy::cast_possible_truncation)] // Intentional: lower 32 bits
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 as u32)
    }
}

impl FromStr for WalLsn {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (high, low) = s
            .split_once('/')
            .ok_or_else(|| CursorParseError::InvalidFormat(s.to_string()))?;
        let high = u32::from_str_radix(high, 16)
            .map_err(|_| CursorParseError::InvalidComponent(high.to_string()))?;
        let low = u32::from_str_radix(low, 16)
            .map_err(|_| CursorParseError::InvalidComponent(low.to_string()))?;
        Ok(WalLsn((u64::from(high) << 32) | u64::from(low)))
    }
}

/// A document-engine operation-log position.
///
/// Seconds-since-epoch plus an ordinal distinguishing operations within
/// the same second. Ordering is `(seconds, increment)` lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OplogTimestamp {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Ordinal within the second.
    pub increment: u32,
}

impl OplogTimestamp {
    /// Creates a position from its two components.
    #[must_use]
    pub const fn new(seconds: u32, increment: u32) -> Self {
        Self { seconds, increment }
    }
}

impl fmt::Display for OplogTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.seconds, self.increment)
    }
}

impl FromStr for OplogTimestamp {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs, inc) = s
            .split_once('.')
            .ok_or_else(|| CursorParseError::InvalidFormat(s.to_string()))?;
        let seconds = secs
            .parse()
            .map_err(|_| CursorParseError::InvalidComponent(secs.to_string()))?;
        let increment = inc
            .parse()
            .map_err(|_| CursorParseError::InvalidComponent(inc.to_string()))?;
        Ok(Self { seconds, increment })
    }
}

/// A log position for either engine.
///
/// Opaque to the shipper: it is handed back to the same
/// [`LogSource`](crate::capture::LogSource) that produced it and never
/// interpreted elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogPosition {
    /// Document-engine operation-log position.
    Oplog(OplogTimestamp),
    /// Relational-engine WAL position.
    Wal(WalLsn),
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oplog(ts) => write!(f, "{ts}"),
            Self::Wal(lsn) => write!(f, "{lsn}"),
        }
    }
}

impl From<OplogTimestamp> for LogPosition {
    fn from(ts: OplogTimestamp) -> Self {
        Self::Oplog(ts)
    }
}

impl From<WalLsn> for LogPosition {
    fn from(lsn: WalLsn) -> Self {
        Self::Wal(lsn)
    }
}

/// Errors parsing a cursor string.
#[derive(Debug, Clone, Error)]
pub enum CursorParseError {
    /// The string does not match the expected two-part format.
    #[error("invalid cursor format: {0}")]
    InvalidFormat(String),

    /// A component could not be parsed as a number.
    #[error("invalid cursor component: {0}")]
    InvalidComponent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wal_lsn_display_round_trip() {
        let lsn = WalLsn::new((1_u64 << 32) | 0x1234_ABCD);
        assert_eq!(lsn.to_string(), "1/1234ABCD");
        assert_eq!("1/1234ABCD".parse::<WalLsn>().unwrap(), lsn);
        assert_eq!("0/0".parse::<WalLsn>().unwrap(), WalLsn::ZERO);
    }

    #[test]
    fn test_wal_lsn_ordering_and_advance() {
        let a = WalLsn::new(100);
        let b = a.advance(50);
        assert!(a < b);
        assert_eq!(b.as_u64(), 150);
        assert_eq!(WalLsn::new(u64::MAX).advance(1).as_u64(), u64::MAX);
    }

    #[test]
    fn test_oplog_timestamp_ordering() {
        let a = OplogTimestamp::new(100, 7);
        let b = OplogTimestamp::new(100, 8);
        let c = OplogTimestamp::new(101, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_oplog_timestamp_round_trip() {
        let ts: OplogTimestamp = "1724493600.4".parse().unwrap();
        assert_eq!(ts, OplogTimestamp::new(1_724_493_600, 4));
        assert_eq!(ts.to_string(), "1724493600.4");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("nope".parse::<WalLsn>().is_err());
        assert!("X/Y/Z".parse::<OplogTimestamp>().is_err());
        assert!("12.x".parse::<OplogTimestamp>().is_err());
    }

    #[test]
    fn test_log_position_display() {
        let wal: LogPosition = WalLsn::new(0xAB).into();
        assert_eq!(wal.to_string(), "0/AB");
        let oplog: LogPosition = OplogTimestamp::new(9, 1).into();
        assert_eq!(oplog.to_string(), "9.1");
    }
}
