//! Time offsets within a media file

use crate::error::TimestampError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Non-negative offset into a media file, in whole seconds
///
/// Parses `M:SS`, `MM:SS` and `H:MM:SS`. Trailing fields must be two digits
/// below 60; the leading field may be any small number (`75:00` is accepted).
/// Displays as `M:SS` below one hour and `H:MM:SS` above.
///
/// ```
/// use tea_dl::timestamps::Offset;
///
/// let offset: Offset = "1:03:45".parse().unwrap();
/// assert_eq!(offset.as_secs(), 3825);
/// assert_eq!(Offset::from_secs(90).to_string(), "1:30");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Offset(u64);

impl Offset {
    /// Offset zero
    pub const ZERO: Offset = Offset(0);

    /// Offset from whole seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Offset covering `duration`, rounded up to the next whole second
    pub fn from_duration_ceil(duration: Duration) -> Self {
        let extra = u64::from(duration.subsec_nanos() > 0);
        Self(duration.as_secs().saturating_add(extra))
    }

    /// Whole seconds
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// As a [`Duration`]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// Parse `M:SS`, `MM:SS` or `H:MM:SS`
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let invalid = || TimestampError::InvalidOffset {
            value: value.to_string(),
        };
        let trimmed = value.trim();
        let fields: Vec<&str> = trimmed.split(':').collect();
        if !(2..=3).contains(&fields.len()) {
            return Err(invalid());
        }

        let (lead, rest) = fields.split_first().ok_or_else(invalid)?;
        if lead.is_empty() || lead.len() > 3 || !lead.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let mut total: u64 = lead.parse().map_err(|_| invalid())?;

        for field in rest {
            if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let n: u64 = field.parse().map_err(|_| invalid())?;
            if n >= 60 {
                return Err(invalid());
            }
            total = total * 60 + n;
        }

        Ok(Self(total))
    }
}

impl FromStr for Offset {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Offset::parse(s)
    }
}

impl TryFrom<String> for Offset {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Offset::parse(&value)
    }
}

impl From<Offset> for String {
    fn from(offset: Offset) -> Self {
        offset.to_string()
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        if hours > 0 {
            write!(f, "{hours}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{minutes}:{seconds:02}")
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_accepted_shapes() {
        assert_eq!(Offset::parse("0:00").unwrap().as_secs(), 0);
        assert_eq!(Offset::parse("1:30").unwrap().as_secs(), 90);
        assert_eq!(Offset::parse("12:05").unwrap().as_secs(), 725);
        assert_eq!(Offset::parse("1:03:45").unwrap().as_secs(), 3825);
        assert_eq!(Offset::parse(" 75:00 ").unwrap().as_secs(), 4500);
    }

    #[test]
    fn rejects_malformed_offsets() {
        for bad in ["", "90", "1:5", "1:60", "1:30:60", "a:bc", "1:2:3:4", "-1:00", "1:30.5", "1234:00"] {
            assert!(
                matches!(Offset::parse(bad), Err(TimestampError::InvalidOffset { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn displays_minutes_or_hours() {
        assert_eq!(Offset::from_secs(0).to_string(), "0:00");
        assert_eq!(Offset::from_secs(240).to_string(), "4:00");
        assert_eq!(Offset::from_secs(3825).to_string(), "1:03:45");
    }

    #[test]
    fn display_output_parses_back() {
        for secs in [0, 59, 60, 3599, 3600, 7322] {
            let offset = Offset::from_secs(secs);
            assert_eq!(Offset::parse(&offset.to_string()).unwrap(), offset);
        }
    }

    #[test]
    fn duration_is_rounded_up() {
        assert_eq!(Offset::from_duration_ceil(Duration::from_secs(240)).as_secs(), 240);
        assert_eq!(Offset::from_duration_ceil(Duration::from_millis(240_100)).as_secs(), 241);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Offset::from_secs(90)).unwrap();
        assert_eq!(json, "\"1:30\"");
        let back: Offset = serde_json::from_str("\"0:30\"").unwrap();
        assert_eq!(back.as_secs(), 30);
    }
}
