//! Core type definitions.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Calendar day, counted from 2000-01-01 (UTC).
///
/// Location entries keep two of these (last read, last written) in two bytes
/// each, so the range ends in the year 2179.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DayStamp(pub u16);

impl DayStamp {
    /// Creates a day stamp from a raw day count.
    #[must_use]
    pub const fn new(days: u16) -> Self {
        Self(days)
    }

    /// Returns the stamp for the current day.
    #[must_use]
    pub fn today() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Returns the stamp of the day containing `at`, saturating at the ends
    /// of the representable range.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
        let days = (at.date_naive() - epoch).num_days();
        Self(days.clamp(0, i64::from(u16::MAX)) as u16)
    }

    /// Returns the raw day count.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for DayStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day:{}", self.0)
    }
}

/// Identifies one partition file by size class and element width.
///
/// The generation number is part of the file name but always zero for files
/// this crate writes, so it is not part of the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId {
    /// Size class; the partition holds up to `load_factor^(size_class+1)` elements.
    pub size_class: u8,
    /// Width of one element in bytes.
    pub element_size: u32,
}

impl PartitionId {
    /// Creates a partition identifier.
    #[must_use]
    pub const fn new(size_class: u8, element_size: u32) -> Self {
        Self {
            size_class,
            element_size,
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition:{}/{}", self.size_class, self.element_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_zero_is_millennium() {
        let at = Utc.with_ymd_and_hms(2000, 1, 1, 23, 59, 59).unwrap();
        assert_eq!(DayStamp::from_datetime(at), DayStamp::new(0));

        let at = Utc.with_ymd_and_hms(2000, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(DayStamp::from_datetime(at).as_u16(), 30);
    }

    #[test]
    fn days_before_epoch_saturate() {
        let at = Utc.with_ymd_and_hms(1999, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(DayStamp::from_datetime(at), DayStamp::new(0));
    }

    #[test]
    fn partition_ids_order_by_class() {
        assert!(PartitionId::new(0, 90) < PartitionId::new(1, 90));
        assert_eq!(PartitionId::new(2, 90).to_string(), "partition:2/90");
    }
}
