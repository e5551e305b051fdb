//! Windows FILETIME encoding.

use binrw::prelude::*;

/// 100-nanosecond ticks between 1601-01-01 and the Unix epoch.
const NT_EPOCH_DELTA: u64 = 116_444_736_000_000_000;

/// Number of FILETIME ticks per second.
const TICKS_PER_SEC: u64 = 10_000_000;

/// A point in time, in 100-nanosecond intervals since 1601-01-01 UTC.
///
/// The all-zero value means "no time"; conversions keep it as-is.
#[binrw::binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[brw(little)]
pub struct FileTime {
    pub ticks: u64,
}

impl FileTime {
    pub const ZERO: FileTime = FileTime { ticks: 0 };

    /// Builds a FILETIME from Unix seconds and a sub-second nanosecond part.
    ///
    /// Times before the Unix epoch clamp to the epoch; SMB1 cannot express
    /// them meaningfully anyway.
    pub fn from_unix(secs: i64, nanos: u32) -> Self {
        if secs < 0 {
            return FileTime {
                ticks: NT_EPOCH_DELTA,
            };
        }
        FileTime {
            ticks: (secs as u64) * TICKS_PER_SEC + (nanos as u64) / 100 + NT_EPOCH_DELTA,
        }
    }

    /// Unix seconds, truncating sub-second precision.
    pub fn to_unix_secs(&self) -> i64 {
        if self.ticks < NT_EPOCH_DELTA {
            return 0;
        }
        ((self.ticks - NT_EPOCH_DELTA) / TICKS_PER_SEC) as i64
    }

    pub fn is_zero(&self) -> bool {
        self.ticks == 0
    }

    pub fn now() -> Self {
        std::time::SystemTime::now().into()
    }
}

impl From<std::time::SystemTime> for FileTime {
    fn from(value: std::time::SystemTime) -> Self {
        match value.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => FileTime::from_unix(d.as_secs() as i64, d.subsec_nanos()),
            Err(_) => FileTime {
                ticks: NT_EPOCH_DELTA,
            },
        }
    }
}

impl From<time::OffsetDateTime> for FileTime {
    fn from(value: time::OffsetDateTime) -> Self {
        let nanos = value.unix_timestamp_nanos();
        if nanos < 0 {
            return FileTime {
                ticks: NT_EPOCH_DELTA,
            };
        }
        FileTime {
            ticks: (nanos / 100) as u64 + NT_EPOCH_DELTA,
        }
    }
}

impl From<time::PrimitiveDateTime> for FileTime {
    fn from(value: time::PrimitiveDateTime) -> Self {
        value.assume_utc().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbd_tests::*;
    use time::macros::datetime;

    test_binrw! {
        FileTime => epoch: FileTime::from_unix(0, 0) => "00803ed5deb19d01"
    }

    #[test]
    fn test_unix_round_trip_truncates_to_seconds() {
        let ft = FileTime::from_unix(1_700_000_000, 999_999_999);
        assert_eq!(ft.to_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn test_datetime_conversion_matches_unix() {
        let ft: FileTime = datetime!(1970-01-01 00:00:00).into();
        assert_eq!(ft.ticks, 116_444_736_000_000_000);
    }

    #[test]
    fn test_zero_is_preserved() {
        assert!(FileTime::ZERO.is_zero());
        assert_eq!(FileTime::ZERO.to_unix_secs(), 0);
    }
}
