//! SMB_COM_LOCKING_ANDX messages.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use smbd_msg_derive::{smb_message_binrw, smb_request_binrw, smb_response_binrw};

use crate::AndX;

/// TypeOfLock bits of LOCKING_ANDX.
#[smbd_dtyp::mbitfield]
#[repr(u8)]
pub struct LockType {
    /// Shared (read) lock rather than exclusive.
    pub shared_lock: bool,
    /// The message is an oplock break acknowledgement.
    pub oplock_release: bool,
    /// Atomically change the lock type.
    pub change_locktype: bool,
    /// Cancel an outstanding blocked lock request.
    pub cancel_lock: bool,

    /// Ranges use the 64-bit large-file format.
    pub large_files: bool,
    #[skip]
    __: B3,
}

/// A byte range in the legacy 32-bit format.
#[smb_message_binrw]
#[derive(Clone, Copy)]
#[brw(little)]
pub struct LockRange {
    pub pid: u16,
    pub offset: u32,
    pub length: u32,
}

/// A byte range in the large-file (64-bit) format.
#[smb_message_binrw]
#[derive(Clone, Copy)]
#[brw(little)]
pub struct LockRangeLarge {
    pub pid: u16,
    reserved: u16,
    pub offset_high: u32,
    pub offset_low: u32,
    pub length_high: u32,
    pub length_low: u32,
}

impl LockRangeLarge {
    pub fn offset(&self) -> u64 {
        (u64::from(self.offset_high) << 32) | u64::from(self.offset_low)
    }

    pub fn length(&self) -> u64 {
        (u64::from(self.length_high) << 32) | u64::from(self.length_low)
    }
}

impl From<LockRange> for LockRangeLarge {
    fn from(value: LockRange) -> Self {
        LockRangeLarge {
            pid: value.pid,
            offset_high: 0,
            offset_low: value.offset,
            length_high: 0,
            length_low: value.length,
        }
    }
}

/// The unlock-then-lock range lists of a LOCKING_ANDX request, in either
/// range format.
#[derive(Debug, PartialEq, Eq)]
pub enum LockRanges {
    Small {
        unlocks: Vec<LockRange>,
        locks: Vec<LockRange>,
    },
    Large {
        unlocks: Vec<LockRangeLarge>,
        locks: Vec<LockRangeLarge>,
    },
}

impl LockRanges {
    /// Normalizes both formats to 64-bit ranges.
    pub fn to_large(&self) -> (Vec<LockRangeLarge>, Vec<LockRangeLarge>) {
        match self {
            LockRanges::Small { unlocks, locks } => (
                unlocks.iter().copied().map(Into::into).collect(),
                locks.iter().copied().map(Into::into).collect(),
            ),
            LockRanges::Large { unlocks, locks } => (unlocks.clone(), locks.clone()),
        }
    }
}

/// SMB_COM_LOCKING_ANDX request (8 words).
#[smb_request_binrw]
#[brw(little)]
pub struct LockingRequest {
    #[bw(calc = 8)]
    #[br(temp)]
    #[br(assert(_word_count == 8))]
    _word_count: u8,
    pub andx: AndX,
    pub lock_type: LockType,
    /// New oplock level for break acknowledgements.
    pub oplock_level: u8,
    /// Milliseconds to wait for conflicting locks; 0 fails immediately,
    /// all-ones waits forever.
    pub timeout: u32,
    #[bw(try_calc = u16::try_from(match &ranges { LockRanges::Small { unlocks, .. } => unlocks.len(), LockRanges::Large { unlocks, .. } => unlocks.len() }))]
    #[br(temp)]
    number_of_unlocks: u16,
    #[bw(try_calc = u16::try_from(match &ranges { LockRanges::Small { locks, .. } => locks.len(), LockRanges::Large { locks, .. } => locks.len() }))]
    #[br(temp)]
    number_of_locks: u16,
    #[bw(try_calc = u16::try_from(match &ranges {
        LockRanges::Small { unlocks, locks } => (unlocks.len() + locks.len()) * 10,
        LockRanges::Large { unlocks, locks } => (unlocks.len() + locks.len()) * 20,
    }))]
    #[br(temp)]
    _byte_count: u16,
    #[br(args_raw = LockRangesArgs { large: lock_type.large_files(), unlocks: number_of_unlocks, locks: number_of_locks })]
    pub ranges: LockRanges,
}

#[derive(Clone, Copy)]
pub struct LockRangesArgs {
    pub large: bool,
    pub unlocks: u16,
    pub locks: u16,
}

impl BinRead for LockRanges {
    type Args<'a> = LockRangesArgs;

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        fn read_n<T, R>(reader: &mut R, endian: binrw::Endian, n: u16) -> BinResult<Vec<T>>
        where
            T: for<'a> BinRead<Args<'a> = ()>,
            R: std::io::Read + std::io::Seek,
        {
            (0..n).map(|_| T::read_options(reader, endian, ())).collect()
        }

        Ok(if args.large {
            LockRanges::Large {
                unlocks: read_n(reader, endian, args.unlocks)?,
                locks: read_n(reader, endian, args.locks)?,
            }
        } else {
            LockRanges::Small {
                unlocks: read_n(reader, endian, args.unlocks)?,
                locks: read_n(reader, endian, args.locks)?,
            }
        })
    }
}

impl BinWrite for LockRanges {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        match self {
            LockRanges::Small { unlocks, locks } => {
                unlocks.write_options(writer, endian, ())?;
                locks.write_options(writer, endian, ())
            }
            LockRanges::Large { unlocks, locks } => {
                unlocks.write_options(writer, endian, ())?;
                locks.write_options(writer, endian, ())
            }
        }
    }
}

/// SMB_COM_LOCKING_ANDX response (2 words).
#[smb_response_binrw]
#[brw(little)]
pub struct LockingResponse {
    #[bw(calc = 2)]
    #[br(temp)]
    #[br(assert(_word_count == 2))]
    _word_count: u8,
    pub andx: AndX,
    #[bw(calc = 0)]
    #[br(temp)]
    _byte_count: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;
    use smbd_tests::*;

    test_binrw! {
        LockingResponse: LockingResponse { andx: AndX::none() } => "02ff0000000000"
    }

    #[test]
    fn test_locking_request_large_round_trip() {
        let request = LockingRequest {
            andx: AndX::none(),
            lock_type: LockType::new().with_large_files(true),
            oplock_level: 0,
            timeout: 0,
            ranges: LockRanges::Large {
                unlocks: vec![],
                locks: vec![LockRangeLarge {
                    pid: 1,
                    offset_high: 0,
                    offset_low: 0,
                    length_high: 0,
                    length_low: 10,
                }],
            },
        };
        let mut cursor = Cursor::new(Vec::new());
        request.write(&mut cursor).unwrap();
        let data = cursor.into_inner();
        let parsed = LockingRequest::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(parsed, request);
        let (unlocks, locks) = parsed.ranges.to_large();
        assert!(unlocks.is_empty());
        assert_eq!(locks[0].length(), 10);
    }

    #[test]
    fn test_small_ranges_normalize() {
        let ranges = LockRanges::Small {
            unlocks: vec![LockRange {
                pid: 7,
                offset: 4,
                length: 2,
            }],
            locks: vec![],
        };
        let (unlocks, _) = ranges.to_large();
        assert_eq!(unlocks[0].offset(), 4);
        assert_eq!(unlocks[0].length(), 2);
    }
}
