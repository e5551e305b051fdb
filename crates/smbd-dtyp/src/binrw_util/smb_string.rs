//! The SMB1 dual-coded string.
//!
//! SMB1 carries strings either as null-terminated OEM/ASCII bytes or as
//! null-terminated UTF-16LE, selected by the UNICODE bit in Flags2 of the
//! request header. [`SmbString`] parses and writes both, driven by
//! [`SmbStrArgs`].

use binrw::{Endian, prelude::*};
use std::io::{Read, Seek, SeekFrom, Write};

/// How much of the stream a string field occupies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmbStringSize {
    /// Read until (and consume) a null terminator; write one after the text.
    #[default]
    NulTerminated,
    /// Exactly this many bytes on the wire; a trailing terminator inside the
    /// range is stripped on read and not emitted on write.
    Bytes(u32),
}

/// Arguments selecting the wire form of an [`SmbString`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SmbStrArgs {
    pub unicode: bool,
    pub size: SmbStringSize,
    /// Unicode strings are 2-byte aligned from the start of the SMB header;
    /// when set, a pad byte is consumed/emitted at odd stream positions.
    pub align: bool,
}

impl SmbStrArgs {
    pub fn nul(unicode: bool) -> Self {
        Self {
            unicode,
            size: SmbStringSize::NulTerminated,
            align: false,
        }
    }

    pub fn nul_aligned(unicode: bool) -> Self {
        Self {
            align: true,
            ..Self::nul(unicode)
        }
    }

    pub fn bytes(unicode: bool, size: u32) -> Self {
        Self {
            unicode,
            size: SmbStringSize::Bytes(size),
            align: false,
        }
    }

    pub fn bytes_aligned(unicode: bool, size: u32) -> Self {
        Self {
            align: true,
            ..Self::bytes(unicode, size)
        }
    }
}

/// A string in either SMB1 wire coding.
///
/// The in-memory form is always UTF-8; the OEM coding is treated as
/// Latin-1, which covers the character set this server accepts in names.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SmbString(String);

impl SmbString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoded length in bytes, excluding any terminator.
    pub fn wire_len(&self, unicode: bool) -> usize {
        if unicode {
            self.0.encode_utf16().count() * 2
        } else {
            self.0.chars().count()
        }
    }

    /// Encoded length in bytes, including the terminator.
    pub fn wire_len_nul(&self, unicode: bool) -> usize {
        self.wire_len(unicode) + if unicode { 2 } else { 1 }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

impl BinRead for SmbString {
    type Args<'a> = SmbStrArgs;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        if args.align && args.unicode && reader.stream_position()? % 2 == 1 {
            reader.seek(SeekFrom::Current(1))?;
        }
        let pos = reader.stream_position()?;

        let raw: Vec<u8> = match args.size {
            SmbStringSize::NulTerminated => {
                let mut raw = Vec::new();
                if args.unicode {
                    loop {
                        let unit = u16::read_options(reader, Endian::Little, ())?;
                        if unit == 0 {
                            break;
                        }
                        raw.extend_from_slice(&unit.to_le_bytes());
                    }
                } else {
                    loop {
                        let b = u8::read_options(reader, Endian::Little, ())?;
                        if b == 0 {
                            break;
                        }
                        raw.push(b);
                    }
                }
                raw
            }
            SmbStringSize::Bytes(n) => {
                let mut raw = vec![0u8; n as usize];
                reader.read_exact(&mut raw)?;
                // Strip one trailing terminator if the client included it.
                if args.unicode {
                    if raw.len() >= 2 && raw[raw.len() - 2..] == [0, 0] {
                        raw.truncate(raw.len() - 2);
                    }
                } else if raw.last() == Some(&0) {
                    raw.pop();
                }
                raw
            }
        };

        let value = if args.unicode {
            if raw.len() % 2 != 0 {
                return Err(binrw::Error::AssertFail {
                    pos,
                    message: "unicode string has odd byte length".to_string(),
                });
            }
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units).map_err(|e| binrw::Error::Custom {
                pos,
                err: Box::new(e),
            })?
        } else {
            decode_latin1(&raw)
        };
        Ok(Self(value))
    }
}

impl BinWrite for SmbString {
    type Args<'a> = SmbStrArgs;

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        if args.align && args.unicode && writer.stream_position()? % 2 == 1 {
            0u8.write_options(writer, Endian::Little, ())?;
        }
        if args.unicode {
            for unit in self.0.encode_utf16() {
                unit.write_options(writer, Endian::Little, ())?;
            }
        } else {
            let pos = writer.stream_position()?;
            for ch in self.0.chars() {
                let b = u32::from(ch);
                if b > 0xff {
                    return Err(binrw::Error::AssertFail {
                        pos,
                        message: format!("character {ch:?} is not representable in OEM coding"),
                    });
                }
                (b as u8).write_options(writer, Endian::Little, ())?;
            }
        }
        if matches!(args.size, SmbStringSize::NulTerminated) {
            if args.unicode {
                0u16.write_options(writer, Endian::Little, ())?;
            } else {
                0u8.write_options(writer, Endian::Little, ())?;
            }
        }
        Ok(())
    }
}

impl From<&str> for SmbString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SmbString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<SmbString> for String {
    fn from(value: SmbString) -> Self {
        value.0
    }
}

impl std::fmt::Display for SmbString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    fn read(hex: &str, args: SmbStrArgs) -> SmbString {
        let data = smbd_tests::decode_hex(hex);
        let mut cursor = Cursor::new(&data);
        SmbString::read_le_args(&mut cursor, args).unwrap()
    }

    fn write(s: &str, args: SmbStrArgs) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        SmbString::from(s)
            .write_le_args(&mut cursor, args)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_ascii_nul_round_trip() {
        assert_eq!(read("666f6f00", SmbStrArgs::nul(false)).as_str(), "foo");
        assert_eq!(write("foo", SmbStrArgs::nul(false)), b"foo\0");
    }

    #[test]
    fn test_unicode_nul_round_trip() {
        assert_eq!(read("66006f006f000000", SmbStrArgs::nul(true)).as_str(), "foo");
        assert_eq!(
            write("foo", SmbStrArgs::nul(true)),
            vec![0x66, 0, 0x6f, 0, 0x6f, 0, 0, 0]
        );
    }

    #[test]
    fn test_sized_read_strips_terminator() {
        let s = read("410042000000", SmbStrArgs::bytes(true, 6));
        assert_eq!(s.as_str(), "AB");
    }

    #[test]
    fn test_aligned_unicode_skips_pad() {
        let data = smbd_tests::decode_hex("00cc410000000000");
        let mut cursor = Cursor::new(&data);
        cursor.set_position(1);
        let s = SmbString::read_le_args(&mut cursor, SmbStrArgs::nul_aligned(true)).unwrap();
        assert_eq!(s.as_str(), "A");
    }

    #[test]
    fn test_wire_len() {
        let s = SmbString::from("abc");
        assert_eq!(s.wire_len(false), 3);
        assert_eq!(s.wire_len(true), 6);
        assert_eq!(s.wire_len_nul(true), 8);
    }
}
