//! Fixed-width UTF-16 string slots.

use binrw::{Endian, prelude::*};
use std::io::{Read, Seek, Write};

/// A UTF-16LE string stored in a fixed slot of `N` code units,
/// zero-padded on the right. Used for 8.3 short-name fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedWideString<const N: usize> {
    value: String,
}

impl<const N: usize> FixedWideString<N> {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Encoded length in bytes, excluding padding.
    pub fn size(&self) -> usize {
        self.value.encode_utf16().count() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl<const N: usize> BinRead for FixedWideString<N> {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let pos = reader.stream_position()?;
        let mut units = [0u16; N];
        for unit in units.iter_mut() {
            *unit = u16::read_options(reader, Endian::Little, ())?;
        }
        let end = units.iter().position(|&u| u == 0).unwrap_or(N);
        let value = String::from_utf16(&units[..end]).map_err(|e| binrw::Error::Custom {
            pos,
            err: Box::new(e),
        })?;
        Ok(Self { value })
    }
}

impl<const N: usize> BinWrite for FixedWideString<N> {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        let pos = writer.stream_position()?;
        let mut written = 0usize;
        for unit in self.value.encode_utf16() {
            if written == N {
                return Err(binrw::Error::AssertFail {
                    pos,
                    message: format!("string does not fit {N} wide slots"),
                });
            }
            unit.write_options(writer, Endian::Little, ())?;
            written += 1;
        }
        while written < N {
            0u16.write_options(writer, Endian::Little, ())?;
            written += 1;
        }
        Ok(())
    }
}

impl<const N: usize> From<&str> for FixedWideString<N> {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbd_tests::*;

    type Wide4 = FixedWideString<4>;

    test_binrw! {
        Wide4 => short: Wide4::from("AB") => "4100420000000000"
    }

    test_binrw! {
        Wide4 => full: Wide4::from("ABCD") => "4100420043004400"
    }

    #[test]
    fn test_overlong_write_fails() {
        let mut cursor = binrw::io::Cursor::new(Vec::new());
        let s = Wide4::from("ABCDE");
        assert!(s.write_le(&mut cursor).is_err());
    }
}
