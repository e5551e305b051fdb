//! [`Boolean`] implementation for binrw.

use binrw::{Endian, prelude::*};
use std::io::{Read, Seek, Write};

/// A single-byte boolean, as defined by MS-FSCC 2.1.8.
///
/// Any non-zero value parses as `true`; `true` is always written as `1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Boolean(bool);

impl Boolean {
    const _VALIDATE_SIZE_OF: [u8; 1] = [0; size_of::<Self>()];
}

impl BinRead for Boolean {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let value = u8::read_options(reader, Endian::Little, ())?;
        Ok(Boolean(value != 0))
    }
}

impl BinWrite for Boolean {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        u8::from(self.0).write_options(writer, Endian::Little, ())
    }
}

impl From<bool> for Boolean {
    fn from(value: bool) -> Self {
        Boolean(value)
    }
}

impl From<Boolean> for bool {
    fn from(val: Boolean) -> Self {
        val.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbd_tests::*;

    test_binrw! {
        Boolean => set: Boolean::from(true) => "01"
    }

    test_binrw! {
        Boolean => clear: Boolean::from(false) => "00"
    }

    // Non-zero is considered true!
    test_binrw_read! {
        Boolean => nonzero: Boolean::from(true) => "2a"
    }
}
