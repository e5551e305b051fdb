//! [`PosMarker`] -- deferred offset/length fields for binrw.
//!
//! Many SMB structures carry a length or offset field that can only be known
//! after later fields have been written. A `PosMarker` records the stream
//! position the field was written at, so one of the `write_*` helpers can
//! seek back and patch the final value once it is known.

use std::cell::Cell;
use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{BinResult, Endian, prelude::*};

/// A wire field whose final value is patched after the fact.
///
/// Reading records the field's position and parses the value normally.
/// Writing emits `value` as a placeholder; pair the *following* data field
/// with one of [`PosMarker::write_size`], [`PosMarker::write_size_plus`],
/// [`PosMarker::write_aoff`] or [`PosMarker::write_roff_b`] to fill it in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PosMarker<T> {
    pub pos: Cell<u64>,
    pub value: T,
}

impl<T> PosMarker<T> {
    pub fn new(value: T) -> Self {
        Self {
            pos: Cell::new(0),
            value,
        }
    }
}

impl<T> BinRead for PosMarker<T>
where
    T: BinRead,
    for<'a> <T as BinRead>::Args<'a>: Default,
{
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let value = T::read_options(reader, endian, Default::default())?;
        Ok(Self {
            pos: Cell::new(pos),
            value,
        })
    }
}

impl<T> BinWrite for PosMarker<T>
where
    T: BinWrite,
    for<'a> <T as BinWrite>::Args<'a>: Default,
{
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.pos.set(writer.stream_position()?);
        self.value.write_options(writer, endian, Default::default())
    }
}

impl<U> PosMarker<U>
where
    U: BinWrite + TryFrom<u64>,
    for<'a> <U as BinWrite>::Args<'a>: Default,
{
    /// Seeks back to this marker and overwrites it with `value`,
    /// restoring the stream position afterwards.
    pub fn patch<W: Write + Seek>(&self, writer: &mut W, endian: Endian, value: u64) -> BinResult<()> {
        let converted = U::try_from(value).map_err(|_| binrw::Error::AssertFail {
            pos: self.pos.get(),
            message: format!("patched value {value} does not fit marker field"),
        })?;
        let return_to = writer.stream_position()?;
        writer.seek(SeekFrom::Start(self.pos.get()))?;
        converted.write_options(writer, endian, Default::default())?;
        writer.seek(SeekFrom::Start(return_to))?;
        Ok(())
    }

    /// Writes `obj`, then patches this marker with the number of bytes written.
    pub fn write_size<T, W>(
        obj: &T,
        writer: &mut W,
        endian: Endian,
        (this,): (&Self,),
    ) -> BinResult<()>
    where
        T: BinWrite,
        for<'a> <T as BinWrite>::Args<'a>: Default,
        W: Write + Seek,
    {
        let start = writer.stream_position()?;
        obj.write_options(writer, endian, Default::default())?;
        let size = writer.stream_position()? - start;
        this.patch(writer, endian, size)
    }

    /// Like [`PosMarker::write_size`], with a constant added to the patched size.
    pub fn write_size_plus<T, W>(
        obj: &T,
        writer: &mut W,
        endian: Endian,
        (this, add): (&Self, u64),
    ) -> BinResult<()>
    where
        T: BinWrite,
        for<'a> <T as BinWrite>::Args<'a>: Default,
        W: Write + Seek,
    {
        let start = writer.stream_position()?;
        obj.write_options(writer, endian, Default::default())?;
        let size = writer.stream_position()? - start;
        this.patch(writer, endian, size + add)
    }

    /// Patches this marker with the number of bytes written between the end
    /// of the marker field itself and the current position, after writing
    /// `obj`. Attach to a trailing `()` field to close over a byte block
    /// whose parts were written as several independent fields.
    pub fn write_tail_size<T, W>(
        obj: &T,
        writer: &mut W,
        endian: Endian,
        (this,): (&Self,),
    ) -> BinResult<()>
    where
        T: BinWrite,
        for<'a> <T as BinWrite>::Args<'a>: Default,
        W: Write + Seek,
    {
        obj.write_options(writer, endian, Default::default())?;
        let end = writer.stream_position()?;
        let field_end = this.pos.get() + size_of::<U>() as u64;
        this.patch(writer, endian, end - field_end)
    }

    /// Writes `obj`, then patches this marker with the absolute stream offset
    /// `obj` was written at.
    pub fn write_aoff<T, W>(
        obj: &T,
        writer: &mut W,
        endian: Endian,
        (this,): (&Self,),
    ) -> BinResult<()>
    where
        T: BinWrite,
        for<'a> <T as BinWrite>::Args<'a>: Default,
        W: Write + Seek,
    {
        let start = writer.stream_position()?;
        obj.write_options(writer, endian, Default::default())?;
        this.patch(writer, endian, start)
    }

    /// Writes `obj`, then patches this marker with the offset of `obj`
    /// relative to the position recorded by `base`.
    pub fn write_roff_b<T, W>(
        obj: &T,
        writer: &mut W,
        endian: Endian,
        (this, base): (&Self, &PosMarker<()>),
    ) -> BinResult<()>
    where
        T: BinWrite,
        for<'a> <T as BinWrite>::Args<'a>: Default,
        W: Write + Seek,
    {
        let start = writer.stream_position()?;
        obj.write_options(writer, endian, Default::default())?;
        this.patch(writer, endian, start - base.pos.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[binrw::binwrite]
    #[brw(little)]
    struct SizedBlob {
        #[bw(calc = PosMarker::default())]
        size: PosMarker<u16>,
        #[bw(write_with = PosMarker::write_size, args(&size))]
        data: Vec<u8>,
    }

    #[test]
    fn test_write_size_patches_length() {
        let mut cursor = Cursor::new(Vec::new());
        SizedBlob {
            data: vec![0xaa; 5],
        }
        .write(&mut cursor)
        .unwrap();
        assert_eq!(
            cursor.into_inner(),
            vec![0x05, 0x00, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa]
        );
    }

    #[test]
    fn test_read_records_position() {
        let data = vec![0x00u8, 0x34, 0x12];
        let mut cursor = Cursor::new(&data);
        cursor.set_position(1);
        let marker = PosMarker::<u16>::read_le(&mut cursor).unwrap();
        assert_eq!(marker.pos.get(), 1);
        assert_eq!(marker.value, 0x1234);
    }
}
