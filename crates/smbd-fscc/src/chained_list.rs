//! Chained ("next entry offset") entry lists.
//!
//! Several TRANS2 record families prefix every entry with a 32-bit offset to
//! the next entry, zero on the last. [`ChainedItemList`] wraps a `Vec<T>` and
//! performs the offset bookkeeping and inter-entry alignment when reading or
//! writing the whole list at once.

use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{Endian, prelude::*};

const CHAINED_DEFAULT_PAD: u32 = 4;

/// Size of the prefix added before each entry.
pub const CHAINED_ITEM_PREFIX_SIZE: usize = size_of::<u32>();

/// A list of `T` entries, each preceded by the offset (from its own start)
/// of the entry after it. Entries other than the last are padded so the
/// next entry starts on an `OFFSET_PAD` boundary.
#[derive(Debug, PartialEq, Eq)]
pub struct ChainedItemList<T, const OFFSET_PAD: u32 = CHAINED_DEFAULT_PAD> {
    values: Vec<T>,
}

impl<T, const OFFSET_PAD: u32> ChainedItemList<T, OFFSET_PAD> {
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<T, const OFFSET_PAD: u32> BinWrite for ChainedItemList<T, OFFSET_PAD>
where
    T: BinWrite,
    for<'b> <T as BinWrite>::Args<'b>: Default,
{
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        for (i, item) in self.values.iter().enumerate() {
            let entry_start = writer.stream_position()?;
            0u32.write_options(writer, endian, ())?;
            item.write_options(writer, endian, Default::default())?;

            if i == self.values.len() - 1 {
                break;
            }

            // Pad so the next entry's offset field is aligned.
            let end = writer.stream_position()?;
            let aligned = end.next_multiple_of(OFFSET_PAD as u64);
            for _ in end..aligned {
                0u8.write_options(writer, endian, ())?;
            }

            let next_start = writer.stream_position()?;
            writer.seek(SeekFrom::Start(entry_start))?;
            ((next_start - entry_start) as u32).write_options(writer, endian, ())?;
            writer.seek(SeekFrom::Start(next_start))?;
        }
        Ok(())
    }
}

impl<T, const OFFSET_PAD: u32> BinRead for ChainedItemList<T, OFFSET_PAD>
where
    T: BinRead,
    for<'b> <T as BinRead>::Args<'b>: Default,
{
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let stream_end = {
            let current = reader.stream_position()?;
            let end = reader.seek(SeekFrom::End(0))?;
            reader.seek(SeekFrom::Start(current))?;
            end
        };
        // Zero data bytes is a valid, empty list.
        if reader.stream_position()? == stream_end {
            return Ok(Self { values: Vec::new() });
        }

        let mut values = Vec::new();
        loop {
            let entry_start = reader.stream_position()?;
            let next_entry_offset = u32::read_options(reader, endian, ())?;
            values.push(T::read_options(reader, endian, Default::default())?);
            if next_entry_offset == 0 {
                break;
            }
            reader.seek(SeekFrom::Start(entry_start + next_entry_offset as u64))?;
        }
        Ok(Self { values })
    }
}

impl<T, const OFFSET_PAD: u32> From<ChainedItemList<T, OFFSET_PAD>> for Vec<T> {
    fn from(value: ChainedItemList<T, OFFSET_PAD>) -> Self {
        value.values
    }
}

impl<T, const OFFSET_PAD: u32> From<Vec<T>> for ChainedItemList<T, OFFSET_PAD> {
    fn from(values: Vec<T>) -> Self {
        Self { values }
    }
}

impl<T, const OFFSET_PAD: u32> FromIterator<T> for ChainedItemList<T, OFFSET_PAD> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<T, const OFFSET_PAD: u32> std::ops::Deref for ChainedItemList<T, OFFSET_PAD> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl<T, const OFFSET_PAD: u32> Default for ChainedItemList<T, OFFSET_PAD> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    type ByteList = ChainedItemList<u8, 4>;

    #[test]
    fn test_write_aligns_and_terminates() {
        let list = ByteList::from(vec![0xaa, 0xbb]);
        let mut cursor = Cursor::new(Vec::new());
        list.write_le(&mut cursor).unwrap();
        // First entry: offset 8 (4 prefix + 1 value + 3 pad), second: offset 0.
        assert_eq!(
            cursor.into_inner(),
            vec![8, 0, 0, 0, 0xaa, 0, 0, 0, 0, 0, 0, 0, 0xbb]
        );
    }

    #[test]
    fn test_read_empty_stream() {
        let mut cursor = Cursor::new(Vec::new());
        let list = ByteList::read_le(&mut cursor).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let list = ByteList::from(vec![1, 2, 3]);
        let mut cursor = Cursor::new(Vec::new());
        list.write_le(&mut cursor).unwrap();
        cursor.set_position(0);
        assert_eq!(ByteList::read_le(&mut cursor).unwrap(), list);
    }
}
