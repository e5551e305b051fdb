//! The FID table: dense 16-bit handle allocation for one session.
//!
//! A pointer array plus a byte-packed bitmap, grown by amortized doubling
//! up to a hard ceiling. Allocation scans from a hint; teardown uses the
//! file's FREEING state and refcount/notify so a concurrent operation and
//! a close racing on the same id cannot free state out from under each
//! other.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::file::{FileRef, FileState, SmbFile};
use crate::{Error, Result};

/// Initial table capacity, in slots.
pub const NR_OPEN_DEFAULT: usize = 256;
/// Hard ceiling on table capacity. FIDs are 16-bit on the wire; 0xFFFF is
/// the "invalid / all files" marker and never allocated.
pub const BITMAP_SIZE: usize = 0xFFFF;
/// The first allocatable id; id 0 is reserved as "invalid".
pub const START_FID: u16 = 1;

/// Growth granularity, in slots.
const ALLOC_UNIT: usize = 1024 / size_of::<usize>();

/// How long a teardown waits for in-flight users before declaring a
/// programming error.
const UNBIND_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct FidTableInner {
    slots: Vec<Option<Arc<SmbFile>>>,
    bitmap: Vec<u8>,
    start_pos: usize,
}

impl FidTableInner {
    fn with_capacity(capacity: usize) -> Self {
        FidTableInner {
            slots: vec![None; capacity],
            bitmap: vec![0; capacity.div_ceil(8)],
            start_pos: START_FID as usize,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn test_bit(&self, id: usize) -> bool {
        self.bitmap[id / 8] & (1 << (id % 8)) != 0
    }

    fn set_bit(&mut self, id: usize) {
        self.bitmap[id / 8] |= 1 << (id % 8);
    }

    fn clear_bit(&mut self, id: usize) {
        self.bitmap[id / 8] &= !(1 << (id % 8));
    }

    fn find_zero_from(&self, from: usize) -> Option<usize> {
        (from..self.capacity()).find(|&id| !self.test_bit(id))
    }

    /// Doubles capacity, rounded up to a power of two in [`ALLOC_UNIT`]
    /// units and capped at [`BITMAP_SIZE`]. The slot vector is swapped
    /// whole; ids never move.
    fn grow(&mut self) -> bool {
        let current = self.capacity();
        if current >= BITMAP_SIZE {
            return false;
        }
        let units = (current * 2).div_ceil(ALLOC_UNIT);
        let grown = (units.next_power_of_two() * ALLOC_UNIT).min(BITMAP_SIZE);
        if grown <= current {
            return false;
        }
        self.slots.resize(grown, None);
        self.bitmap.resize(grown.div_ceil(8), 0);
        true
    }
}

/// A session's FID table.
pub struct FidTable {
    inner: Mutex<FidTableInner>,
}

impl Default for FidTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FidTable {
    pub fn new() -> Self {
        FidTable {
            inner: Mutex::new(FidTableInner::with_capacity(NR_OPEN_DEFAULT)),
        }
    }

    /// Allocates the first free id at or above the scan hint.
    pub fn allocate(&self) -> Result<u16> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            // The hint may sit past a freed lower id; fall back to a full
            // scan from START_FID before growing.
            let found = inner
                .find_zero_from(inner.start_pos)
                .or_else(|| inner.find_zero_from(START_FID as usize));
            if let Some(id) = found {
                inner.set_bit(id);
                inner.start_pos = id + 1;
                return Ok(id as u16);
            }
            if !inner.grow() {
                return Err(Error::TooManyOpenFiles);
            }
        }
    }

    /// Publishes a file under a previously allocated id.
    pub fn bind(&self, id: u16, file: Arc<SmbFile>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .slots
            .get_mut(id as usize)
            .ok_or_else(|| Error::fault(format!("bind of fid {id} beyond table")))?;
        if slot.is_some() {
            return Err(Error::fault(format!("bind of fid {id} onto occupied slot")));
        }
        *slot = Some(file);
        Ok(())
    }

    /// Resolves an id to a usage-counted file reference.
    ///
    /// Returns `None` for unbound ids and for files already in FREEING.
    pub fn lookup(&self, id: u16) -> Option<FileRef> {
        if id < START_FID {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        let file = inner.slots.get(id as usize)?.as_ref()?;
        if file.state() == FileState::Freeing {
            return None;
        }
        Some(FileRef::acquire(file.clone()))
    }

    /// Returns the id's bit to the free pool.
    pub fn release(&self, id: u16) {
        let mut inner = self.inner.lock().unwrap();
        if (id as usize) < inner.capacity() {
            inner.clear_bit(id as usize);
            if (id as usize) < inner.start_pos {
                inner.start_pos = id as usize;
            }
        }
    }

    /// Detaches the file bound to `id` and waits out in-flight users.
    ///
    /// The file is moved to FREEING under the table guard, so no new
    /// lookups can succeed; the wait happens outside the guard. A drain
    /// that outlives the timeout is a programming error, reported rather
    /// than ignored.
    pub async fn unbind(&self, id: u16) -> Result<Arc<SmbFile>> {
        let file = {
            let mut inner = self.inner.lock().unwrap();
            let slot = inner
                .slots
                .get_mut(id as usize)
                .ok_or(Error::InvalidHandle(id))?;
            let file = slot.take().ok_or(Error::InvalidHandle(id))?;
            file.set_state(FileState::Freeing);
            file
        };
        self.release(id);

        match tokio::time::timeout(UNBIND_DRAIN_TIMEOUT, file.wait_unused()).await {
            Ok(()) => Ok(file),
            Err(_) => Err(Error::fault(format!(
                "fid {id} still referenced after drain timeout"
            ))),
        }
    }

    /// Snapshot of every bound file, for flush-all and session teardown.
    pub fn all_ids(&self) -> Vec<u16> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id as u16))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::tests::open_file_for_tests;

    #[tokio::test]
    async fn test_allocate_bind_lookup_unbind() {
        let table = FidTable::new();
        let id = table.allocate().unwrap();
        assert_eq!(id, START_FID);
        let file = open_file_for_tests();
        table.bind(id, file.clone()).unwrap();

        assert!(table.lookup(id).is_some());
        let unbound = table.unbind(id).await.unwrap();
        assert!(Arc::ptr_eq(&unbound, &file));
        assert!(table.lookup(id).is_none());
    }

    #[tokio::test]
    async fn test_ids_are_dense_and_unique() {
        let table = FidTable::new();
        let ids: Vec<u16> = (0..10).map(|_| table.allocate().unwrap()).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(*id, START_FID + i as u16);
        }
    }

    #[tokio::test]
    async fn test_release_moves_hint_down() {
        let table = FidTable::new();
        let a = table.allocate().unwrap();
        let _b = table.allocate().unwrap();
        table.release(a);
        assert_eq!(table.allocate().unwrap(), a);
    }

    #[tokio::test]
    async fn test_growth_past_default() {
        let table = FidTable::new();
        for _ in 0..NR_OPEN_DEFAULT + 10 {
            table.allocate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_bind_occupied_slot_is_internal_error() {
        let table = FidTable::new();
        let id = table.allocate().unwrap();
        table.bind(id, open_file_for_tests()).unwrap();
        assert!(table.bind(id, open_file_for_tests()).is_err());
    }

    #[tokio::test]
    async fn test_freeing_file_hides_from_lookup() {
        let table = FidTable::new();
        let id = table.allocate().unwrap();
        let file = open_file_for_tests();
        table.bind(id, file.clone()).unwrap();
        file.set_state(FileState::Freeing);
        assert!(table.lookup(id).is_none());
    }

    #[tokio::test]
    async fn test_unbind_waits_for_inflight_reference() {
        let table = FidTable::new();
        let id = table.allocate().unwrap();
        let file = open_file_for_tests();
        table.bind(id, file).unwrap();

        let in_flight = table.lookup(id).unwrap();
        let table = Arc::new(table);
        let unbind_table = table.clone();
        let unbind = tokio::spawn(async move { unbind_table.unbind(id).await });

        // The drain completes only once the in-flight reference drops.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(in_flight);
        unbind.await.unwrap().unwrap();
    }
}
