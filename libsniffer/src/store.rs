use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::record::{DecodedFrame, PacketRecord};

/// Append-only, ordered collection of captured packets
///
/// Sequence ids are assigned under the write lock, so they are gapless and
/// follow the order of the vector. Readers only see fully built records.
#[derive(Debug, Default)]
pub struct PacketStore {
    records: RwLock<Vec<Arc<PacketRecord>>>,
}

impl PacketStore {
    pub fn new() -> PacketStore {
        PacketStore::default()
    }

    // a panicking reader cannot leave the vector half-written: ignore poisoning
    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<PacketRecord>>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<PacketRecord>>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign the next sequence id to `frame` and store it
    pub fn append(&self, frame: DecodedFrame) -> Arc<PacketRecord> {
        let mut records = self.write();
        let sequence_id = records.len() as u64 + 1;
        let record = Arc::new(PacketRecord::new(sequence_id, frame));
        records.push(record.clone());
        trace!("store: appended packet {}", sequence_id);
        record
    }

    /// Copy of the current contents, in sequence order
    pub fn snapshot(&self) -> Vec<Arc<PacketRecord>> {
        self.read().clone()
    }

    pub fn get(&self, sequence_id: u64) -> Option<Arc<PacketRecord>> {
        let index = usize::try_from(sequence_id).ok()?.checked_sub(1)?;
        self.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Id of the most recent record, 0 if the store is empty
    pub fn last_sequence_id(&self) -> u64 {
        self.read().last().map_or(0, |r| r.sequence_id)
    }
}
