use std::sync::Arc;

use framestat_types::ThreadIndex;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RegistryError;
use crate::history::FrameHistory;

/// Thread indices at or above this are rejected.
pub const MAX_THREADS: i32 = 1000;

/// Shared handle to one thread's frame history. Cloning shares the same
/// history; readers keep it alive even after the session drops the slot.
#[derive(Debug, Clone)]
pub struct ThreadData {
    history: Arc<RwLock<FrameHistory>>,
}

impl ThreadData {
    fn new(history_secs: f64) -> Self {
        Self {
            history: Arc::new(RwLock::new(FrameHistory::new(history_secs))),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, FrameHistory> {
        self.history.read()
    }

    pub fn set_history(&self, secs: f64) {
        self.history.write().set_history(secs);
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, FrameHistory> {
        self.history.write()
    }
}

#[derive(Debug, Default)]
struct ThreadSlot {
    name: Option<String>,
    data: Option<ThreadData>,
}

/// Named threads of one client and their histories. A thread's history
/// may exist before its name arrives, when frames for it come first.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    slots: Vec<ThreadSlot>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names thread `index`, creating its history on first sight. An empty
    /// name only ensures the slot exists. Renaming keeps the frames.
    pub fn define(
        &mut self,
        index: ThreadIndex,
        name: &str,
        history_secs: f64,
    ) -> Result<&ThreadData, RegistryError> {
        let slot = self.slot_mut(index)?;
        if !name.is_empty() {
            slot.name = Some(name.to_owned());
        }
        Ok(slot
            .data
            .get_or_insert_with(|| ThreadData::new(history_secs)))
    }

    /// The history for `index`, creating an unnamed slot if none exists.
    pub fn history_for(
        &mut self,
        index: ThreadIndex,
        history_secs: f64,
    ) -> Result<&ThreadData, RegistryError> {
        let slot = self.slot_mut(index)?;
        Ok(slot
            .data
            .get_or_insert_with(|| ThreadData::new(history_secs)))
    }

    /// Whether the client has named this thread.
    pub fn has(&self, index: ThreadIndex) -> bool {
        self.slot(index).is_some_and(|slot| slot.name.is_some())
    }

    pub fn name(&self, index: ThreadIndex) -> Option<&str> {
        self.slot(index)?.name.as_deref()
    }

    pub fn get(&self, index: ThreadIndex) -> Option<&ThreadData> {
        self.slot(index)?.data.as_ref()
    }

    /// Number of index slots allocated, including holes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots that carry a name or a history, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadIndex, Option<&str>, Option<&ThreadData>)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            if slot.name.is_none() && slot.data.is_none() {
                return None;
            }
            let index = ThreadIndex::try_from(i).ok()?;
            Some((index, slot.name.as_deref(), slot.data.as_ref()))
        })
    }

    pub fn set_history(&self, secs: f64) {
        for data in self.slots.iter().filter_map(|slot| slot.data.as_ref()) {
            data.set_history(secs);
        }
    }

    fn slot(&self, index: ThreadIndex) -> Option<&ThreadSlot> {
        let slot = usize::try_from(index).ok()?;
        self.slots.get(slot)
    }

    fn slot_mut(&mut self, index: ThreadIndex) -> Result<&mut ThreadSlot, RegistryError> {
        if !(0..MAX_THREADS).contains(&index) {
            return Err(RegistryError::ThreadOutOfRange {
                index,
                max: MAX_THREADS,
            });
        }
        let slot = usize::try_from(index).map_err(|_| RegistryError::ThreadOutOfRange {
            index,
            max: MAX_THREADS,
        })?;
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, ThreadSlot::default);
        }
        Ok(&mut self.slots[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DEFAULT_HISTORY_SECS;

    #[test]
    fn define_creates_history_once() {
        let mut registry = ThreadRegistry::new();
        let first = registry
            .define(2, "Loader", DEFAULT_HISTORY_SECS)
            .expect("index is valid")
            .clone();
        let second = registry
            .define(2, "Streaming", 5.0)
            .expect("index is valid")
            .clone();

        assert!(Arc::ptr_eq(&first.history, &second.history));
        assert_eq!(registry.name(2), Some("Streaming"));
        assert_eq!(second.read().history(), DEFAULT_HISTORY_SECS);
        assert!(registry.has(2));
        assert!(!registry.has(1));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn frames_before_definition_get_an_unnamed_slot() {
        let mut registry = ThreadRegistry::new();
        registry
            .history_for(4, DEFAULT_HISTORY_SECS)
            .expect("index is valid");
        assert!(!registry.has(4));
        assert!(registry.get(4).is_some());
        registry
            .define(4, "", DEFAULT_HISTORY_SECS)
            .expect("index is valid");
        assert!(!registry.has(4));

        registry
            .define(4, "Audio", DEFAULT_HISTORY_SECS)
            .expect("index is valid");
        assert!(registry.has(4));
        registry
            .define(4, "", DEFAULT_HISTORY_SECS)
            .expect("index is valid");
        assert_eq!(registry.name(4), Some("Audio"));
        let listed: Vec<_> = registry.iter().map(|(i, name, _)| (i, name)).collect();
        assert_eq!(listed, vec![(4, Some("Audio"))]);
    }

    #[test]
    fn out_of_range_threads_are_rejected() {
        let mut registry = ThreadRegistry::new();
        assert!(matches!(
            registry.define(MAX_THREADS, "Huge", DEFAULT_HISTORY_SECS),
            Err(RegistryError::ThreadOutOfRange { .. })
        ));
        assert!(matches!(
            registry.history_for(-1, DEFAULT_HISTORY_SECS),
            Err(RegistryError::ThreadOutOfRange { index: -1, .. })
        ));
        assert!(registry.is_empty());
        assert!(registry.get(-1).is_none());
    }

    #[test]
    fn set_history_reaches_every_thread() {
        let mut registry = ThreadRegistry::new();
        registry.define(0, "Main", DEFAULT_HISTORY_SECS).expect("valid");
        registry.history_for(3, DEFAULT_HISTORY_SECS).expect("valid");
        registry.set_history(4.0);
        assert_eq!(registry.get(0).map(|d| d.read().history()), Some(4.0));
        assert_eq!(registry.get(3).map(|d| d.read().history()), Some(4.0));
    }
}
