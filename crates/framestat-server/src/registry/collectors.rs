use std::sync::LazyLock;

use framestat_types::{CollectorDef, CollectorIndex, ROOT_COLLECTOR};

use crate::error::RegistryError;

/// Collector indices at or above this are rejected.
pub const MAX_COLLECTORS: i32 = 1000;

const FULL_NAME_SEPARATOR: &str = ":";

static UNKNOWN_COLLECTOR: LazyLock<CollectorDef> = LazyLock::new(CollectorDef::unknown);

/// Collector definitions received from one client, indexed by the
/// client-assigned collector index. Indices may arrive in any order and
/// leave holes.
#[derive(Debug, Default)]
pub struct CollectorRegistry {
    slots: Vec<Option<CollectorDef>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `def`, replacing and returning any previous definition with
    /// the same index.
    pub fn add_collector(
        &mut self,
        def: CollectorDef,
    ) -> Result<Option<CollectorDef>, RegistryError> {
        let index = def.index;
        let slot = slot_for(index).ok_or(RegistryError::CollectorOutOfRange {
            index,
            max: MAX_COLLECTORS,
        })?;

        if index != ROOT_COLLECTOR {
            if def.parent_index == index {
                return Err(RegistryError::SelfParent { index });
            }
            if self.reaches(def.parent_index, index) {
                return Err(RegistryError::ParentCycle {
                    index,
                    parent: def.parent_index,
                });
            }
        }

        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        Ok(self.slots[slot].replace(def))
    }

    /// Number of index slots allocated, including holes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn has(&self, index: CollectorIndex) -> bool {
        self.lookup(index).is_some()
    }

    /// The definition for `index`, or the shared "Unknown" definition.
    pub fn get(&self, index: CollectorIndex) -> &CollectorDef {
        self.lookup(index).unwrap_or(&*UNKNOWN_COLLECTOR)
    }

    pub fn name(&self, index: CollectorIndex) -> &str {
        &self.get(index).name
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectorDef> {
        self.slots.iter().flatten()
    }

    /// Ancestor names joined with `:`, from just below the root down to
    /// `index` itself. The root contributes its name only when asked for
    /// directly.
    pub fn full_name(&self, index: CollectorIndex) -> String {
        let mut names: Vec<&str> = Vec::new();
        let mut current = index;
        for _ in 0..=MAX_COLLECTORS {
            let Some(def) = self.lookup(current) else {
                names.push(UNKNOWN_COLLECTOR.name.as_str());
                break;
            };
            names.push(def.name.as_str());
            if def.index == ROOT_COLLECTOR || def.parent_index == ROOT_COLLECTOR {
                break;
            }
            current = def.parent_index;
        }
        names.reverse();
        names.join(FULL_NAME_SEPARATOR)
    }

    /// Number of parent links from `child` up to `parent`: `0` when they
    /// are the same collector, `-1` when `parent` is not an ancestor.
    pub fn child_distance(&self, parent: CollectorIndex, child: CollectorIndex) -> i32 {
        let mut distance = 0;
        let mut current = child;
        for _ in 0..=MAX_COLLECTORS {
            if current == parent {
                return distance;
            }
            if current == ROOT_COLLECTOR {
                return -1;
            }
            let Some(def) = self.lookup(current) else {
                return -1;
            };
            current = def.parent_index;
            distance += 1;
        }
        -1
    }

    fn lookup(&self, index: CollectorIndex) -> Option<&CollectorDef> {
        let slot = usize::try_from(index).ok()?;
        self.slots.get(slot)?.as_ref()
    }

    /// Whether walking parent links from `start` reaches `target`.
    fn reaches(&self, start: CollectorIndex, target: CollectorIndex) -> bool {
        let mut current = start;
        for _ in 0..=MAX_COLLECTORS {
            if current == target {
                return true;
            }
            if current == ROOT_COLLECTOR {
                return false;
            }
            match self.lookup(current) {
                Some(def) => current = def.parent_index,
                None => return false,
            }
        }
        true
    }
}

fn slot_for(index: CollectorIndex) -> Option<usize> {
    if (0..MAX_COLLECTORS).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}
