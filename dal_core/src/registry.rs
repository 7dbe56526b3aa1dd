//! Handle registry: the lifecycle firewall at the boundary.
//!
//! Foreign callers hold pointer-sized identities with no language-enforced
//! ownership, so this table is the only thing standing between a stale
//! handle and memory corruption. Identities are slot indices paired with a
//! per-slot generation; freeing a slot bumps the generation, so a reused
//! slot never validates an old identity. Double free and use-after-free
//! degrade to a logged lookup miss.

use tracing::warn;

use crate::service::ChannelId;

/// Packed identity handed across the boundary: `{generation, index}`.
///
/// The packed value is never zero (generations start at 1), so it can be
/// carried in a non-null opaque pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

impl HandleId {
    /// Pack into a pointer-sized integer.
    #[must_use]
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpack a boundary value. Garbage input yields an id that fails
    /// table lookup; it cannot yield a live entry by accident.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: (raw & 0xffff_ffff) as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

/// What kind of adapter a registry entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Reader,
    Writer,
}

/// A live boundary handle: its kind and the service channel it owns.
#[derive(Debug, Clone, Copy)]
pub struct HandleEntry {
    pub kind: HandleKind,
    pub channel: ChannelId,
}

struct Slot {
    generation: u32,
    entry: Option<HandleEntry>,
}

/// Arena of issued handle identities.
pub struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Issue a new identity for the given entry.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, entry: HandleEntry) -> HandleId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            HandleId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 1,
                entry: Some(entry),
            });
            HandleId {
                index,
                generation: 1,
            }
        }
    }

    /// Look up a live entry; `None` for freed, stale, or forged identities.
    #[must_use]
    pub fn get(&self, id: HandleId) -> Option<HandleEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry
    }

    /// Retire an identity, returning its entry.
    ///
    /// An absent identity (double free, stale generation, unknown index) is
    /// a logged no-op, never a panic or corruption.
    pub fn remove(&mut self, id: HandleId) -> Option<HandleEntry> {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            warn!(id = ?id, "free of unknown handle index");
            return None;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            warn!(id = ?id, "free of stale or already-freed handle");
            return None;
        }
        let entry = slot.entry.take();
        // Retire this generation so the identity can never validate again.
        slot.generation = next_generation(slot.generation);
        self.free.push(id.index);
        entry
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Generations live in 1..=u32::MAX; 0 is skipped on wraparound so a
/// slot-0 identity can never pack to a null pointer.
fn next_generation(generation: u32) -> u32 {
    generation.wrapping_add(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> HandleEntry {
        HandleEntry {
            kind: HandleKind::Reader,
            channel: ChannelId(n),
        }
    }

    #[test]
    fn insert_get_remove() {
        let mut table = HandleTable::new();
        let id = table.insert(entry(7));

        assert_eq!(table.get(id).unwrap().channel, ChannelId(7));
        assert_eq!(table.remove(id).unwrap().channel, ChannelId(7));
        assert!(table.get(id).is_none());
    }

    #[test]
    fn double_free_is_a_noop() {
        let mut table = HandleTable::new();
        let id = table.insert(entry(1));

        assert!(table.remove(id).is_some());
        assert!(table.remove(id).is_none());
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn reused_slot_rejects_old_identity() {
        let mut table = HandleTable::new();
        let old = table.insert(entry(1));
        table.remove(old);

        let new = table.insert(entry(2));
        // Same slot, new generation.
        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert_eq!(table.get(new).unwrap().channel, ChannelId(2));
    }

    #[test]
    fn raw_round_trip() {
        let mut table = HandleTable::new();
        let id = table.insert(entry(3));

        let raw = id.to_raw();
        assert_ne!(raw, 0, "raw identity must be non-null");
        assert_eq!(HandleId::from_raw(raw), id);
    }

    #[test]
    fn forged_raw_fails_lookup() {
        let table = HandleTable::new();
        assert!(table.get(HandleId::from_raw(0xdead_beef_0000_0001)).is_none());
    }

    #[test]
    fn generation_wraparound_skips_zero() {
        assert_eq!(next_generation(1), 2);
        assert_eq!(next_generation(u32::MAX), 1);
        // A zero generation would let a slot-0 identity pack to raw 0.
        assert_ne!(next_generation(u32::MAX), 0);
    }

    #[test]
    fn len_counts_live_entries() {
        let mut table = HandleTable::new();
        assert!(table.is_empty());
        let a = table.insert(entry(1));
        let _b = table.insert(entry(2));
        assert_eq!(table.len(), 2);
        table.remove(a);
        assert_eq!(table.len(), 1);
    }
}
