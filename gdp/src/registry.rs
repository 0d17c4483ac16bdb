// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arena of open log handles, addressed by generation-checked ids.
//!
//! Events refer to the handle they originate from by [`GinId`]. A slot is reused after its
//! handle was closed, but with a new generation, so ids of closed handles never resolve to a
//! newer handle.
use std::fmt;

/// Id of an open log handle within its session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GinId {
    index: u32,
    generation: u32,
}

impl fmt::Display for GinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Debug for GinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GinId({self})")
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Inserts the value built from its future id, returns a reference to it.
    pub fn insert_with(&mut self, build: impl FnOnce(GinId) -> T) -> &T {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        let id = GinId {
            index,
            generation: slot.generation,
        };
        slot.value.insert(build(id))
    }

    pub fn get(&self, id: GinId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn remove(&mut self, id: GinId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }
}
