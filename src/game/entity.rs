//! Entity identifiers with generational indices
//!
//! Entities live in an arena owned by the world and are referred to by id.
//! Stack links and the agent's carried block are ids too, so a stale
//! reference can't silently point at an entity from a later episode:
//! - Each slot has a generation counter
//! - Resetting the world bumps every generation, invalidating old ids
//! - Slots are handed out again lowest-first, so after a reset slot order
//!   still follows insertion order

use serde::{Serialize, Deserialize};

/// A unique identifier for an entity.
///
/// Two ids with the same index but different generations refer to
/// different entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Should only be called by EntityAllocator.
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the entity arena
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Hands out entity ids and tracks which are still valid.
#[derive(Debug, Clone, Default)]
pub struct EntityAllocator {
    /// Generation counter for each slot
    generations: Vec<u32>,
    /// Slots free for reuse; the lowest index sits at the end
    free_indices: Vec<u32>,
    /// Next fresh index if no free slots available
    next_fresh: u32,
    alive_count: u32,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new id.
    pub fn allocate(&mut self) -> EntityId {
        self.alive_count += 1;

        if let Some(index) = self.free_indices.pop() {
            // Generation was already bumped by clear()
            EntityId::new(index, self.generations[index as usize])
        } else {
            let index = self.next_fresh;
            self.next_fresh += 1;
            self.generations.push(0);
            EntityId::new(index, 0)
        }
    }

    /// Check if an id belongs to the current generation of its slot.
    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index as usize;
        idx < self.generations.len()
            && self.generations[idx] == id.generation
            && !self.free_indices.contains(&id.index)
    }

    pub fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Invalidate every id handed out so far.
    pub fn clear(&mut self) {
        for generation in &mut self.generations {
            *generation += 1;
        }
        // Reversed so pop() returns slot 0 first
        self.free_indices = (0..self.next_fresh).rev().collect();
        self.alive_count = 0;
    }
}
