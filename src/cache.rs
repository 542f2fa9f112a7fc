//! Bounded caches for GPU-side mesh buffers and textures.
//!
//! The caches are the single owners of GPU resources; tiles borrow slots for
//! exactly as long as they are drawn and must return them before the cell is
//! selected again. Both caches evict least-recently-used *unreferenced*
//! entries when full, and both journal the work the render layer has to do
//! (chunk uploads, texture loads) the same way the tile trees hand their
//! requests to the atlas in this crate's reference renderer.

use bevy::prelude::*;
use std::collections::{HashMap, VecDeque};

/// Identifies one texture quadtree opened by the map loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TqtId(pub u32);

/// One mesh-buffer slot of the [`MeshPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshSlot(pub u32);

/// One texture slot of the [`TextureCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSlot(pub u32);

/// The texture-quadtree node backing a resident texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub tree: TqtId,
    pub level: u32,
    pub row: u32,
    pub col: u32,
}

/// A borrowed reference to a resident texture. Every acquire must be paired
/// with exactly one release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureTicket {
    pub key: TextureKey,
    pub slot: TextureSlot,
}

/// A pending upload of one tile's chunk into a mesh slot, identified by cell
/// and tile index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshUpload {
    pub slot: MeshSlot,
    pub cell: u32,
    pub tile: u32,
}

/// A bounded pool of mesh-buffer slots.
///
/// `acquire` hands out the least-recently-released slot; the caller loads a
/// chunk into it and keeps it until `release`. Exhaustion cannot happen with
/// a correctly sized pool (the working set is bounded by the screen-space
/// error test), so it is treated as a fatal programming error.
#[derive(Debug, Resource)]
pub struct MeshPool {
    /// Slots not currently held, oldest release first.
    free: VecDeque<MeshSlot>,
    capacity: usize,
    /// Chunk uploads pending for the render layer, in acquire order.
    pub uploads: Vec<MeshUpload>,
}

impl MeshPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: (0..capacity as u32).map(MeshSlot).collect(),
            capacity,
            uploads: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of slots currently held by tiles.
    pub fn in_use(&self) -> usize {
        self.capacity - self.free.len()
    }

    pub fn acquire(&mut self) -> MeshSlot {
        self.free.pop_front().expect("mesh pool out of slots")
    }

    /// Schedules `(cell, tile)`'s chunk for upload into `slot`.
    pub fn load(&mut self, slot: MeshSlot, cell: u32, tile: u32) {
        self.uploads.push(MeshUpload { slot, cell, tile });
    }

    pub fn release(&mut self, slot: MeshSlot) {
        debug_assert!(!self.free.contains(&slot), "double release of {slot:?}");
        self.free.push_back(slot);
    }
}

#[derive(Debug)]
struct TextureEntry {
    slot: TextureSlot,
    refs: u32,
}

/// A bounded, reference-counted cache of texture-quadtree nodes.
///
/// Acquiring a key that is already resident shares its slot and bumps the
/// reference count; releasing the last reference parks the entry for reuse.
/// When no free slot remains, the least-recently-unreferenced entry is
/// evicted.
#[derive(Debug, Resource)]
pub struct TextureCache {
    entries: HashMap<TextureKey, TextureEntry>,
    /// Resident but unreferenced entries, eviction candidates front-first.
    unused: VecDeque<TextureKey>,
    free: VecDeque<TextureSlot>,
    capacity: usize,
    /// Texture loads pending for the render layer, in acquire order.
    pub loads: Vec<(TextureSlot, TextureKey)>,
}

impl TextureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            unused: VecDeque::new(),
            free: (0..capacity as u32).map(TextureSlot).collect(),
            capacity,
            loads: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of entries with a positive reference count.
    pub fn referenced(&self) -> usize {
        self.entries.values().filter(|e| e.refs > 0).count()
    }

    pub fn is_resident(&self, key: &TextureKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn acquire(&mut self, key: TextureKey) -> TextureTicket {
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.refs == 0 {
                // the entry is referenced again; it is no longer evictable
                self.unused.retain(|unused| *unused != key);
            }
            entry.refs += 1;
            return TextureTicket {
                key,
                slot: entry.slot,
            };
        }

        let slot = self.allocate();
        self.loads.push((slot, key));
        self.entries.insert(key, TextureEntry { slot, refs: 1 });
        TextureTicket { key, slot }
    }

    pub fn release(&mut self, ticket: TextureTicket) {
        let entry = self
            .entries
            .get_mut(&ticket.key)
            .expect("released a texture that is not resident");
        debug_assert!(entry.refs > 0, "double release of {:?}", ticket.key);
        entry.refs -= 1;

        if entry.refs == 0 {
            self.unused.push_back(ticket.key);
        }
    }

    fn allocate(&mut self) -> TextureSlot {
        if let Some(slot) = self.free.pop_front() {
            return slot;
        }

        let victim = self
            .unused
            .pop_front()
            .expect("texture cache out of slots");
        self.entries
            .remove(&victim)
            .expect("evicted entry must be resident")
            .slot
    }
}
