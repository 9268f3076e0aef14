//! Node records and the generational arena that owns them.
//!
//! Links between nodes are plain slot indices. The arena owns every record;
//! `lesser`/`greater` describe tree ownership and `parent` is a back-reference
//! used only for navigation. Handles given to callers carry the slot's
//! generation so a handle to a destructed node is detected instead of aliasing
//! whatever reuses the slot, and the id of the arena that issued it so a
//! handle from another tree is rejected.

use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::memory::AllocError;

/// Handle to a node constructed by a [`Tree`](crate::Tree).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    arena: u32,
    index: u32,
    generation: u32,
}

/// Branch of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Lesser = 0,
    Greater = 1,
}

impl Side {
    #[inline]
    pub(crate) fn opposite(self) -> Side {
        match self {
            Side::Lesser => Side::Greater,
            Side::Greater => Side::Lesser,
        }
    }
}

pub(crate) struct Node {
    pub(crate) parent: Option<u32>,
    children: [Option<u32>; 2],
    /// Null-node counters per branch: 1 for an absent child, otherwise the
    /// child's own two counters summed.
    nulls: [u64; 2],
    /// Tie-break among equal keys, starting at 1.
    pub(crate) instance: u64,
    pub(crate) key: Option<Box<[u8]>>,
    pub(crate) data: Option<Box<[u8]>>,
}

impl Node {
    pub(crate) fn detached() -> Self {
        Self {
            parent: None,
            children: [None, None],
            nulls: [1, 1],
            instance: 1,
            key: None,
            data: None,
        }
    }

    #[inline]
    pub(crate) fn child(&self, side: Side) -> Option<u32> {
        self.children[side as usize]
    }

    #[inline]
    pub(crate) fn set_child(&mut self, side: Side, child: Option<u32>) {
        self.children[side as usize] = child;
    }

    #[inline]
    pub(crate) fn nulls(&self, side: Side) -> u64 {
        self.nulls[side as usize]
    }

    #[inline]
    pub(crate) fn set_nulls(&mut self, side: Side, n: u64) {
        self.nulls[side as usize] = n;
    }

    /// Both counters summed: what this node contributes to its parent's counter.
    #[inline]
    pub(crate) fn weight(&self) -> u64 {
        self.nulls[0] + self.nulls[1]
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children == [None, None]
    }

    /// Drop every structural link, leaving the node ready for reinsertion.
    pub(crate) fn unlink(&mut self) {
        self.parent = None;
        self.children = [None, None];
        self.nulls = [1, 1];
    }

    #[inline]
    pub(crate) fn key(&self) -> &[u8] {
        self.key.as_deref().unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Bytes charged for a node record, excluding its blobs.
pub const NODE_RECORD_SIZE: usize = mem::size_of::<Node>();

/// Bytes charged against a tree's memory cap for one node with the given blob sizes.
pub const fn node_footprint(key_size: usize, data_size: usize) -> usize {
    NODE_RECORD_SIZE
        .saturating_add(key_size)
        .saturating_add(data_size)
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Source of arena ids. Wraps after 2^32 arenas.
static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(0);

/// Node arena with a free list of vacated slots.
pub(crate) struct NodeArena {
    id: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store `node`, adding [`NODE_RECORD_SIZE`] to `used` on success.
    pub(crate) fn try_insert(&mut self, node: Node, used: &mut usize) -> Result<u32, AllocError> {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize].node = Some(node);
                idx
            }
            None => {
                let exhausted = AllocError::Exhausted {
                    size: NODE_RECORD_SIZE,
                };
                if self.slots.len() >= u32::MAX as usize {
                    return Err(exhausted);
                }
                // The free list can always take back every slot without growing.
                self.slots.try_reserve(1).map_err(|_| exhausted)?;
                self.free.try_reserve(1).map_err(|_| exhausted)?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.live += 1;
        *used += NODE_RECORD_SIZE;
        Ok(idx)
    }

    /// Vacate a slot, subtracting [`NODE_RECORD_SIZE`] from `used` on success.
    pub(crate) fn remove(&mut self, idx: u32, used: &mut usize) -> Result<Node, AllocError> {
        let slot = self
            .slots
            .get_mut(idx as usize)
            .ok_or(AllocError::SlotEmpty)?;
        let node = slot.node.take().ok_or(AllocError::SlotEmpty)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(idx);
        self.live -= 1;
        *used -= NODE_RECORD_SIZE;
        Ok(node)
    }

    #[inline]
    pub(crate) fn id(&self, idx: u32) -> NodeId {
        NodeId {
            arena: self.id,
            index: idx,
            generation: self.slots[idx as usize].generation,
        }
    }

    /// Slot index for a handle, if it was issued here and still names a live node.
    pub(crate) fn resolve(&self, id: NodeId) -> Option<u32> {
        if id.arena != self.id {
            return None;
        }
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation && slot.node.is_some()).then_some(id.index)
    }

    #[inline]
    pub(crate) fn get(&self, idx: u32) -> &Node {
        self.slots[idx as usize]
            .node
            .as_ref()
            .expect("linked slot must hold a live node")
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, idx: u32) -> &mut Node {
        self.slots[idx as usize]
            .node
            .as_mut()
            .expect("linked slot must hold a live node")
    }

    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live
    }
}
