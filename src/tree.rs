//! The weight-balanced tree.
//!
//! Balance is tracked with null-node counters rather than heights: each node
//! counts the empty child slots below each of its branches. Insertion and
//! deletion walk down from the root and pivot any node on the path whose
//! heavier branch outweighs the branch being followed by the rebalance
//! threshold. Nothing off the walked path is touched, so this bounds a
//! leaf-count ratio along mutated paths, not the height of the tree.
//!
//! Nodes are constructed detached and charged to the tree's memory budget
//! immediately. Insertion links a node in, deletion unlinks it (or promotes a
//! substitute into its place) without freeing it, and only
//! [`Tree::destruct_node`] returns its bytes.

use std::cmp::Ordering;
use std::fmt;
use std::mem;

use log::{debug, error, trace};

use crate::compare::Comparator;
use crate::error::{Error, Result};
use crate::memory::{self, Allocator, Heap};
use crate::node::{node_footprint, Node, NodeArena, NodeId, Side};

// =============================================================================
// Configuration
// =============================================================================

/// Weight ratio at which a walk pivots a node.
pub const DEFAULT_REBALANCE_THRESHOLD: u64 = 3;

/// Tree settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Byte cap on everything the tree allocates; 0 means unbounded.
    pub memory_maximum: usize,
    /// Ratio of heavier to lighter branch counter that triggers a pivot.
    /// Insertion raises it by one after each pivot at the same position.
    pub rebalance_threshold: u64,
}

impl TreeConfig {
    pub fn with_memory_maximum(mut self, bytes: usize) -> Self {
        self.memory_maximum = bytes;
        self
    }

    pub fn with_rebalance_threshold(mut self, threshold: u64) -> Self {
        self.rebalance_threshold = threshold;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.rebalance_threshold < 2 {
            return Err(Error::InvalidConfig("rebalance threshold must be at least 2"));
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            memory_maximum: 0,
            rebalance_threshold: DEFAULT_REBALANCE_THRESHOLD,
        }
    }
}

// =============================================================================
// Tree
// =============================================================================

/// An ordered tree of key/data blob pairs with a memory budget.
///
/// Duplicate keys are kept as separate nodes, ordered by insertion through
/// each node's instance number.
pub struct Tree<C, A = Heap> {
    nodes: NodeArena,
    root: Option<u32>,
    len: usize,
    comparator: C,
    allocator: A,
    config: TreeConfig,
    memory_allocated: usize,
    /// Set when a deletion walk adjusted counters and then missed its target.
    poisoned: bool,
}

impl<C: Comparator> Tree<C, Heap> {
    /// An unbounded tree on the heap with the default rebalance threshold.
    pub fn new(comparator: C) -> Self {
        Self::build(comparator, Heap, TreeConfig::default())
    }

    pub fn with_config(comparator: C, config: TreeConfig) -> Result<Self> {
        Self::with_allocator(comparator, Heap, config)
    }
}

impl<C: Comparator, A: Allocator> Tree<C, A> {
    /// Bytes charged for the tree itself, before any node is constructed.
    pub const CONTROL_BLOCK_SIZE: usize = mem::size_of::<Self>();

    /// A tree drawing key and data blobs from `allocator`.
    ///
    /// The control block is counted in [`memory_allocated`](Self::memory_allocated)
    /// but lives inline in `Tree` rather than coming from `allocator`, so the
    /// only failure here is an invalid `config`.
    pub fn with_allocator(comparator: C, allocator: A, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(comparator, allocator, config))
    }

    fn build(comparator: C, allocator: A, config: TreeConfig) -> Self {
        debug!(
            "constructing tree: memory_maximum={} rebalance_threshold={}",
            config.memory_maximum, config.rebalance_threshold
        );
        Self {
            nodes: NodeArena::new(),
            root: None,
            len: 0,
            comparator,
            allocator,
            config,
            memory_allocated: Self::CONTROL_BLOCK_SIZE,
            poisoned: false,
        }
    }

    /// Destruct every attached node, children before parents.
    ///
    /// Detached nodes are left alone; they still belong to the caller.
    pub fn clear(&mut self) -> Result<()> {
        let Some(root) = self.root else {
            return Ok(());
        };

        // Reverse pre-order puts every node after its descendants.
        let mut order = Vec::with_capacity(self.len);
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            let node = self.node(idx);
            stack.extend(node.child(Side::Lesser));
            stack.extend(node.child(Side::Greater));
        }

        self.root = None;
        self.len = 0;
        for idx in order.into_iter().rev() {
            self.node_mut(idx).unlink();
            self.free_node(idx)?;
        }
        Ok(())
    }

    /// Destruct every attached node, then the tree itself.
    pub fn destruct(mut self) -> Result<()> {
        self.clear()?;
        self.memory_allocated -= Self::CONTROL_BLOCK_SIZE;
        if self.memory_allocated > 0 {
            debug!(
                "tree destructed with {} detached nodes still holding {} bytes",
                self.nodes.live(),
                self.memory_allocated
            );
        } else {
            debug!("tree destructed");
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[inline]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Bytes currently charged: the control block, every constructed node
    /// record (attached or not) and their key and data blobs.
    #[inline]
    pub fn memory_allocated(&self) -> usize {
        self.memory_allocated
    }

    #[inline]
    pub fn memory_maximum(&self) -> usize {
        self.config.memory_maximum
    }

    /// Whether a failed deletion left the counters unusable.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    #[inline]
    fn node(&self, idx: u32) -> &Node {
        self.nodes.get(idx)
    }

    #[inline]
    fn node_mut(&mut self, idx: u32) -> &mut Node {
        self.nodes.get_mut(idx)
    }

    #[inline]
    fn handle(&self, idx: Option<u32>) -> Option<NodeId> {
        idx.map(|i| self.nodes.id(i))
    }

    fn resolve(&self, id: NodeId) -> Result<u32> {
        self.nodes.resolve(id).ok_or(Error::InvalidHandle)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        Ok(())
    }

    fn ensure_capacity(&self, requested: usize) -> Result<()> {
        let maximum = self.config.memory_maximum;
        if maximum > 0 && self.memory_allocated.saturating_add(requested) > maximum {
            debug!(
                "refusing {requested} bytes: {} of {maximum} already allocated",
                self.memory_allocated
            );
            return Err(Error::CapacityExceeded {
                requested,
                allocated: self.memory_allocated,
                maximum,
            });
        }
        Ok(())
    }

    #[inline]
    fn attached(&self, idx: u32) -> bool {
        self.root == Some(idx) || self.node(idx).parent.is_some()
    }

    /// Counter value for a branch holding `link`.
    #[inline]
    fn branch_weight(&self, link: Option<u32>) -> u64 {
        link.map_or(1, |i| self.node(i).weight())
    }

    /// Point whatever referenced `old` (its parent, or the root) at `new`.
    fn replace_child(&mut self, parent: Option<u32>, old: u32, new: Option<u32>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let node = self.node_mut(p);
                if node.child(Side::Lesser) == Some(old) {
                    node.set_child(Side::Lesser, new);
                } else {
                    debug_assert_eq!(node.child(Side::Greater), Some(old));
                    node.set_child(Side::Greater, new);
                }
            }
        }
    }

    #[inline]
    fn set_parent(&mut self, link: Option<u32>, parent: Option<u32>) {
        if let Some(child) = link {
            self.node_mut(child).parent = parent;
        }
    }

    /// Key order, with instance breaking ties.
    fn order(&self, a: u32, b: u32) -> Ordering {
        let (a, b) = (self.node(a), self.node(b));
        self.comparator
            .compare(a.key(), b.key())
            .then(a.instance.cmp(&b.instance))
    }

    fn free_node(&mut self, idx: u32) -> Result<()> {
        let node = self.nodes.get_mut(idx);
        memory::tracked_release(&mut node.data, &mut self.memory_allocated)?;
        memory::tracked_release(&mut node.key, &mut self.memory_allocated)?;
        self.nodes.remove(idx, &mut self.memory_allocated)?;
        Ok(())
    }
}

// =============================================================================
// Node construction and access
// =============================================================================

impl<C: Comparator, A: Allocator> Tree<C, A> {
    /// Construct a detached node with zeroed key and data blobs.
    ///
    /// The bytes are charged to this tree immediately. Fill the key through
    /// [`key_mut`](Self::key_mut) before inserting. Nothing is left allocated
    /// when this fails.
    pub fn construct_node(&mut self, key_size: usize, data_size: usize) -> Result<NodeId> {
        self.ensure_capacity(node_footprint(key_size, data_size))?;

        let idx = self
            .nodes
            .try_insert(Node::detached(), &mut self.memory_allocated)?;

        let mut key = None;
        if let Err(e) =
            memory::tracked_allocate(&self.allocator, &mut key, key_size, &mut self.memory_allocated)
        {
            self.discard_record(idx);
            return Err(e.into());
        }

        let mut data = None;
        if let Err(e) = memory::tracked_allocate(
            &self.allocator,
            &mut data,
            data_size,
            &mut self.memory_allocated,
        ) {
            // `key` was filled by the tracked_allocate just above.
            memory::tracked_release(&mut key, &mut self.memory_allocated)
                .expect("key block was allocated above");
            self.discard_record(idx);
            return Err(e.into());
        }

        let node = self.node_mut(idx);
        node.key = key;
        node.data = data;
        Ok(self.nodes.id(idx))
    }

    /// Construct a detached node holding copies of `key` and `data`.
    pub fn construct_node_from(&mut self, key: &[u8], data: &[u8]) -> Result<NodeId> {
        let id = self.construct_node(key.len(), data.len())?;
        let idx = self.resolve(id)?;
        let node = self.nodes.get_mut(idx);
        if let Some(k) = node.key.as_deref_mut() {
            k.copy_from_slice(key);
        }
        if let Some(d) = node.data.as_deref_mut() {
            d.copy_from_slice(data);
        }
        Ok(id)
    }

    fn discard_record(&mut self, idx: u32) {
        // Only called on a slot construct_node inserted in the same call.
        self.nodes
            .remove(idx, &mut self.memory_allocated)
            .expect("record was inserted above");
    }

    /// Free a detached node's data, key and record, in that order.
    pub fn destruct_node(&mut self, id: NodeId) -> Result<()> {
        let idx = self.resolve(id)?;
        if self.attached(idx) {
            return Err(Error::NodeAttached);
        }
        self.free_node(idx)
    }

    /// Resize a node's data blob, keeping its prefix and zero-filling growth.
    pub fn resize_data(&mut self, id: NodeId, size: usize) -> Result<()> {
        let idx = self.resolve(id)?;
        let old = self.node(idx).data().len();
        if size > old {
            self.ensure_capacity(size - old)?;
        }
        let node = self.nodes.get_mut(idx);
        memory::tracked_reallocate(
            &self.allocator,
            &mut node.data,
            size,
            &mut self.memory_allocated,
        )?;
        Ok(())
    }

    pub fn key(&self, id: NodeId) -> Option<&[u8]> {
        let idx = self.nodes.resolve(id)?;
        Some(self.node(idx).key())
    }

    /// Mutable key access, only while the node is detached.
    pub fn key_mut(&mut self, id: NodeId) -> Option<&mut [u8]> {
        let idx = self.nodes.resolve(id)?;
        if self.attached(idx) {
            return None;
        }
        self.node_mut(idx).key.as_deref_mut()
    }

    pub fn data(&self, id: NodeId) -> Option<&[u8]> {
        let idx = self.nodes.resolve(id)?;
        Some(self.node(idx).data())
    }

    pub fn data_mut(&mut self, id: NodeId) -> Option<&mut [u8]> {
        let idx = self.nodes.resolve(id)?;
        self.node_mut(idx).data.as_deref_mut()
    }

    /// Position among attached nodes with an equal key, starting at 1.
    pub fn instance(&self, id: NodeId) -> Option<u64> {
        let idx = self.nodes.resolve(id)?;
        Some(self.node(idx).instance)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.nodes.resolve(id).is_some_and(|idx| self.attached(idx))
    }

    pub fn root(&self) -> Option<NodeId> {
        self.handle(self.root)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.nodes.resolve(id)?;
        self.handle(self.node(idx).parent)
    }

    pub fn lesser(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.nodes.resolve(id)?;
        self.handle(self.node(idx).child(Side::Lesser))
    }

    pub fn greater(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.nodes.resolve(id)?;
        self.handle(self.node(idx).child(Side::Greater))
    }
}

// =============================================================================
// Insertion and pivots
// =============================================================================

impl<C: Comparator, A: Allocator> Tree<C, A> {
    /// Link a detached node into the tree.
    ///
    /// A key equal to one already present sorts after it: the new node takes
    /// the next instance number and the walk continues down the greater side.
    pub fn insert(&mut self, id: NodeId) -> Result<()> {
        self.ensure_usable()?;
        let new = self.resolve(id)?;
        if self.attached(new) {
            return Err(Error::NodeAttached);
        }

        let node = self.node_mut(new);
        node.unlink();
        node.instance = 1;

        let Some(mut cursor) = self.root else {
            self.root = Some(new);
            self.len += 1;
            return Ok(());
        };

        let base = self.config.rebalance_threshold;
        let mut threshold = base;
        loop {
            let side = match self
                .comparator
                .compare(self.node(new).key(), self.node(cursor).key())
            {
                Ordering::Less => Side::Lesser,
                Ordering::Greater => Side::Greater,
                Ordering::Equal => {
                    let instance = self.node(cursor).instance + 1;
                    self.node_mut(new).instance = instance;
                    Side::Greater
                }
            };

            let node = self.node(cursor);
            if node.nulls(side) / node.nulls(side.opposite()) >= threshold {
                cursor = self.pivot(cursor, side);
                // Re-examine the new subtree root without immediately
                // pivoting it back.
                threshold += 1;
                continue;
            }

            // The new node will add one null slot below this branch.
            let node = self.node_mut(cursor);
            node.set_nulls(side, node.nulls(side) + 1);
            match node.child(side) {
                Some(child) => {
                    cursor = child;
                    threshold = base;
                }
                None => {
                    node.set_child(side, Some(new));
                    self.node_mut(new).parent = Some(cursor);
                    self.len += 1;
                    return Ok(());
                }
            }
        }
    }

    /// Rotate the subtree rooted at `at`, lifting its `heavy` child into its
    /// place. Lifting the lesser child (a lesser-to-greater pivot):
    ///
    /// ```text
    ///         Y                 W
    ///        / \               / \
    ///       W   Z     ->      U   Y
    ///      / \                   / \
    ///     U   X                 X   Z
    /// ```
    ///
    /// Only Y's lesser counter and W's greater counter change; the subtree's
    /// total weight is preserved. Returns the new subtree root.
    fn pivot(&mut self, at: u32, heavy: Side) -> u32 {
        let light = heavy.opposite();
        // Callers pivot only when the heavy counter is at least 2, which
        // means a child is present on that side.
        let lifted = self
            .node(at)
            .child(heavy)
            .expect("pivot requires a child on the heavy side");

        let parent = self.node(at).parent;
        self.replace_child(parent, at, Some(lifted));
        self.node_mut(lifted).parent = parent;

        let moved = self.node(lifted).child(light);
        self.set_parent(moved, Some(at));
        let moved_weight = self.branch_weight(moved);

        let old_root = self.node_mut(at);
        old_root.parent = Some(lifted);
        old_root.set_child(heavy, moved);
        old_root.set_nulls(heavy, moved_weight);
        let old_weight = old_root.weight();

        let new_root = self.node_mut(lifted);
        new_root.set_child(light, Some(at));
        new_root.set_nulls(light, old_weight);

        trace!("pivot at slot {at}: {heavy:?} child {lifted} lifted");
        lifted
    }
}

// =============================================================================
// Deletion
// =============================================================================

impl<C: Comparator, A: Allocator> Tree<C, A> {
    /// Unlink a node from the tree without freeing it.
    ///
    /// The walk from the root rebalances as it goes, shrinking each branch it
    /// follows by one null slot. On reaching the node it continues to the
    /// nearest node with at most one child (its in-order predecessor when it
    /// has a lesser subtree, otherwise itself or its successor), which is
    /// spliced out and promoted into the deleted node's place.
    ///
    /// # Errors
    ///
    /// A detached node fails with [`Error::NotFound`] before anything is
    /// touched. If the walk itself misses the node (only possible when the
    /// comparator is not a stable total order), the counters along the walk
    /// are already adjusted: the tree is poisoned and must be discarded.
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        self.ensure_usable()?;
        let target = self.resolve(id)?;
        let Some(mut cursor) = self.root else {
            return Err(Error::EmptyTree);
        };
        if !self.attached(target) {
            return Err(Error::NotFound);
        }

        let threshold = self.config.rebalance_threshold;
        let mut found = false;
        loop {
            let side = match self.order(target, cursor) {
                Ordering::Less => Side::Lesser,
                Ordering::Greater => Side::Greater,
                Ordering::Equal => {
                    found = true;
                    if self.node(cursor).child(Side::Lesser).is_some() {
                        Side::Lesser
                    } else {
                        Side::Greater
                    }
                }
            };

            let node = self.node(cursor);
            let Some(mut child) = node.child(side) else {
                break;
            };

            // Following `side` takes one null slot from it.
            if node.nulls(side.opposite()) / (node.nulls(side) - 1) >= threshold {
                cursor = self.pivot(cursor, side.opposite());
                // The old cursor is now the lifted node's `side` child.
                child = self
                    .node(cursor)
                    .child(side)
                    .expect("pivot leaves the old root on the followed side");
            }

            let node = self.node_mut(cursor);
            node.set_nulls(side, node.nulls(side) - 1);
            cursor = child;
        }

        if !found {
            self.poisoned = true;
            error!("delete walk missed its target; branch weights are inconsistent");
            return Err(Error::NotFound);
        }

        self.promote(target, cursor);
        self.len -= 1;
        Ok(())
    }

    /// Move `substitute` (a node with at most one child) into `target`'s
    /// position and unlink `target`.
    fn promote(&mut self, target: u32, substitute: u32) {
        if substitute == target {
            let parent = self.node(target).parent;
            self.replace_child(parent, target, None);
        } else {
            let sub = self.node(substitute);
            let sub_parent = sub.parent;
            let orphan = sub.child(Side::Lesser).or(sub.child(Side::Greater));
            self.replace_child(sub_parent, substitute, orphan);
            self.set_parent(orphan, sub_parent);

            // Read after the splice: it may have rewired the target's children.
            let t = self.node(target);
            let parent = t.parent;
            let lesser = t.child(Side::Lesser);
            let greater = t.child(Side::Greater);
            let lesser_nulls = t.nulls(Side::Lesser);
            let greater_nulls = t.nulls(Side::Greater);

            self.replace_child(parent, target, Some(substitute));
            let sub = self.node_mut(substitute);
            sub.parent = parent;
            sub.set_child(Side::Lesser, lesser);
            sub.set_child(Side::Greater, greater);
            sub.set_nulls(Side::Lesser, lesser_nulls);
            sub.set_nulls(Side::Greater, greater_nulls);
            self.set_parent(lesser, Some(substitute));
            self.set_parent(greater, Some(substitute));

            trace!("promoted slot {substitute} into the place of slot {target}");
        }
        self.node_mut(target).unlink();
    }
}

// =============================================================================
// Traversal and query
// =============================================================================

impl<C: Comparator, A: Allocator> Tree<C, A> {
    pub fn least(&self) -> Option<NodeId> {
        self.handle(self.root.map(|r| self.extreme(r, Side::Lesser)))
    }

    pub fn greatest(&self) -> Option<NodeId> {
        self.handle(self.root.map(|r| self.extreme(r, Side::Greater)))
    }

    /// In-order predecessor.
    pub fn next_lesser(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.nodes.resolve(id)?;
        self.handle(self.step(idx, Side::Lesser))
    }

    /// In-order successor.
    pub fn next_greater(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.nodes.resolve(id)?;
        self.handle(self.step(idx, Side::Greater))
    }

    /// The first node met whose key compares equal to `key`.
    ///
    /// Which duplicate is returned depends on the current shape of the tree.
    pub fn get_equal(&self, key: &[u8]) -> Option<NodeId> {
        let mut cursor = self.root;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            cursor = match self.comparator.compare(key, node.key()) {
                Ordering::Less => node.child(Side::Lesser),
                Ordering::Greater => node.child(Side::Greater),
                Ordering::Equal => return self.handle(Some(idx)),
            };
        }
        None
    }

    /// Number of nodes in the subtree rooted at `id` (0 for `None`).
    pub fn node_count(&self, id: Option<NodeId>) -> usize {
        let Some(root) = id.and_then(|id| self.nodes.resolve(id)) else {
            return 0;
        };
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            count += 1;
            let node = self.node(idx);
            stack.extend(node.child(Side::Lesser));
            stack.extend(node.child(Side::Greater));
        }
        count
    }

    /// Nodes on the longest downward path from `id` (0 for `None`).
    pub fn max_depth(&self, id: Option<NodeId>) -> usize {
        let Some(root) = id.and_then(|id| self.nodes.resolve(id)) else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            let node = self.node(idx);
            for child in [node.child(Side::Lesser), node.child(Side::Greater)]
                .into_iter()
                .flatten()
            {
                stack.push((child, depth + 1));
            }
        }
        deepest
    }

    /// Ascending in-order iterator over `(handle, key, data)`.
    pub fn iter(&self) -> Iter<'_, C, A> {
        Iter {
            tree: self,
            front: self.root.map(|r| self.extreme(r, Side::Lesser)),
            back: self.root.map(|r| self.extreme(r, Side::Greater)),
            remaining: self.len,
        }
    }

    fn extreme(&self, mut idx: u32, side: Side) -> u32 {
        while let Some(child) = self.node(idx).child(side) {
            idx = child;
        }
        idx
    }

    /// Neighbour of `idx` in the `side` direction of the in-order sequence.
    fn step(&self, idx: u32, side: Side) -> Option<u32> {
        if let Some(child) = self.node(idx).child(side) {
            return Some(self.extreme(child, side.opposite()));
        }

        // First ancestor reached from its other side.
        let mut child = idx;
        let mut parent = self.node(idx).parent;
        while let Some(p) = parent {
            if self.node(p).child(side.opposite()) == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.node(p).parent;
        }
        None
    }
}

// =============================================================================
// Validation
// =============================================================================

impl<C: Comparator, A: Allocator> Tree<C, A> {
    /// Check ordering, parent links, counters and length over the whole tree.
    ///
    /// Walks every node; meant for tests and debugging.
    pub fn is_valid(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(violation) => {
                debug!("invalid tree: {violation}");
                false
            }
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.poisoned {
            return Err("poisoned by a failed delete".into());
        }
        let Some(root) = self.root else {
            return if self.len == 0 {
                Ok(())
            } else {
                Err(format!("empty tree reports length {}", self.len))
            };
        };
        if self.node(root).parent.is_some() {
            return Err(format!("root slot {root} has a parent"));
        }

        // In-order walk over child links only, so parent links are checked
        // rather than trusted.
        let mut count = 0usize;
        let mut prev: Option<u32> = None;
        let mut stack = Vec::new();
        let mut cursor = Some(root);
        while cursor.is_some() || !stack.is_empty() {
            while let Some(idx) = cursor {
                stack.push(idx);
                cursor = self.node(idx).child(Side::Lesser);
            }
            let Some(idx) = stack.pop() else {
                break;
            };
            let node = self.node(idx);
            count += 1;

            if node.instance == 0 {
                return Err(format!("slot {idx} has instance 0"));
            }
            for side in [Side::Lesser, Side::Greater] {
                let child = node.child(side);
                if let Some(c) = child {
                    if self.node(c).parent != Some(idx) {
                        return Err(format!("slot {c} does not point back at parent {idx}"));
                    }
                }
                let expected = self.branch_weight(child);
                if node.nulls(side) != expected {
                    return Err(format!(
                        "slot {idx} {side:?} counter is {}, expected {expected}",
                        node.nulls(side)
                    ));
                }
            }
            if let Some(p) = prev {
                if self.order(p, idx) != Ordering::Less {
                    return Err(format!("slot {p} does not sort before slot {idx}"));
                }
            }

            prev = Some(idx);
            cursor = node.child(Side::Greater);
        }

        if count != self.len {
            return Err(format!("reachable count {count} != length {}", self.len));
        }
        Ok(())
    }
}

impl<C: Comparator, A: Allocator> fmt::Debug for Tree<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|(_, key, _)| key)).finish()
    }
}

// =============================================================================
// Iteration
// =============================================================================

pub struct Iter<'a, C, A = Heap> {
    tree: &'a Tree<C, A>,
    front: Option<u32>,
    back: Option<u32>,
    remaining: usize,
}

impl<'a, C: Comparator, A: Allocator> Iter<'a, C, A> {
    fn yield_node(&self, idx: u32) -> (NodeId, &'a [u8], &'a [u8]) {
        let tree = self.tree;
        let node = tree.node(idx);
        (tree.nodes.id(idx), node.key(), node.data())
    }
}

impl<'a, C: Comparator, A: Allocator> Iterator for Iter<'a, C, A> {
    type Item = (NodeId, &'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let idx = self.front?;
        self.remaining -= 1;
        self.front = self.tree.step(idx, Side::Greater);
        Some(self.yield_node(idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, C: Comparator, A: Allocator> DoubleEndedIterator for Iter<'a, C, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let idx = self.back?;
        self.remaining -= 1;
        self.back = self.tree.step(idx, Side::Lesser);
        Some(self.yield_node(idx))
    }
}

impl<'a, C: Comparator, A: Allocator> ExactSizeIterator for Iter<'a, C, A> {}

impl<'a, C: Comparator, A: Allocator> IntoIterator for &'a Tree<C, A> {
    type Item = (NodeId, &'a [u8], &'a [u8]);
    type IntoIter = Iter<'a, C, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
