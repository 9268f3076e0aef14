//! Error types for tree operations.

use thiserror::Error;

use crate::memory::AllocError;

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by [`Tree`](crate::Tree) mutations.
///
/// Accessors never fail; they return `None` for stale handles or misses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Invalid arguments
    // =========================================================================
    /// The handle does not name a live node of this tree
    #[error("node handle is stale or belongs to another tree")]
    InvalidHandle,

    /// The node is linked into the tree and cannot be used this way
    #[error("node is attached to the tree")]
    NodeAttached,

    /// The configuration cannot drive rebalancing
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    // =========================================================================
    // Memory
    // =========================================================================
    /// Allocating would push the tree past its memory cap
    #[error("memory cap exceeded: {allocated} + {requested} bytes > {maximum} bytes")]
    CapacityExceeded {
        requested: usize,
        allocated: usize,
        maximum: usize,
    },

    /// The underlying allocator refused the request
    #[error(transparent)]
    Alloc(#[from] AllocError),

    // =========================================================================
    // Lookup
    // =========================================================================
    /// Delete was called on a tree with no nodes
    #[error("tree is empty")]
    EmptyTree,

    /// The node is not reachable from the root
    #[error("node not found in tree")]
    NotFound,

    /// A deletion walk lost its target after adjusting branch weights
    #[error("tree weights are inconsistent; the tree must be discarded")]
    Poisoned,
}
