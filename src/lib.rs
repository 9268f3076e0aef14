//! # wbtree
//!
//! A memory-bounded ordered tree of key/data blobs, balanced by null-node
//! weight ratios instead of heights or colors.
//!
//! Every node counts the empty child slots under each of its branches.
//! Insertion and deletion rebalance in the same downward walk that finds
//! their position, pivoting any node whose heavier branch outweighs the
//! branch being followed by a threshold ratio (3 by default). Duplicate keys
//! are kept, ordered by an instance number assigned at insertion.
//!
//! Nodes are constructed through the tree, which charges their bytes against
//! an optional memory cap, and stay allocated until explicitly destructed:
//! deleting a node only unlinks it, so it can be reinserted.
//!
//! ## Example
//!
//! ```rust
//! use wbtree::{Lexicographic, Tree};
//!
//! let mut tree = Tree::new(Lexicographic);
//! for (key, data) in [("pear", "green"), ("apple", "red"), ("plum", "purple")] {
//!     let node = tree.construct_node_from(key.as_bytes(), data.as_bytes())?;
//!     tree.insert(node)?;
//! }
//!
//! let apple = tree.get_equal(b"apple").unwrap();
//! assert_eq!(tree.data(apple), Some(&b"red"[..]));
//!
//! let keys: Vec<&[u8]> = tree.iter().map(|(_, key, _)| key).collect();
//! assert_eq!(keys, vec![&b"apple"[..], &b"pear"[..], &b"plum"[..]]);
//!
//! tree.delete(apple)?;
//! tree.destruct_node(apple)?;
//! assert_eq!(tree.len(), 2);
//! # Ok::<(), wbtree::Error>(())
//! ```

#![deny(unsafe_code)]

pub mod compare;
pub mod error;
pub mod memory;
mod node;
mod tree;

pub use compare::{BigEndianU64, Comparator, Lexicographic};
pub use error::{Error, Result};
pub use memory::{AllocError, Allocator, Heap};
pub use node::{node_footprint, NodeId, NODE_RECORD_SIZE};
pub use tree::{Iter, Tree, TreeConfig, DEFAULT_REBALANCE_THRESHOLD};


#[cfg(test)]
mod proptests;
