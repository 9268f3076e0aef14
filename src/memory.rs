//! Slot-based allocation with optional byte tracking.
//!
//! Every block lives in a caller-owned slot (`Option<Box<[u8]>>`). The helpers
//! here enforce the slot discipline the tree relies on:
//! - allocation refuses an occupied slot, since overwriting it would leak
//! - release refuses an empty slot and leaves it empty on success
//! - the `tracked_*` variants adjust a running byte counter only on success
//!
//! Allocation failure is reported instead of aborting, so a tree with a
//! memory cap can refuse work and stay consistent.

use thiserror::Error;

/// Allocation failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The destination slot already holds a live block
    #[error("destination slot already holds a block")]
    SlotOccupied,

    /// There is no block in the slot to release
    #[error("slot holds no block to release")]
    SlotEmpty,

    /// The allocator could not provide the requested bytes
    #[error("allocator exhausted requesting {size} bytes")]
    Exhausted { size: usize },
}

/// A source of zero-initialized byte blocks.
pub trait Allocator {
    /// Allocate a zeroed block of exactly `size` bytes.
    fn allocate(&self, size: usize) -> Result<Box<[u8]>, AllocError>;
}

impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>, AllocError> {
        (**self).allocate(size)
    }
}

/// The global heap, with fallible reservation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

impl Allocator for Heap {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>, AllocError> {
        let mut block = Vec::new();
        block
            .try_reserve_exact(size)
            .map_err(|_| AllocError::Exhausted { size })?;
        block.resize(size, 0);
        Ok(block.into_boxed_slice())
    }
}

/// Allocate `size` bytes into an empty slot.
pub fn safe_allocate<A: Allocator + ?Sized>(
    alloc: &A,
    slot: &mut Option<Box<[u8]>>,
    size: usize,
) -> Result<(), AllocError> {
    if slot.is_some() {
        return Err(AllocError::SlotOccupied);
    }
    *slot = Some(alloc.allocate(size)?);
    Ok(())
}

/// Resize the block in `slot` to `size` bytes, allocating if the slot is empty.
///
/// Returns the previous block length. The slot is unchanged on failure.
pub fn safe_reallocate<A: Allocator + ?Sized>(
    alloc: &A,
    slot: &mut Option<Box<[u8]>>,
    size: usize,
) -> Result<usize, AllocError> {
    let Some(block) = slot.as_deref() else {
        safe_allocate(alloc, slot, size)?;
        return Ok(0);
    };

    let old_len = block.len();
    let mut resized = alloc.allocate(size)?;
    let keep = old_len.min(size);
    resized[..keep].copy_from_slice(&block[..keep]);
    *slot = Some(resized);
    Ok(old_len)
}

/// Release the block held in `slot`, leaving it empty.
pub fn safe_release(slot: &mut Option<Box<[u8]>>) -> Result<(), AllocError> {
    match slot.take() {
        Some(block) => {
            drop(block);
            Ok(())
        }
        None => Err(AllocError::SlotEmpty),
    }
}

/// [`safe_allocate`], adding `size` to `used` on success.
pub fn tracked_allocate<A: Allocator + ?Sized>(
    alloc: &A,
    slot: &mut Option<Box<[u8]>>,
    size: usize,
    used: &mut usize,
) -> Result<(), AllocError> {
    safe_allocate(alloc, slot, size)?;
    *used += size;
    Ok(())
}

/// [`safe_reallocate`], moving `used` by the change in block size on success.
pub fn tracked_reallocate<A: Allocator + ?Sized>(
    alloc: &A,
    slot: &mut Option<Box<[u8]>>,
    size: usize,
    used: &mut usize,
) -> Result<(), AllocError> {
    let old_len = safe_reallocate(alloc, slot, size)?;
    *used = *used - old_len + size;
    Ok(())
}

/// [`safe_release`], subtracting the released block's length from `used` on success.
pub fn tracked_release(slot: &mut Option<Box<[u8]>>, used: &mut usize) -> Result<(), AllocError> {
    let size = slot.as_deref().map_or(0, <[u8]>::len);
    safe_release(slot)?;
    *used -= size;
    Ok(())
}
