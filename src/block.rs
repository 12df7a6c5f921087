//! The in-band block header.
//!
//! Every allocation handed out by this crate is preceded by a fixed-size
//! [`Block`] header living inside the same mapped region as the payload.
//! The allocator cannot ask the standard heap for metadata storage (it *is*
//! the standard heap when interposed), so all bookkeeping is in-band:
//!
//! ```text
//!  ┌──────────────────┬──────────────────────────┐
//!  │   Block header   │         Payload          │
//!  │  (HEADER_SIZE)   │  (usage - HEADER_SIZE)   │
//!  └──────────────────┴──────────────────────────┘
//!  ▲                  ▲
//!  │                  └── pointer returned to the user
//!  └── header, recovered via `Block::from_payload`
//! ```

use std::mem;

/// Size in bytes of the in-band [`Block`] header.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(HEADER_SIZE % 8 == 0);

/// Metadata placed immediately before every payload.
///
/// Invariants maintained by the allocator:
///
/// - `size` is a multiple of 8 and counts the header itself.
/// - `usage` is either 0 (idle block) or within `[HEADER_SIZE, size]`.
/// - `region_start` points at the first block of the enclosing mapping;
///   `region_size` is meaningful only on that first block.
/// - `next` threads the block into the global registry; blocks of one
///   region form a contiguous, address-ordered run there.
#[repr(C)]
pub struct Block {
  /// Unique identifier, fresh for every allocation, reuse and split residue.
  pub alloc_id: u64,

  /// Total bytes owned by this block, header included.
  pub size: usize,

  /// Bytes currently in use, header included. Zero means idle.
  pub usage: usize,

  /// First block of the enclosing mapped region.
  pub region_start: *mut Block,

  /// Total bytes of the enclosing mapping. Only valid when this block is
  /// the region's first block; undefined otherwise.
  pub region_size: usize,

  /// Successor in the global registry.
  pub next: *mut Block,
}

impl Block {
  /// Pointer to the payload that starts right after `block`'s header.
  ///
  /// # Safety
  ///
  /// `block` must point to an initialized header inside a live mapping.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { block.add(1).cast() }
  }

  /// Recovers the header from a payload pointer previously produced by
  /// [`Block::payload`].
  ///
  /// # Safety
  ///
  /// `address` must be a payload pointer handed out by this allocator whose
  /// block is still mapped.
  pub unsafe fn from_payload(address: *mut u8) -> *mut Block {
    unsafe { address.sub(HEADER_SIZE).cast() }
  }

  /// One past the last byte owned by `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to an initialized header inside a live mapping.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { block.cast::<u8>().add((*block).size) }
  }

  /// Whether the block is free for reuse.
  pub fn is_idle(&self) -> bool {
    self.usage == 0
  }

  /// Bytes available at the tail of this block: the whole block when idle,
  /// the unused remainder when active.
  pub fn slack(&self) -> usize {
    self.size - self.usage
  }

  /// Bytes usable by the client, i.e. `usage` without the header.
  pub fn payload_size(&self) -> usize {
    if self.usage == 0 { 0 } else { self.usage - HEADER_SIZE }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::ptr;

  #[test]
  fn header_size_is_8_aligned() {
    assert_eq!(HEADER_SIZE % 8, 0);
  }

  #[test]
  fn payload_math_round_trips() {
    let mut storage = [0u64; 16];
    let block = storage.as_mut_ptr().cast::<Block>();

    unsafe {
      ptr::write(
        block,
        Block {
          alloc_id: 7,
          size: 128,
          usage: HEADER_SIZE + 40,
          region_start: block,
          region_size: 4096,
          next: ptr::null_mut(),
        },
      );

      let payload = Block::payload(block);
      assert_eq!(payload as usize, block as usize + HEADER_SIZE);
      assert_eq!(Block::from_payload(payload), block);
      assert_eq!(Block::end(block) as usize, block as usize + 128);
    }
  }

  #[test]
  fn slack_and_payload_accounting() {
    let block = Block {
      alloc_id: 0,
      size: 256,
      usage: HEADER_SIZE + 64,
      region_start: ptr::null_mut(),
      region_size: 0,
      next: ptr::null_mut(),
    };
    assert!(!block.is_idle());
    assert_eq!(block.slack(), 256 - HEADER_SIZE - 64);
    assert_eq!(block.payload_size(), 64);

    let idle = Block { usage: 0, ..block };
    assert!(idle.is_idle());
    assert_eq!(idle.slack(), 256);
    assert_eq!(idle.payload_size(), 0);
  }
}
