//! # Fit Allocator
//!
//! The allocator core: mapped regions carved into blocks, reused under a
//! configurable fit policy.
//!
//! ## How It Works
//!
//! Memory is obtained from the operating system one **region** at a time,
//! each region being a page-aligned anonymous mapping. The region's first
//! block initially spans the whole mapping; later requests may carve new
//! blocks out of the trailing slack of existing ones.
//!
//! ```text
//!                 One region (a single mmap call)
//!   ┌──────────┬─────────┬──────────┬───────────┬──────────────────┐
//!   │ header A │ payload │ header B │  payload  │   slack of B     │
//!   └──────────┴─────────┴──────────┴───────────┴──────────────────┘
//!   ▲                    ▲
//!   │                    └── block B, carved from A's former slack
//!   └── region start; this header also records the mapping size
//! ```
//!
//! ### Allocation
//!
//! 1. Round the request up to 8 bytes; add the header size.
//! 2. Ask the placement engine for a block whose free tail fits
//!    (first/best/worst fit, per configuration).
//! 3. On a hit, reactivate the block in place when it is idle, or split a
//!    new block out of its trailing slack when it is active.
//! 4. On a miss, map a fresh region rounded up to whole pages and hand out
//!    its spanning block.
//!
//! ### Release
//!
//! Releasing marks the block idle (`usage = 0`). When every block of the
//! enclosing region is idle, the region's blocks leave the registry and the
//! whole mapping is returned to the kernel. Idle blocks in still-live
//! regions wait for reuse; adjacent idle blocks are never merged.
//!
//! ## Thread Safety
//!
//! A `FitAllocator` is **not** internally synchronized. Every method takes
//! `&mut self`; the process-wide facade in the `ffi` module wraps one
//! instance in a mutex and holds it across each entry point, including the
//! composite ones (`calloc`, `realloc`), which call the unlocked methods
//! here.

use std::io::{self, Write};
use std::ptr;

use log::{debug, error, trace};

use crate::block::{Block, HEADER_SIZE};
use crate::config::Config;
use crate::os;
use crate::placement;
use crate::registry::BlockList;
use crate::{align, align_to};

/// A region-backed allocator with first/best/worst-fit block reuse.
///
/// All bookkeeping lives inside the managed regions themselves; the
/// allocator never allocates through the standard heap and is therefore
/// safe to interpose as the process allocator.
pub struct FitAllocator {
  /// Every block across all regions, in region creation order.
  blocks: BlockList,

  /// Monotonically increasing allocation-ID counter. IDs are never reused
  /// for the same logical allocation.
  allocations: u64,

  /// Placement policy and scribble switch.
  config: Config,
}

// SAFETY: the allocator owns every block reachable from its registry and
// only touches them through `&mut self`; moving the value to another thread
// transfers that ownership wholesale.
unsafe impl Send for FitAllocator {}

impl FitAllocator {
  /// Creates an empty allocator with the default configuration.
  pub const fn new() -> Self {
    Self {
      blocks: BlockList::new(),
      allocations: 0,
      config: Config::new(),
    }
  }

  /// Creates an empty allocator with the given configuration.
  pub const fn with_config(config: Config) -> Self {
    Self {
      blocks: BlockList::new(),
      allocations: 0,
      config,
    }
  }

  pub fn config(&self) -> Config {
    self.config
  }

  pub fn set_config(
    &mut self,
    config: Config,
  ) {
    self.config = config;
  }

  /// True when no regions are mapped.
  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Number of blocks currently tracked across all regions.
  pub fn block_count(&self) -> usize {
    self.blocks.block_count()
  }

  /// Total number of allocation IDs handed out so far.
  pub fn allocations(&self) -> u64 {
    self.allocations
  }

  fn next_id(&mut self) -> u64 {
    let id = self.allocations;
    self.allocations += 1;
    id
  }

  /// Allocates `size` bytes and returns an 8-byte-aligned payload pointer,
  /// or null when the kernel refuses to map a new region.
  ///
  /// The request is rounded up to the next multiple of 8; a request that is
  /// already a multiple of 8 is served exactly.
  ///
  /// # Safety
  ///
  /// The returned memory is valid until passed to [`FitAllocator::release`]
  /// or [`FitAllocator::reallocate`] on the same allocator. The caller must
  /// serialize all calls on one allocator instance.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size > usize::MAX - (HEADER_SIZE + 7) {
      return ptr::null_mut();
    }
    let size = align!(size);
    let need = size + HEADER_SIZE;

    trace!("allocation request; size = {size}, alloc = {}", self.allocations);

    let payload = match placement::select(&self.blocks, need, self.config.policy) {
      Some(block) => unsafe { self.reuse(block, need) },
      None => match unsafe { self.grow(need) } {
        Some(payload) => payload,
        None => return ptr::null_mut(),
      },
    };

    if self.config.scribble {
      // SAFETY: the block backing `payload` owns at least `size` payload
      // bytes (usage = size + HEADER_SIZE <= block size).
      unsafe { ptr::write_bytes(payload, 0xAA, size) };
    }

    payload
  }

  /// Claims `block` for a request needing `need` total bytes.
  ///
  /// An idle block is reactivated in place, keeping its `size` (the whole
  /// block stays reserved for this slot until a later split). An active
  /// block donates its trailing slack to a freshly carved residue inserted
  /// right after it.
  ///
  /// # Safety
  ///
  /// `block` must be linked in the registry with `slack() >= need`.
  unsafe fn reuse(
    &mut self,
    block: *mut Block,
    need: usize,
  ) -> *mut u8 {
    unsafe {
      if (*block).is_idle() {
        let previous = (*block).alloc_id;
        (*block).usage = need;
        (*block).alloc_id = self.next_id();
        debug!(
          "allocation request reusing idle alloc {previous} as alloc {}",
          (*block).alloc_id
        );
        return Block::payload(block);
      }

      // The residue header always fits: the placement engine only offers
      // blocks whose slack holds `need`, and `need >= HEADER_SIZE`.
      let residue = block.cast::<u8>().add((*block).usage).cast::<Block>();
      (*residue).alloc_id = self.next_id();
      (*residue).size = (*block).size - (*block).usage;
      (*residue).usage = need;
      (*residue).region_start = (*block).region_start;
      (*residue).region_size = (*block).region_size;
      self.blocks.insert_after(block, residue);

      // The donor shrinks to exactly its used bytes.
      (*block).size = (*block).usage;

      debug!(
        "allocation request splitting alloc {} as alloc {}",
        (*block).alloc_id,
        (*residue).alloc_id
      );
      Block::payload(residue)
    }
  }

  /// Maps a fresh region big enough for `need` total bytes (rounded up to
  /// whole pages, at least one) and hands out its spanning block.
  unsafe fn grow(
    &mut self,
    need: usize,
  ) -> Option<*mut u8> {
    let page = os::page_size();
    if need > usize::MAX - (page - 1) {
      // The request cannot even be rounded to whole pages.
      return None;
    }
    let region_size = align_to!(need, page);

    let addr = match os::map_region(region_size) {
      Ok(addr) => addr,
      Err(err) => {
        error!("{err}");
        return None;
      }
    };

    debug!("mapped new region; bytes = {region_size}");

    unsafe {
      let block = addr.cast::<Block>();
      (*block).alloc_id = self.next_id();
      (*block).size = region_size;
      (*block).usage = need;
      (*block).region_start = block;
      (*block).region_size = region_size;
      self.blocks.push_back(block);
      Some(Block::payload(block))
    }
  }

  /// Releases the allocation at `address`. Null is a no-op.
  ///
  /// The block is marked idle; when its whole region turns out to be idle,
  /// the region is unmapped and its blocks leave the registry.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live payload pointer handed out by this
  /// allocator, not released since.
  pub unsafe fn release(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    unsafe {
      let block = Block::from_payload(address);
      trace!(
        "free request; usage = {}, alloc = {}",
        (*block).usage,
        (*block).alloc_id
      );
      (*block).usage = 0;
      self.reclaim((*block).region_start);
    }
  }

  /// Unmaps the region anchored at `region_start` when every one of its
  /// blocks is idle; otherwise leaves it in place.
  ///
  /// One pass over the registry finds the last block before the region's
  /// run (`first_half`) and the first block after it (`sec_half`), checking
  /// liveness on the way. The registry is spliced before the unmap so that
  /// a refused unmap still leaves consistent state.
  unsafe fn reclaim(
    &mut self,
    region_start: *mut Block,
  ) {
    let mut first_half: *mut Block = ptr::null_mut();
    let mut sec_half: *mut Block = ptr::null_mut();
    let mut prev: *mut Block = ptr::null_mut();
    let mut inside = false;

    unsafe {
      let mut current = self.blocks.head();
      while !current.is_null() {
        if (*current).region_start == region_start {
          if !inside {
            inside = true;
            first_half = prev;
          }
          if (*current).usage != 0 {
            // Region still hosts a live allocation.
            return;
          }
        } else if inside {
          sec_half = current;
          break;
        }
        prev = current;
        current = (*current).next;
      }

      if !inside {
        error!("free request for a block outside the registry; ignored");
        return;
      }

      let region_size = (*region_start).region_size;
      self.blocks.remove_run(first_half, sec_half);
      debug!("free request unmapping idle region; bytes = {region_size}");

      if let Err(err) = os::unmap_region(region_start.cast(), region_size) {
        // The registry no longer references the region either way.
        error!("{err}");
      }
    }
  }

  /// Allocates zero-initialized space for `count` items of `size` bytes.
  ///
  /// Returns null when either factor is zero, when the product overflows,
  /// or when allocation fails.
  ///
  /// # Safety
  ///
  /// Same contract as [`FitAllocator::allocate`].
  pub unsafe fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    if count == 0 || size == 0 {
      return ptr::null_mut();
    }
    let Some(total) = count.checked_mul(size) else {
      return ptr::null_mut();
    };

    unsafe {
      let payload = self.allocate(total);
      if !payload.is_null() {
        ptr::write_bytes(payload, 0, total);
      }
      payload
    }
  }

  /// Resizes the allocation at `address` to `size` bytes.
  ///
  /// A null `address` allocates; a zero `size` releases and returns null.
  /// When the block already owns enough bytes the resize happens in place
  /// and the same pointer comes back; otherwise the payload moves to a new
  /// allocation and the old block is released. On allocation failure the
  /// old block is left untouched and null is returned.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live payload pointer handed out by this
  /// allocator.
  pub unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if size > usize::MAX - (HEADER_SIZE + 7) {
      return ptr::null_mut();
    }
    let size = align!(size);

    if address.is_null() {
      return unsafe { self.allocate(size) };
    }
    if size == 0 {
      unsafe { self.release(address) };
      return ptr::null_mut();
    }

    unsafe {
      let block = Block::from_payload(address);
      let need = size + HEADER_SIZE;

      if (*block).size >= need {
        (*block).usage = need;
        return address;
      }

      let old_payload = (*block).payload_size();
      let fresh = self.allocate(size);
      if fresh.is_null() {
        return ptr::null_mut();
      }

      ptr::copy_nonoverlapping(address, fresh, old_payload.min(size));
      self.release(address);
      fresh
    }
  }

  /// Writes the current memory state: one `[REGION]` line per mapping
  /// followed by a `[BLOCK]` line per block, in registry order.
  ///
  /// Uses only stack storage, so it never re-enters the allocator and can
  /// run inside an interposed process.
  pub fn dump(
    &self,
    out: &mut dyn Write,
  ) -> io::Result<()> {
    writeln!(out, "-- Current Memory State --")?;

    let mut current_region: *mut Block = ptr::null_mut();
    for block in self.blocks.iter() {
      // SAFETY: linked blocks stay mapped; the caller holds the exclusion
      // that guards header mutation.
      let header = unsafe { &*block };

      if header.region_start != current_region {
        current_region = header.region_start;
        let region_size = unsafe { (*current_region).region_size };
        writeln!(
          out,
          "[REGION] {:p}-{:p} {}",
          current_region,
          unsafe { current_region.cast::<u8>().add(region_size) },
          region_size,
        )?;
      }

      writeln!(
        out,
        "[BLOCK]  {:p}-{:p} ({}) {} {} {}",
        block,
        unsafe { Block::end(block) },
        header.alloc_id,
        header.size,
        header.usage,
        header.payload_size(),
      )?;
    }

    Ok(())
  }
}
