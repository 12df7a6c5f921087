//! # mallocator - A Drop-In C Runtime Allocator
//!
//! This crate reimplements the four C heap entry points (`malloc`, `free`,
//! `calloc`, `realloc`) on top of anonymous memory mappings, so it can be
//! interposed between an unmodified application and the operating system.
//!
//! ## Overview
//!
//! Memory is acquired from the kernel one page-aligned **region** at a time
//! and carved into variably-sized **blocks**, each led by an in-band header:
//!
//! ```text
//!   FitAllocator
//!   ┌─────────┐
//!   │ head ───┼──┐
//!   │ tail ───┼──┼────────────────────────────────────────────┐
//!   └─────────┘  ▼                                            ▼
//!   ┌───────────────────────────────┐    ┌──────────────────────────────┐
//!   │ region 1 (one mmap)           │    │ region 2 (one mmap)          │
//!   │ ┌───────┬─────┬───────┬─────┐ │    │ ┌───────┬──────────────────┐ │
//!   │ │ hdr A │ ... │ hdr B │ ... │─┼────┼►│ hdr C │ ...              │ │
//!   │ └───────┴─────┴───────┴─────┘ │    │ └───────┴──────────────────┘ │
//!   └───────────────────────────────┘    └──────────────────────────────┘
//!
//!   Headers chain through every region in one global registry.
//!   Freed blocks are reused under first/best/worst fit; a region whose
//!   blocks are all idle is returned to the kernel.
//! ```
//!
//! Every piece of bookkeeping lives inside the managed regions themselves.
//! The allocator never calls the standard heap, because once interposed it
//! *is* the standard heap.
//!
//! ## Crate Structure
//!
//! ```text
//!   mallocator
//!   ├── align      - 8-byte and page round-up macros (align!, align_to!)
//!   ├── block      - In-band block header
//!   ├── os         - Anonymous mapping primitives (mmap/munmap)
//!   ├── config     - Placement policy + scribble switches, env lookup
//!   ├── registry   - Global ordered block list (internal)
//!   ├── placement  - First/best/worst-fit selection (internal)
//!   ├── fit        - FitAllocator: grow, split, reuse, reclaim
//!   └── ffi        - Locked process-wide facade, C ABI entry points
//! ```
//!
//! ## Quick Start
//!
//! As a library, with the caller providing exclusion:
//!
//! ```rust,ignore
//! use mallocator::FitAllocator;
//!
//! let mut allocator = FitAllocator::new();
//!
//! unsafe {
//!     let ptr = allocator.allocate(100);
//!     // ... use the 100 bytes ...
//!     allocator.release(ptr);
//! }
//! assert!(allocator.is_empty());
//! ```
//!
//! As the process allocator:
//!
//! ```text
//! cargo build --release --features interpose
//! LD_PRELOAD=target/release/libmallocator.so ls
//! ```
//!
//! ## Configuration
//!
//! Two environment variables are re-read on every allocating call:
//!
//! - `ALLOCATOR_ALGORITHM`: `first_fit` (default), `best_fit` or
//!   `worst_fit`.
//! - `ALLOCATOR_SCRIBBLE`: when set to a nonzero integer, fresh payloads
//!   are filled with `0xAA` to expose reads of uninitialized memory.
//!
//! ## Limitations
//!
//! - **8-byte alignment only**: requests are rounded up to 8 bytes and the
//!   returned pointers are 8-byte aligned, never more.
//! - **No coalescing**: adjacent idle blocks are not merged; long-lived
//!   fragmented regions stay fragmented until fully idle.
//! - **One global lock**: all entry points serialize on a single spin
//!   mutex, held across the mapping syscalls.
//! - **Unix-only**: requires `libc` and anonymous `mmap`.
//!
//! ## Safety
//!
//! The crate manages raw memory; the allocator methods and C entry points
//! are `unsafe` and trust the caller to uphold the usual heap contracts
//! (no double free, no use after free, pointers come from this allocator).

pub mod align;
mod block;
mod config;
mod ffi;
mod fit;
mod os;
mod placement;
mod registry;

pub use block::{Block, HEADER_SIZE};
pub use config::{ALGORITHM_ENV, Config, ConfigError, Policy, SCRIBBLE_ENV};
pub use ffi::{calloc, free, malloc, print_memory, realloc};
pub use fit::FitAllocator;
pub use os::MapError;
