//! Process-wide allocator facade and C ABI entry points.
//!
//! The four C entry points wrap one [`FitAllocator`] instance behind a
//! process-wide mutex. Each entry point takes the lock on entry and drops it
//! on every exit path; the composite calls (`calloc`, `realloc`) go through
//! the unlocked [`FitAllocator`] methods so the lock is acquired exactly
//! once per call. The mutex is a spin lock: unlike queueing mutexes it never
//! allocates on its slow path, which matters because when this library is
//! interposed the heap it would allocate from is this library.
//!
//! The symbols are only exported un-mangled when the `interpose` feature is
//! enabled, so test binaries and dependent crates keep their own process
//! allocator. To interpose:
//!
//! ```text
//! cargo build --release --features interpose
//! LD_PRELOAD=target/release/libmallocator.so command
//! ```
//!
//! Installing a `log` logger inside an interposed process is not supported;
//! loggers generally allocate while formatting, which would re-enter these
//! entry points. With no logger installed (the default) every log macro in
//! this crate is an allocation-free no-op.

use std::ffi::c_void;
use std::io;

use spin::Mutex;

use crate::config::Config;
use crate::fit::FitAllocator;

/// The process-wide allocator instance every entry point funnels through.
static ALLOCATOR: Mutex<FitAllocator> = Mutex::new(FitAllocator::new());

/// C `malloc`: allocates `size` bytes of uninitialized, 8-byte-aligned
/// memory, or returns null when the kernel refuses to map more.
///
/// # Safety
///
/// The returned pointer must be released exactly once via [`free`] or
/// [`realloc`] from this same library.
#[cfg_attr(feature = "interpose", unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
  // The environment is read before the lock is taken; nothing on the locked
  // path may allocate through the heap these entry points implement.
  let config = Config::from_env();
  let mut allocator = ALLOCATOR.lock();
  allocator.set_config(config);
  unsafe { allocator.allocate(size).cast() }
}

/// C `free`: releases memory previously returned by [`malloc`], [`calloc`]
/// or [`realloc`]. A null `address` is a no-op.
///
/// # Safety
///
/// `address` must be null or a live pointer handed out by this library, not
/// freed since.
#[cfg_attr(feature = "interpose", unsafe(no_mangle))]
pub unsafe extern "C" fn free(address: *mut c_void) {
  let mut allocator = ALLOCATOR.lock();
  unsafe { allocator.release(address.cast()) }
}

/// C `calloc`: allocates zeroed space for `count` items of `size` bytes.
/// Returns null when either factor is zero, when their product overflows,
/// or when allocation fails.
///
/// # Safety
///
/// Same contract as [`malloc`].
#[cfg_attr(feature = "interpose", unsafe(no_mangle))]
pub unsafe extern "C" fn calloc(
  count: usize,
  size: usize,
) -> *mut c_void {
  let config = Config::from_env();
  let mut allocator = ALLOCATOR.lock();
  allocator.set_config(config);
  unsafe { allocator.allocate_zeroed(count, size).cast() }
}

/// C `realloc`: resizes the allocation at `address` to `size` bytes.
///
/// A null `address` behaves like [`malloc`]; a zero `size` behaves like
/// [`free`] and returns null. When the allocation moves, its contents are
/// preserved up to the smaller of the old and new sizes.
///
/// # Safety
///
/// `address` must be null or a live pointer handed out by this library.
#[cfg_attr(feature = "interpose", unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(
  address: *mut c_void,
  size: usize,
) -> *mut c_void {
  let config = Config::from_env();
  let mut allocator = ALLOCATOR.lock();
  allocator.set_config(config);
  unsafe { allocator.reallocate(address.cast(), size).cast() }
}

/// Dumps the process allocator's memory state to stderr, one `[REGION]`
/// line per mapping followed by its `[BLOCK]` lines.
///
/// Uses only stack storage, so it is safe to call from an interposed
/// process at any point.
#[cfg_attr(feature = "interpose", unsafe(no_mangle))]
pub extern "C" fn print_memory() {
  let allocator = ALLOCATOR.lock();
  let mut err = io::stderr().lock();
  let _ = allocator.dump(&mut err);
}
