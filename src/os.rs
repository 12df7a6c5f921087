//! Thin wrappers over the kernel's anonymous-mapping facility.
//!
//! No caching happens here; every call maps or unmaps exactly one region.

use std::{io, ptr};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};
use thiserror::Error;

/// Errors surfaced by the mapping primitives, carrying the OS errno.
#[derive(Debug, Error)]
pub enum MapError {
  #[error("mmap of {len} bytes failed: {source}")]
  Map { len: usize, source: io::Error },

  #[error("munmap of {len} bytes at {addr:#x} failed: {source}")]
  Unmap {
    addr: usize,
    len: usize,
    source: io::Error,
  },
}

/// Size in bytes of one virtual-memory page.
pub fn page_size() -> usize {
  page_size::get()
}

/// Acquires `len` bytes of zero-initialized, private, anonymous, read-write
/// memory. `len` is expected to be a whole multiple of the page size.
pub fn map_region(len: usize) -> Result<*mut u8, MapError> {
  // SAFETY: a NULL hint with MAP_PRIVATE | MAP_ANONYMOUS asks the kernel for
  // fresh pages unrelated to any existing object.
  let addr = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if addr == MAP_FAILED {
    return Err(MapError::Map {
      len,
      source: io::Error::last_os_error(),
    });
  }

  Ok(addr.cast())
}

/// Releases a mapping previously produced by [`map_region`].
///
/// # Safety
///
/// `addr` and `len` must denote exactly one live mapping returned by
/// [`map_region`]; nothing may reference its memory afterwards.
pub unsafe fn unmap_region(
  addr: *mut u8,
  len: usize,
) -> Result<(), MapError> {
  let ret = unsafe { libc::munmap(addr.cast::<c_void>(), len) };

  if ret == -1 {
    return Err(MapError::Unmap {
      addr: addr as usize,
      len,
      source: io::Error::last_os_error(),
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn map_write_unmap() {
    let len = page_size();
    let addr = map_region(len).expect("mapping one page");

    unsafe {
      // Fresh anonymous pages are zeroed by the kernel.
      for offset in (0..len).step_by(512) {
        assert_eq!(*addr.add(offset), 0);
      }

      ptr::write_bytes(addr, 0xC3, len);
      assert_eq!(*addr, 0xC3);
      assert_eq!(*addr.add(len - 1), 0xC3);

      unmap_region(addr, len).expect("unmapping the page");
    }
  }

  #[test]
  fn page_size_is_a_power_of_two() {
    assert!(page_size().is_power_of_two());
  }
}
