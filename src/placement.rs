//! Block placement: choosing a reusable block for a new request.

use log::trace;

use crate::block::Block;
use crate::config::Policy;
use crate::registry::BlockList;

/// Picks a block able to host a request needing `need` total bytes (payload
/// plus header) under the given policy, or `None` when no block qualifies
/// and a fresh region must be mapped.
///
/// A candidate is any block whose free tail can hold `need`: an idle block
/// of sufficient total size, or an active block with enough trailing slack
/// (the slack is carved off as a new block by the caller).
pub fn select(
  blocks: &BlockList,
  need: usize,
  policy: Policy,
) -> Option<*mut Block> {
  let mut fits_best = usize::MAX;
  // Worst fit only considers blocks with more than one slack byte. Any
  // fitting block clears that bar (its slack is at least a whole header),
  // so in practice the threshold only anchors the running maximum.
  let mut fits_worst = 1;

  let mut the_spot: Option<*mut Block> = None;

  for block in blocks.iter() {
    // SAFETY: linked blocks stay mapped, and the caller holds the exclusion
    // that guards all header mutation.
    let (size, usage) = unsafe { ((*block).size, (*block).usage) };
    if usage >= size {
      continue;
    }

    let slack = size - usage;
    if need > slack {
      continue;
    }

    match policy {
      Policy::FirstFit => return Some(block),
      Policy::BestFit => {
        if slack < fits_best {
          fits_best = slack;
          the_spot = Some(block);
        }
      }
      Policy::WorstFit => {
        if slack > fits_worst {
          fits_worst = slack;
          the_spot = Some(block);
        }
      }
    }
  }

  if let Some(block) = the_spot {
    // SAFETY: as above; the block was read inside the loop already.
    trace!("placement: using a spot with {} bytes of slack", unsafe {
      (*block).slack()
    });
  }

  the_spot
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::HEADER_SIZE;
  use std::ptr;

  // A hand-built registry is enough here; placement only reads size, usage
  // and the links.
  fn carve(
    base: *mut u64,
    index: usize,
    size: usize,
    usage: usize,
  ) -> *mut Block {
    let block = unsafe { base.cast::<u8>().add(index * HEADER_SIZE).cast::<Block>() };
    unsafe {
      ptr::write(
        block,
        Block {
          alloc_id: index as u64,
          size,
          usage,
          region_start: block,
          region_size: size,
          next: ptr::null_mut(),
        },
      );
    }
    block
  }

  #[test]
  fn no_candidate_returns_none() {
    let mut storage = [0u64; 128];
    let base = storage.as_mut_ptr();
    let mut list = BlockList::new();

    // Fully used and too-small blocks never qualify.
    let full = carve(base, 0, 256, 256);
    let small = carve(base, 1, HEADER_SIZE + 8, 0);
    unsafe {
      list.push_back(full);
      list.push_back(small);
    }

    assert_eq!(select(&list, HEADER_SIZE + 64, Policy::FirstFit), None);
    assert_eq!(select(&list, HEADER_SIZE + 64, Policy::BestFit), None);
    assert_eq!(select(&list, HEADER_SIZE + 64, Policy::WorstFit), None);
    assert_eq!(select(&BlockList::new(), 64, Policy::FirstFit), None);
  }

  #[test]
  fn first_fit_takes_the_earliest_candidate() {
    let mut storage = [0u64; 128];
    let base = storage.as_mut_ptr();
    let mut list = BlockList::new();

    let tight = carve(base, 0, 512, 512 - 104);
    let idle = carve(base, 1, 1024, 0);
    unsafe {
      list.push_back(tight);
      list.push_back(idle);
    }

    // Both qualify for a 104-byte need; first fit stops at the first.
    assert_eq!(select(&list, 104, Policy::FirstFit), Some(tight));
  }

  #[test]
  fn best_fit_minimizes_slack_and_keeps_the_first_tie() {
    let mut storage = [0u64; 128];
    let base = storage.as_mut_ptr();
    let mut list = BlockList::new();

    let wide = carve(base, 0, 2048, 0);
    let snug = carve(base, 1, 256, 0);
    let snug_too = carve(base, 2, 256, 0);
    unsafe {
      list.push_back(wide);
      list.push_back(snug);
      list.push_back(snug_too);
    }

    assert_eq!(select(&list, 128, Policy::BestFit), Some(snug));
  }

  #[test]
  fn worst_fit_maximizes_slack_and_keeps_the_first_tie() {
    let mut storage = [0u64; 128];
    let base = storage.as_mut_ptr();
    let mut list = BlockList::new();

    let wide = carve(base, 0, 2048, 0);
    let wide_too = carve(base, 1, 2048, 0);
    let snug = carve(base, 2, 256, 0);
    unsafe {
      list.push_back(wide);
      list.push_back(wide_too);
      list.push_back(snug);
    }

    assert_eq!(select(&list, 128, Policy::WorstFit), Some(wide));
  }

  #[test]
  fn active_slack_counts_as_a_candidate() {
    let mut storage = [0u64; 128];
    let base = storage.as_mut_ptr();
    let mut list = BlockList::new();

    // An active block whose trailing slack fits the need qualifies even
    // though it is not idle.
    let active = carve(base, 0, 1024, HEADER_SIZE + 64);
    unsafe {
      list.push_back(active);
    }

    let slack = 1024 - HEADER_SIZE - 64;
    assert_eq!(select(&list, slack, Policy::FirstFit), Some(active));
    assert_eq!(select(&list, slack + 8, Policy::FirstFit), None);
  }
}
