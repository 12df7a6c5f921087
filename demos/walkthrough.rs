use std::io;
use std::ptr;

use mallocator::{Config, FitAllocator, HEADER_SIZE, Policy};

/// Dumps the allocator's memory state to stdout with a caption.
fn show(
  label: &str,
  allocator: &FitAllocator,
) {
  println!("\n=== {label} ===");
  allocator
    .dump(&mut io::stdout().lock())
    .expect("writing the dump to stdout");
}

fn main() {
  // One allocator instance, driven directly. The same machinery backs the
  // C entry points when the crate is built with `--features interpose` and
  // loaded via LD_PRELOAD.
  let mut allocator = FitAllocator::new();

  unsafe {
    // --------------------------------------------------------------------
    // 1) A first allocation maps a fresh region; its single block spans
    //    the whole mapping and the header precedes the payload.
    // --------------------------------------------------------------------
    let first = allocator.allocate(100);
    println!("[1] allocate(100) -> {first:?} (header at {:?})", first.sub(HEADER_SIZE));
    show("one region, one block", &allocator);

    // --------------------------------------------------------------------
    // 2) A second allocation fits into the first block's trailing slack,
    //    so a new block is split off right behind it. Same region.
    // --------------------------------------------------------------------
    let second = allocator.allocate(200);
    println!("[2] allocate(200) -> {second:?}");
    ptr::write_bytes(second, 0xAB, 200);
    show("split: two blocks, one region", &allocator);

    // --------------------------------------------------------------------
    // 3) Freeing the first block only marks it idle; the region stays
    //    mapped because the second block is still live.
    // --------------------------------------------------------------------
    allocator.release(first);
    println!("[3] release(first)");
    show("first block idle, region kept", &allocator);

    // --------------------------------------------------------------------
    // 4) A small request reuses the idle block in place and stamps a
    //    fresh allocation ID onto it.
    // --------------------------------------------------------------------
    let reused = allocator.allocate(50);
    println!(
      "[4] allocate(50) -> {reused:?} (reused the freed slot: {})",
      reused == first
    );
    show("idle block reactivated", &allocator);

    // --------------------------------------------------------------------
    // 5) A request too large for any slack maps a second region.
    // --------------------------------------------------------------------
    let large = allocator.allocate(3 * page_size::get());
    println!("[5] allocate(3 pages) -> {large:?}");
    show("second region mapped", &allocator);

    // --------------------------------------------------------------------
    // 6) Under best fit the snuggest idle block wins; under worst fit the
    //    roomiest one does. Policies can also come from the environment
    //    (ALLOCATOR_ALGORITHM) via Config::from_env().
    // --------------------------------------------------------------------
    allocator.release(reused);
    allocator.release(large);
    allocator.set_config(Config {
      policy: Policy::BestFit,
      scribble: false,
    });
    let snug = allocator.allocate(16);
    println!(
      "[6] best_fit allocate(16) picked the small block again: {}",
      snug == first
    );
    allocator.release(snug);

    // --------------------------------------------------------------------
    // 7) Once every block of a region is idle the whole mapping goes back
    //    to the kernel; freeing the rest empties the allocator.
    // --------------------------------------------------------------------
    allocator.release(second);
    println!("[7] released everything; empty = {}", allocator.is_empty());
    show("all regions reclaimed", &allocator);
  }
}
