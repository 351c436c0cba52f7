use std::io::Read;

use mapalloc::Allocator;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the process mappings with `pmap`,
/// `/proc/<pid>/maps` or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_state(
  label: &str,
  allocator: &Allocator,
) {
  let stats = allocator.stats();

  println!(
    "[{}] PID = {}, issued = {}, released = {}, regions = {} ({} bytes), free blocks = {} ({} bytes)",
    label,
    std::process::id(),
    stats.issued,
    stats.released,
    stats.regions,
    stats.mapped_bytes,
    stats.free_blocks,
    stats.free_bytes,
  );

  for block in allocator.free_blocks() {
    println!("    free {:#x}..{:#x} ({} bytes)", block.address, block.end(), block.size);
  }
}

fn main() {
  let mut allocator = Allocator::new();

  print_state("start", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) The first allocation maps a whole 16 MiB region.
  // --------------------------------------------------------------------
  let first = allocator.allocate(16) as *mut u32;
  println!("\n[1] allocate(16) = {:?}", first);
  unsafe {
    first.write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", first.read());
  }
  print_state("1", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Further small allocations are carved from the same region.
  // --------------------------------------------------------------------
  let second = allocator.allocate(12);
  let third = allocator.zero_allocate(16, 2);
  println!("\n[2] allocate(12) = {:?}, zero_allocate(16, 2) = {:?}", second, third);
  unsafe { second.write_bytes(0xAB, 12) };
  print_state("2", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Freeing the first block puts it back on the free list, and a
  //    small request reuses it (first fit).
  // --------------------------------------------------------------------
  unsafe { allocator.release(first as *mut u8) };
  let fourth = allocator.allocate(2);
  println!(
    "\n[3] allocate(2) = {:?}, reused the freed block? {}",
    fourth,
    if fourth == first as *mut u8 { "Yes" } else { "No" }
  );
  print_state("3", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A request larger than the minimum chunk gets its own region.
  // --------------------------------------------------------------------
  let big = allocator.allocate(32 * 1024 * 1024);
  println!("\n[4] allocate(32 MiB) = {:?}", big);
  print_state("4", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Resizing moves the data into a fresh block.
  // --------------------------------------------------------------------
  let second = unsafe { allocator.resize(second, 1024) };
  println!("\n[5] resize(second, 1024) = {:?}, first byte = 0x{:X}", second, unsafe { *second });
  print_state("5", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Releasing everything returns every region to the system.
  // --------------------------------------------------------------------
  unsafe {
    allocator.release(second);
    allocator.release(third);
    allocator.release(fourth);
    allocator.release(big);
  }
  println!("\n[6] Released everything");
  print_state("6", &allocator);
}
