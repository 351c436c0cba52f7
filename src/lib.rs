//! # mapalloc - A Free-List Memory Allocator on `mmap`
//!
//! This crate provides a general-purpose **first-fit free-list allocator**
//! with `malloc`/`calloc`/`realloc`/`free` semantics, built exclusively on
//! anonymous memory mappings (`mmap(2)` / `munmap(2)`).
//!
//! ## Overview
//!
//! Mapping memory is a system call, so the allocator asks for large chunks
//! (16 MiB by default) and carves them into blocks:
//!
//! ```text
//!   Region (one mmap call):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                                                                      │
//!   │   ┌──────┬──────┬──────┬──────┬───────────────────────────────────┐  │
//!   │   │  A1  │ free │  A2  │  A3  │               free                │  │
//!   │   └──────┴──────┴──────┴──────┴───────────────────────────────────┘  │
//!   │              ▲                               ▲                       │
//!   │              └──────── free list ────────────┘                       │
//!   │                   (sorted by address)                                │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Allocation** walks the free list and takes the first block that is
//!   large enough, splitting off the surplus.
//! - **Release** puts the block back in address order and merges it with
//!   physically adjacent free neighbors.
//! - Once every issued allocation has been released, every region is
//!   unmapped, one `munmap` per original mapping.
//!
//! ## Crate Structure
//!
//! ```text
//!   mapalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── guard      - Overflow-checked size arithmetic
//!   ├── config     - Minimum chunk size
//!   ├── error      - AllocError
//!   ├── block      - Block type and in-band allocation header
//!   ├── sys        - Mapper trait and the mmap-backed implementation
//!   ├── table      - mmap-backed storage for bookkeeping (internal)
//!   ├── free_list  - Address-ordered free list
//!   ├── region     - Region acquisition and release
//!   ├── allocator  - Allocator facade
//!   └── global     - Process-wide instance (malloc, calloc, realloc, free)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mapalloc::Allocator;
//!
//! fn main() {
//!     let mut allocator = Allocator::new();
//!
//!     let ptr = allocator.allocate(64);
//!
//!     unsafe {
//!         ptr.write_bytes(0xAB, 64);
//!         let ptr = allocator.resize(ptr, 128);
//!         allocator.release(ptr);
//!     }
//! }
//! ```
//!
//! ## Blocks
//!
//! Each allocation is a block with a small header in front of the payload:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N + 16    │  │  ┌──────────────────────────┐  │
//!   │  │ tag: owner mark │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      16 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Free blocks carry no in-band data: the free list keeps its nodes in a
//! separate mmap-backed arena and links them by index.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`Allocator`] has no internal locking; use
//!   [`global`] or your own lock to share it.
//! - **Coarse reclamation**: memory goes back to the system only when no
//!   allocation at all is outstanding. A single leak pins every region.
//! - **Word alignment only**: payloads are aligned to `usize`.
//! - **Unix-only**: requires `libc` and `mmap`.
//!
//! ## Safety
//!
//! Resizing and releasing take raw pointers. Passing a pointer that did not
//! come from the same allocator is undefined behavior; the header check
//! catches common mistakes but is not a guarantee.

pub mod align;
mod allocator;
mod block;
mod config;
mod error;
mod free_list;
pub mod global;
pub mod guard;
mod region;
mod sys;
mod table;

pub use allocator::{Allocator, State, Stats};
pub use block::{Block, HEADER_SIZE};
pub use config::{Config, DEFAULT_MIN_CHUNK_SIZE};
pub use error::AllocError;
pub use free_list::FreeList;
pub use region::Regions;
pub use sys::{Mapper, MmapMapper};
