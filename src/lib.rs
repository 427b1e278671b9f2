//! # brkheap - A Free-List Heap Allocator Library
//!
//! This crate provides a **best-fit free-list allocator** that manages one
//! growable memory segment, by default the process data segment extended with
//! the `sbrk` system call.
//!
//! ## Overview
//!
//! Every allocation is a block: a header followed by the caller's bytes.
//! Blocks are chained in address order and never leave the segment. Released
//! blocks are marked free, merged with free neighbours, and handed out again
//! to later requests.
//!
//! ```text
//!   Heap Segment:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬──────────────┬────┬──────┬────┬───────────┐     │
//!   │   │ H  │ used │ H  │     free     │ H  │ used │ H  │   free    │     │
//!   │   └────┴──────┴────┴──────────────┴────┴──────┴────┴───────────┘     │
//!   │   ▲      next ─┘▲       next ──────┘▲     next ─┘▲              ▲    │
//!   │   │             │                   │            │              │    │
//!   │  head                                           tail       watermark │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   No two free blocks are ever neighbours: releases coalesce.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkheap
//!   ├── align      - Word alignment (align!, checked_align)
//!   ├── block      - In-band block header (internal)
//!   ├── segment    - Segment trait, BrkSegment (sbrk), ArenaSegment
//!   ├── chain      - Block chain, pointer validation, stats, check (internal)
//!   ├── grower     - Heap growth (internal)
//!   ├── search     - SearchMode: best-fit, first-fit, next-fit
//!   ├── engine     - Allocate, split, release, coalesce, resize (internal)
//!   ├── heap       - Heap context, lock profiles
//!   └── options    - HeapOptions builder
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkheap::ArenaHeap;
//!
//! let heap = ArenaHeap::arena(4096).unwrap();
//!
//! let ptr = heap.allocate(40).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xab, 40) };
//!
//! unsafe { heap.release(ptr.as_ptr()) };
//!
//! // The freed block is the best fit for the same request.
//! assert_eq!(heap.allocate(40).unwrap(), ptr);
//! ```
//!
//! ## How It Works
//!
//! Each block starts with a header. The pointer handed out sits right after
//! it, so releasing steps back one header to find the metadata:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ next: offset    │  │  │                          │  │
//!   │  │ tag: 0x12345678 │  │  │     N bytes usable       │  │
//!   │  │ is_free: false  │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      24 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! `next` is an offset from the segment base rather than an address, and a
//! pointer is only trusted after it has been checked against the segment
//! bounds and word alignment. Its header must then carry the tag and be
//! linked into the chain. Anything else is rejected.
//!
//! Allocation picks a free block with the configured [`SearchMode`] and
//! splits off the surplus when it can hold another header. When nothing fits
//! the segment grows by exactly one block:
//!
//! ```text
//!   Split:
//!   ┌────┬──────────────────────────────┐      ┌────┬────────┬────┬──────────┐
//!   │ H  │          free (128)          │  =>  │ H  │ used 40│ H  │ free 64  │
//!   └────┴──────────────────────────────┘      └────┴────────┴────┴──────────┘
//!
//!   Coalesce:
//!   ┌────┬────────┬────┬────────┐             ┌────┬──────────────────────────┐
//!   │ H  │ free 16│ H  │ free 16│      =>     │ H  │ free 16 + H + 16         │
//!   └────┴────────┴────┴────────┘             └────┴──────────────────────────┘
//! ```
//!
//! ## Profiles
//!
//! - [`SyncHeap`]: guarded by a `parking_lot` mutex, best-fit by default.
//!   Every operation, growth included, runs under the lock.
//! - [`LocalHeap`]: guarded by [`NoLock`], which is `!Sync`, so the heap
//!   stays on its thread. Next-fit by default.
//!
//! ## Limitations
//!
//! - **Word alignment only**: payloads are aligned to `usize`, nothing more
//! - **No shrinking**: memory is never returned to the OS
//! - **One lock**: no per-thread caches or size classes
//! - **Unix-only** for [`BrkSegment`]: requires `libc` and `sbrk`
//! - **Shared break**: once anything else moves the program break, glibc's
//!   main-arena `malloc` included, a [`BrkSegment`] cannot grow again and
//!   every growth fails with [`Error::BreakMoved`]

pub mod align;
mod block;
mod chain;
mod engine;
pub mod error;
mod grower;
mod heap;
mod options;
mod search;
mod segment;

#[cfg(test)]
mod test_utils;

pub use block::{HEADER_SIZE, TAG};
pub use chain::{BlockInfo, HeapStats};
pub use error::{Error, Result};
pub use heap::{ArenaHeap, BrkHeap, Heap, HeapLock, LocalHeap, NoLock, SyncHeap};
pub use options::HeapOptions;
pub use search::SearchMode;
pub use segment::{ArenaSegment, BrkSegment, Segment};
