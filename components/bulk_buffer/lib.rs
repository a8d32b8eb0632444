/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A chunked, shared-memory-backed byte-stream transport.
//!
//! Serialized payloads too large for the message pipe are written once into
//! fixed-size shared-memory "backings" on the producer side, named by a
//! [`BulkBuffer`] descriptor, and read back through zero-copy views on the
//! consumer side. Backings are allocated lazily, their handles cross the
//! process boundary exactly once, and freed backings are recycled through a
//! free list. Because both sides map the same region, a consumer's imported
//! backing observes every append the producer makes after the handle was
//! transferred.
//!
//! One writer/reader pair serves one content frame sink; instances are not
//! shared between threads.

mod reader;
mod writer;

pub use reader::{BulkBufferReader, BulkBufferView, BulkBufferViewReader};
pub use writer::{BackingAllocator, BulkBufferFlush, BulkBufferWriter, CurrentBufferWriter};

use ipc_channel::ipc::IpcSharedMemory;
use serde::{Deserialize, Serialize};

/// Backings default to 2 MiB: large enough to amortize the syscall-class cost
/// of creating a shared-memory region, while a uniform size keeps random
/// access within a view O(1) via division against the backing size.
pub const DEFAULT_BACKING_SIZE: usize = 2 * 1024 * 1024;

/// Process-local identifier for one backing, allocated monotonically by the
/// writer that owns it. ID 0 is reserved and marks allocation failure.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BackingId(pub u32);

impl BackingId {
    pub const INVALID: BackingId = BackingId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// A logical contiguous byte range spanning one or more backings: the ordered
/// backing list, the offset of the first valid byte in the first backing and
/// the offset just past the last valid byte in the last backing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BulkBuffer {
    pub backings: Vec<BackingId>,
    pub first_backing_begin: u64,
    pub last_backing_end: u64,
}

impl BulkBuffer {
    /// Logical length in bytes, given the uniform backing size the buffer was
    /// written with.
    pub fn len(&self, backing_size: usize) -> usize {
        debug_assert!(!self.backings.is_empty());
        debug_assert!(
            self.backings.len() > 1 || self.first_backing_begin <= self.last_backing_end
        );
        (self.backings.len() - 1) * backing_size + self.last_backing_end as usize -
            self.first_backing_begin as usize
    }

    pub fn is_empty(&self, backing_size: usize) -> bool {
        self.len(backing_size) == 0
    }
}

/// Carries a newly allocated backing's shared-memory handle from the writer
/// process to the reader process. Ephemeral: each backing's handle is
/// transferred exactly once, by the first flush after its allocation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BulkBufferBackingHandle {
    pub id: BackingId,
    pub memory: IpcSharedMemory,
}
