/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io;

use ipc_channel::ipc::IpcSharedMemory;
use log::warn;
use rustc_hash::FxHashMap;

use crate::{BackingId, BulkBuffer, BulkBufferBackingHandle, DEFAULT_BACKING_SIZE};

/// Consumer side of the bulk buffer transport: owns the mapping of backing
/// IDs to shared memory and hands out read-only views over [`BulkBuffer`]
/// ranges.
pub struct BulkBufferReader {
    backing_size: usize,
    backings: FxHashMap<BackingId, IpcSharedMemory>,
}

impl BulkBufferReader {
    pub fn new() -> BulkBufferReader {
        BulkBufferReader::with_backing_size(DEFAULT_BACKING_SIZE)
    }

    pub fn with_backing_size(backing_size: usize) -> BulkBufferReader {
        assert!(backing_size > 0);
        BulkBufferReader {
            backing_size,
            backings: FxHashMap::default(),
        }
    }

    pub fn backing_size(&self) -> usize {
        self.backing_size
    }

    /// Maps each newly received backing into this reader. Returns false if
    /// any handle cannot be accepted; backings imported before the failing
    /// one are kept. The import is not rolled back.
    pub fn import_backings(&mut self, handles: Vec<BulkBufferBackingHandle>) -> bool {
        for handle in handles {
            if !handle.id.is_valid() {
                warn!("Rejecting backing handle with the invalid ID.");
                return false;
            }
            if handle.memory.len() < self.backing_size {
                warn!(
                    "Rejecting undersized backing {:?} ({} bytes).",
                    handle.id,
                    handle.memory.len()
                );
                return false;
            }
            if self.backings.insert(handle.id, handle.memory).is_some() {
                warn!("Backing {:?} imported twice.", handle.id);
                return false;
            }
        }
        true
    }

    /// Drops backings the writer has indicated are no longer referenced.
    pub fn delete_backings(&mut self, ids: &[BackingId]) {
        for id in ids {
            if self.backings.remove(id).is_none() {
                warn!("Asked to delete unknown backing {:?}.", id);
            }
        }
    }

    /// A read-only cursor over `buffer`, resolved against the currently
    /// imported backings. Every backing the buffer names must already be
    /// imported.
    pub fn make_view<'a>(&'a self, buffer: &'a BulkBuffer) -> BulkBufferView<'a> {
        BulkBufferView {
            reader: self,
            buffer,
        }
    }
}

impl Default for BulkBufferReader {
    fn default() -> BulkBufferReader {
        BulkBufferReader::new()
    }
}

/// A zero-copy view over one [`BulkBuffer`] range. Reading outside the
/// buffer's bounds is a caller error, not a recoverable failure.
pub struct BulkBufferView<'a> {
    reader: &'a BulkBufferReader,
    buffer: &'a BulkBuffer,
}

impl<'a> BulkBufferView<'a> {
    pub fn size(&self) -> usize {
        self.buffer.len(self.reader.backing_size)
    }

    /// Length of the run available at `offset` without crossing a backing
    /// boundary.
    fn contiguous_size_at(&self, offset: usize) -> usize {
        let absolute = offset + self.buffer.first_backing_begin as usize;
        self.reader.backing_size - absolute % self.reader.backing_size
    }

    /// The bytes of one contiguous run. `size` must not cross a backing
    /// boundary; use [`Self::read`] for arbitrary ranges.
    pub fn data_at(&self, offset: usize, size: usize) -> &'a [u8] {
        assert!(offset + size <= self.size(), "view read out of bounds");
        let absolute = offset + self.buffer.first_backing_begin as usize;
        let backing_index = absolute / self.reader.backing_size;
        let within = absolute % self.reader.backing_size;
        assert!(size <= self.reader.backing_size - within, "run crosses a backing boundary");
        let id = self.buffer.backings[backing_index];
        let memory = self
            .reader
            .backings
            .get(&id)
            .expect("view over a backing that was never imported");
        &memory[within..within + size]
    }

    /// Copies `dst.len()` bytes starting at `offset` into `dst`, crossing
    /// backing boundaries exactly like the writer's append.
    pub fn read(&self, offset: usize, dst: &mut [u8]) {
        assert!(offset + dst.len() <= self.size(), "view read out of bounds");
        let mut cursor = offset;
        let mut copied = 0;
        while copied < dst.len() {
            let run = (dst.len() - copied).min(self.contiguous_size_at(cursor));
            dst[copied..copied + run].copy_from_slice(self.data_at(cursor, run));
            cursor += run;
            copied += run;
        }
    }

    /// The whole range as an owned vector.
    pub fn read_to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.size()];
        self.read(0, &mut bytes);
        bytes
    }

    /// A sequential `io::Read` adapter, so codecs can consume the view as a
    /// byte stream.
    pub fn into_reader(self) -> BulkBufferViewReader<'a> {
        BulkBufferViewReader {
            view: self,
            position: 0,
        }
    }
}

/// Sequential reader over a [`BulkBufferView`].
pub struct BulkBufferViewReader<'a> {
    view: BulkBufferView<'a>,
    position: usize,
}

impl io::Read for BulkBufferViewReader<'_> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let remaining = self.view.size() - self.position;
        let amount = dst.len().min(remaining);
        self.view.read(self.position, &mut dst[..amount]);
        self.position += amount;
        Ok(amount)
    }
}
