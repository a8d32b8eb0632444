/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io;
use std::mem;

use ipc_channel::ipc::IpcSharedMemory;
use log::warn;
use rustc_hash::FxHashMap;

use crate::{BackingId, BulkBuffer, BulkBufferBackingHandle, DEFAULT_BACKING_SIZE};

/// Allocates one shared-memory region of at least the requested size, or
/// `None` when the system is out of shared memory. Injected so embedders can
/// route allocation through their own memory infrastructure.
pub type BackingAllocator = Box<dyn FnMut(usize) -> Option<IpcSharedMemory>>;

/// The delta reported by [`BulkBufferWriter::flush`]: every backing written
/// since the previous flush, and a transferable handle for each backing the
/// reader side has never been told about.
#[derive(Debug)]
pub struct BulkBufferFlush {
    pub backings: Vec<BackingId>,
    pub new_handles: Vec<BulkBufferBackingHandle>,
}

/// Producer side of the bulk buffer transport. Appends byte payloads into
/// fixed-size shared-memory backings, spilling across as many backings as a
/// payload needs, and reports newly written backings on flush so the reader
/// can map each one exactly once.
pub struct BulkBufferWriter {
    backing_size: usize,
    allocate: BackingAllocator,
    backings: FxHashMap<BackingId, IpcSharedMemory>,
    free_backings: Vec<BackingId>,
    /// Backings written since the last flush, in first-write order.
    pending_backings: Vec<BackingId>,
    /// Highest backing ID whose handle has already been flushed. Pending
    /// backings above this watermark are new to the reader.
    flushed_id_watermark: u32,
    next_backing_id: u32,
    current_backing: BackingId,
    /// Next write offset within the current backing.
    current_end: usize,
    /// The buffer between `begin_buffer` and `end_buffer`, if one is open.
    in_progress: Option<BulkBuffer>,
}

impl BulkBufferWriter {
    pub fn new(allocate: BackingAllocator) -> BulkBufferWriter {
        BulkBufferWriter::with_backing_size(DEFAULT_BACKING_SIZE, allocate)
    }

    /// A writer backed by plain anonymous shared memory.
    pub fn with_default_allocator() -> BulkBufferWriter {
        BulkBufferWriter::new(Box::new(|size| Some(IpcSharedMemory::from_byte(0, size))))
    }

    pub fn with_backing_size(backing_size: usize, allocate: BackingAllocator) -> BulkBufferWriter {
        assert!(backing_size > 0);
        BulkBufferWriter {
            backing_size,
            allocate,
            backings: FxHashMap::default(),
            free_backings: Vec::new(),
            pending_backings: Vec::new(),
            flushed_id_watermark: 0,
            next_backing_id: 0,
            current_backing: BackingId::INVALID,
            current_end: 0,
            in_progress: None,
        }
    }

    pub fn backing_size(&self) -> usize {
        self.backing_size
    }

    /// Opens a new logical buffer at the current write position. Returns
    /// false if no backing could be allocated, in which case no buffer is
    /// open afterwards.
    ///
    /// Calling this with a buffer already open is a caller error.
    pub fn begin_buffer(&mut self) -> bool {
        assert!(self.in_progress.is_none(), "begin_buffer with a buffer already open");
        if !self.current_backing.is_valid() {
            self.current_backing = self.get_new_backing();
            self.current_end = 0;
            if !self.current_backing.is_valid() {
                return false;
            }
        }
        self.note_written(self.current_backing);
        self.in_progress = Some(BulkBuffer {
            backings: vec![self.current_backing],
            first_backing_begin: self.current_end as u64,
            last_backing_end: self.current_end as u64,
        });
        true
    }

    /// Copies `data` into the open buffer, splitting across backing
    /// boundaries as needed. Payloads much larger than one backing are fine.
    ///
    /// Returns false when a backing allocation fails mid-write; the caller
    /// must abandon the buffer (close it with [`Self::end_buffer`] and
    /// discard the result) rather than transmit it.
    pub fn append_to_current_buffer(&mut self, data: &[u8]) -> bool {
        assert!(self.in_progress.is_some(), "append_to_current_buffer without begin_buffer");
        let mut remaining = data;
        while !remaining.is_empty() {
            if self.current_end == self.backing_size && !self.advance_backing() {
                return false;
            }
            let run = remaining.len().min(self.backing_size - self.current_end);
            let memory = self
                .backings
                .get_mut(&self.current_backing)
                .expect("current backing missing from live map");
            #[expect(unsafe_code)]
            let mapped = unsafe { memory.deref_mut() };
            mapped[self.current_end..self.current_end + run].copy_from_slice(&remaining[..run]);
            self.current_end += run;
            remaining = &remaining[run..];
        }
        if let Some(buffer) = self.in_progress.as_mut() {
            buffer.last_backing_end = self.current_end as u64;
        }
        true
    }

    /// Closes the open buffer and returns its descriptor. The writer is
    /// ready for the next `begin_buffer` afterwards.
    pub fn end_buffer(&mut self) -> BulkBuffer {
        let mut buffer = self.in_progress.take().expect("end_buffer without begin_buffer");
        buffer.last_backing_end = self.current_end as u64;
        debug_assert!(
            buffer.backings.len() > 1 || buffer.first_backing_begin <= buffer.last_backing_end
        );
        buffer
    }

    /// An `io::Write` adapter over the open buffer, so encoders can stream
    /// straight into shared memory.
    pub fn current_buffer_writer(&mut self) -> CurrentBufferWriter<'_> {
        assert!(self.in_progress.is_some(), "current_buffer_writer without begin_buffer");
        CurrentBufferWriter { writer: self }
    }

    /// Reports the delta since the last flush and resets the pending
    /// tracking. Already-written data is untouched: the current backing and
    /// its write offset survive, so later buffers keep filling it.
    ///
    /// Calling this with a buffer open is a caller error.
    pub fn flush(&mut self) -> BulkBufferFlush {
        assert!(self.in_progress.is_none(), "flush with a buffer open");
        let backings = mem::take(&mut self.pending_backings);
        let mut new_handles = Vec::new();
        for &id in &backings {
            if id.0 > self.flushed_id_watermark {
                let memory = self
                    .backings
                    .get(&id)
                    .expect("pending backing missing from live map");
                new_handles.push(BulkBufferBackingHandle {
                    id,
                    memory: memory.clone(),
                });
            }
        }
        if let Some(max) = new_handles.iter().map(|handle| handle.id.0).max() {
            self.flushed_id_watermark = max;
        }
        BulkBufferFlush {
            backings,
            new_handles,
        }
    }

    /// Accepts backings the remote side reports it no longer needs; they go
    /// on the free list and are reused before any fresh allocation.
    pub fn return_backings(&mut self, ids: &[BackingId]) {
        for &id in ids {
            if self.backings.contains_key(&id) {
                self.free_backings.push(id);
            } else {
                warn!("Remote returned unknown backing {:?}.", id);
            }
        }
    }

    /// Drops every currently-free backing from the live map and returns
    /// their IDs so the remote side can unmap them too. Used to shrink
    /// memory during idle periods.
    pub fn trim(&mut self) -> Vec<BackingId> {
        let freed = mem::take(&mut self.free_backings);
        for id in &freed {
            self.backings.remove(id);
        }
        // A returned current backing may just have been trimmed away.
        if !self.backings.contains_key(&self.current_backing) {
            self.current_backing = BackingId::INVALID;
        }
        freed
    }

    fn advance_backing(&mut self) -> bool {
        let next = self.get_new_backing();
        if !next.is_valid() {
            warn!("Backing allocation failed; aborting the buffer write.");
            return false;
        }
        self.current_backing = next;
        self.current_end = 0;
        if let Some(buffer) = self.in_progress.as_mut() {
            buffer.backings.push(next);
        }
        self.note_written(next);
        true
    }

    /// Pops a freed backing if one is available, otherwise allocates.
    /// Returns [`BackingId::INVALID`] when the allocator fails; callers must
    /// treat that as "no backing" and never dereference it.
    fn get_new_backing(&mut self) -> BackingId {
        if let Some(id) = self.free_backings.pop() {
            return id;
        }
        let Some(memory) = (self.allocate)(self.backing_size) else {
            return BackingId::INVALID;
        };
        if memory.len() < self.backing_size {
            warn!("Allocator returned an undersized region; treating as failure.");
            return BackingId::INVALID;
        }
        self.next_backing_id += 1;
        let id = BackingId(self.next_backing_id);
        self.backings.insert(id, memory);
        id
    }

    fn note_written(&mut self, id: BackingId) {
        if !self.pending_backings.contains(&id) {
            self.pending_backings.push(id);
        }
    }
}

/// Streams bytes into the writer's open buffer. Write errors surface backing
/// allocation failure.
pub struct CurrentBufferWriter<'a> {
    writer: &'a mut BulkBufferWriter,
}

impl io::Write for CurrentBufferWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.writer.append_to_current_buffer(data) {
            Ok(data.len())
        } else {
            Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "bulk buffer backing allocation failed",
            ))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
