//! POSIX shared memory segments
//!
//! Thin wrapper over `shared_memory` with the ownership rule this library
//! needs: the creating side unlinks the name on drop, openers never do.

use shared_memory::{Shmem, ShmemConf, ShmemError};

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tensor::{MemLayout, TensorView};

/// A named, fixed-size, memory-mapped byte region
pub struct SharedMemory {
    inner: Shmem,
    name: String,
    len: usize,
}

// The mapping is process-global and stays valid until `inner` drops; moving
// the handle across threads does not move the mapping.
unsafe impl Send for SharedMemory {}

impl SharedMemory {
    /// Create a new segment of at least `len` bytes and map it read/write.
    ///
    /// The returned handle owns the name: dropping it unlinks the segment.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let shmem = ShmemConf::new()
            .size(len)
            .os_id(name)
            .create()
            .map_err(|e| match e {
                ShmemError::LinkExists | ShmemError::MappingIdExists => Error::MemCreate {
                    name: name.to_string(),
                    reason: "segment already exists".to_string(),
                },
                ShmemError::MapCreateFailed(errno) => Error::MemMap {
                    name: name.to_string(),
                    reason: format!("mmap failed with errno {errno}"),
                },
                other => Error::MemCreate {
                    name: name.to_string(),
                    reason: other.to_string(),
                },
            })?;

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            len,
        })
    }

    /// Open an existing segment and map it read/write.
    ///
    /// `expected_len` guards against attaching a view wider than the mapping;
    /// the kernel may round the segment up, so only a short mapping fails.
    pub fn open(name: &str, expected_len: usize) -> Result<Self> {
        let shmem = ShmemConf::new()
            .os_id(name)
            .open()
            .map_err(|e| Error::MemOpen {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if shmem.len() < expected_len {
            return Err(Error::MemSet {
                name: name.to_string(),
                expected: expected_len,
                actual: shmem.len(),
            });
        }

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            len: expected_len,
        })
    }

    /// Unlink a leftover segment with this name, if any.
    ///
    /// Used by servers before (re)creating their names, so a crashed
    /// predecessor does not wedge the rendezvous. Idempotent.
    pub fn unlink_stale(name: &str) {
        if let Ok(mut stale) = ShmemConf::new().os_id(name).open() {
            stale.set_owner(true);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.inner.as_ptr()
    }

    /// Read the single `T` cell at the start of the segment.
    ///
    /// Volatile: another process may store concurrently; callers serialize
    /// through the data-access semaphore where that matters.
    pub fn cell_read<T: Copy>(&self) -> T {
        debug_assert!(std::mem::size_of::<T>() <= self.len);
        unsafe { std::ptr::read_volatile(self.as_ptr() as *const T) }
    }

    /// Store the single `T` cell at the start of the segment
    pub fn cell_write<T: Copy>(&self, value: T) {
        debug_assert!(std::mem::size_of::<T>() <= self.len);
        unsafe { std::ptr::write_volatile(self.as_ptr() as *mut T, value) }
    }

    /// Overlay the segment with a strided 2-D view.
    ///
    /// The view borrows the mapping; it must not outlive this handle.
    pub fn view<T: Element>(
        &self,
        n_rows: usize,
        n_cols: usize,
        layout: MemLayout,
    ) -> TensorView<'_, T> {
        debug_assert!(n_rows * n_cols * std::mem::size_of::<T>() <= self.len);
        let (rs, cs) = layout.strides(n_rows, n_cols);
        unsafe { TensorView::from_raw(self.as_ptr() as *mut T, n_rows, n_cols, rs, cs) }
    }
}
