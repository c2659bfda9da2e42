//! Metadata sidecar
//!
//! Six single-cell segments published next to the data segment: shape,
//! client count, element-type discriminator, running flag, layout code. They
//! let a late-joining client self-configure before it ever maps the tensor.
//! Only the server writes shape/dtype/layout; the running flag is server
//! owned; the client counter is read-modify-written under the data-access
//! semaphore by whoever changes it.

use crate::error::Result;
use crate::names::SegmentPaths;
use crate::shm::SharedMemory;

const INT_CELL: usize = std::mem::size_of::<i32>();
const BOOL_CELL: usize = std::mem::size_of::<bool>();

pub(crate) struct MetaCells {
    n_rows: SharedMemory,
    n_cols: SharedMemory,
    clients: SharedMemory,
    dtype: SharedMemory,
    is_running: SharedMemory,
    mem_layout: SharedMemory,
}

impl MetaCells {
    /// Create all six cells and publish the initial values.
    ///
    /// Stale cells with the same names are unlinked first, matching the
    /// crash-recovery contract of server construction.
    pub fn create(
        paths: &SegmentPaths,
        n_rows: i32,
        n_cols: i32,
        dtype_code: i32,
        layout_code: i32,
    ) -> Result<Self> {
        for name in paths.metadata() {
            SharedMemory::unlink_stale(&name);
        }

        let cells = MetaCells {
            n_rows: SharedMemory::create(&paths.n_rows(), INT_CELL)?,
            n_cols: SharedMemory::create(&paths.n_cols(), INT_CELL)?,
            clients: SharedMemory::create(&paths.clients(), INT_CELL)?,
            dtype: SharedMemory::create(&paths.dtype(), INT_CELL)?,
            is_running: SharedMemory::create(&paths.is_running(), BOOL_CELL)?,
            mem_layout: SharedMemory::create(&paths.mem_layout(), INT_CELL)?,
        };

        cells.n_rows.cell_write::<i32>(n_rows);
        cells.n_cols.cell_write::<i32>(n_cols);
        cells.clients.cell_write::<i32>(0);
        cells.dtype.cell_write::<i32>(dtype_code);
        cells.is_running.cell_write::<u8>(0);
        cells.mem_layout.cell_write::<i32>(layout_code);

        Ok(cells)
    }

    /// Open the cells a server already published
    pub fn open(paths: &SegmentPaths) -> Result<Self> {
        Ok(MetaCells {
            n_rows: SharedMemory::open(&paths.n_rows(), INT_CELL)?,
            n_cols: SharedMemory::open(&paths.n_cols(), INT_CELL)?,
            clients: SharedMemory::open(&paths.clients(), INT_CELL)?,
            dtype: SharedMemory::open(&paths.dtype(), INT_CELL)?,
            is_running: SharedMemory::open(&paths.is_running(), BOOL_CELL)?,
            mem_layout: SharedMemory::open(&paths.mem_layout(), INT_CELL)?,
        })
    }

    pub fn n_rows(&self) -> i32 {
        self.n_rows.cell_read()
    }

    pub fn n_cols(&self) -> i32 {
        self.n_cols.cell_read()
    }

    pub fn clients(&self) -> i32 {
        self.clients.cell_read()
    }

    pub fn set_clients(&self, value: i32) {
        self.clients.cell_write(value)
    }

    pub fn dtype_code(&self) -> i32 {
        self.dtype.cell_read()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.cell_read::<u8>() != 0
    }

    pub fn set_is_running(&self, running: bool) {
        self.is_running.cell_write::<u8>(running as u8)
    }

    pub fn layout_code(&self) -> i32 {
        self.mem_layout.cell_read()
    }
}
