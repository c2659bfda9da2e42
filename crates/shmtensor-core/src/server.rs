//! Tensor server
//!
//! The server owns the data segment, the metadata sidecar and both
//! semaphores. Construction deliberately leaves the data-access semaphore
//! held: until `run()` no client can enter the data critical section or see
//! the tensor half-initialized. `run()` takes the server-uniqueness semaphore
//! (one running server per name), releases data access and flips the shared
//! running flag.

use std::time::Duration;

use log::{debug, error, warn};

use crate::config::{ServerConfig, VLevel};
use crate::dtype::{DType, Element};
use crate::error::Result;
use crate::meta::MetaCells;
use crate::names::SegmentPaths;
use crate::sem::NamedSemaphore;
use crate::shm::SharedMemory;
use crate::tensor::{read_block, write_block, MemLayout, Tensor, TensorView};

// Acquisition budget for both coordination semaphores. A live predecessor
// releases data access within this window only if it is between operations,
// so timing out here means the previous server is gone (or wedged).
pub(crate) const SEM_ACQ_TIMEOUT: Duration = Duration::from_micros(100);

/// Owner of a named shared tensor
pub struct Server<T: Element> {
    paths: SegmentPaths,
    cfg: ServerConfig,
    n_rows: usize,
    n_cols: usize,
    data: Option<SharedMemory>,
    meta: Option<MetaCells>,
    srvr_sem: NamedSemaphore,
    data_sem: NamedSemaphore,
    data_sem_held: bool,
    tensor_copy: Tensor<T>,
    running: bool,
    terminated: bool,
}

impl<T: Element> Server<T> {
    /// Allocate every named resource for `(basename, namespace)` and hold the
    /// data-access semaphore until [`run`](Self::run).
    ///
    /// Fails on any segment or semaphore OS error; a timeout on data access
    /// means another (live or wedged) server holds the name, unless
    /// `force_reconnection` turns that into a recreate.
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        basename: &str,
        namespace: &str,
        cfg: ServerConfig,
    ) -> Result<Self> {
        let paths = SegmentPaths::new(basename, namespace);

        if cfg.force_reconnection && cfg.verbose && cfg.vlevel >= VLevel::V2 {
            warn!(
                "server at {} starts with force_reconnection; destructive if another live \
                 server uses the same memory",
                paths.data()
            );
        }

        let srvr_sem = NamedSemaphore::create(&paths.server_sem())?;
        let mut data_sem = NamedSemaphore::create(&paths.data_sem())?;
        data_sem.acquire_timed(SEM_ACQ_TIMEOUT, cfg.force_reconnection)?;

        // From here on the world is blocked out; clean up the semaphore on
        // any failure so the name is not wedged by a half-built server.
        match Self::init_mems(&paths, n_rows, n_cols, &cfg) {
            Ok((data, meta)) => {
                if cfg.verbose && cfg.vlevel >= VLevel::V2 {
                    debug!("server at {} initialized, ready to run", paths.data());
                }
                Ok(Server {
                    paths,
                    n_rows,
                    n_cols,
                    data: Some(data),
                    meta: Some(meta),
                    srvr_sem,
                    data_sem,
                    data_sem_held: true,
                    tensor_copy: Tensor::zeros(n_rows, n_cols, cfg.layout),
                    cfg,
                    running: false,
                    terminated: false,
                })
            }
            Err(e) => {
                let _ = data_sem.release();
                data_sem.close(true);
                Err(e)
            }
        }
    }

    fn init_mems(
        paths: &SegmentPaths,
        n_rows: usize,
        n_cols: usize,
        cfg: &ServerConfig,
    ) -> Result<(SharedMemory, MetaCells)> {
        SharedMemory::unlink_stale(&paths.data());
        let data = SharedMemory::create(&paths.data(), n_rows * n_cols * T::DTYPE.size())?;
        let meta = MetaCells::create(
            paths,
            n_rows as i32,
            n_cols as i32,
            T::DTYPE.size() as i32,
            cfg.layout.code(),
        )?;
        Ok((data, meta))
    }

    /// Transition to running: take server uniqueness, release data access,
    /// publish the running flag. Idempotent.
    ///
    /// Failing to take the uniqueness semaphore is fatal: another server
    /// already runs under this name.
    pub fn run(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.srvr_sem
            .acquire_timed(SEM_ACQ_TIMEOUT, self.cfg.force_reconnection)?;
        if self.data_sem_held {
            // first run: open the data critical section to the world
            self.data_sem.release()?;
            self.data_sem_held = false;
        }
        if let Some(meta) = &self.meta {
            meta.set_is_running(true);
        }
        self.running = true;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("server at {} transitioned to running", self.paths.data());
        }
        Ok(())
    }

    /// Leave the running state, releasing server uniqueness. Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(meta) = &self.meta {
            meta.set_is_running(false);
        }
        if let Err(e) = self.srvr_sem.release() {
            error!("{e}");
        }
    }

    /// Stop if running, then unlink every named resource. Idempotent; also
    /// invoked on drop.
    pub fn close(&mut self) {
        if self.terminated {
            return;
        }
        self.stop();
        if self.data_sem_held {
            // never ran: let future servers and clients through
            if let Err(e) = self.data_sem.release() {
                error!("{e}");
            }
            self.data_sem_held = false;
        }
        self.data = None;
        self.meta = None;
        self.srvr_sem.close(true);
        self.data_sem.close(true);
        self.terminated = true;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("closed server at {}", self.paths.data());
        }
    }

    /// Copy `src` into the shared tensor at `(row, col)`.
    ///
    /// `false` when the server is not running, the block does not fit, or
    /// safe mode failed to take the data semaphore (caller may retry).
    pub fn write(&mut self, src: &Tensor<T>, row: usize, col: usize) -> bool {
        self.write_view(&src.view(), row, col)
    }

    /// Strided-view overload of [`write`](Self::write)
    pub fn write_view(&mut self, src: &TensorView<'_, T>, row: usize, col: usize) -> bool {
        if !self.guard_running() {
            return false;
        }
        let acquired = !self.cfg.safe || self.data_sem.try_acquire();
        if !acquired {
            return false;
        }
        let ok = match &self.data {
            Some(data) => {
                let mut dst = data.view::<T>(self.n_rows, self.n_cols, self.cfg.layout);
                write_block(src, &mut dst, row, col)
            }
            None => false,
        };
        if self.cfg.safe {
            if let Err(e) = self.data_sem.release() {
                error!("{e}");
            }
        }
        ok
    }

    /// Copy the block at `(row, col)` shaped like `dst` into `dst`
    pub fn read(&mut self, dst: &mut Tensor<T>, row: usize, col: usize) -> bool {
        let (n_rows, n_cols) = (dst.n_rows(), dst.n_cols());
        self.read_view(&mut dst.view_block_mut(0, 0, n_rows, n_cols), row, col)
    }

    /// Strided-view overload of [`read`](Self::read)
    pub fn read_view(&mut self, dst: &mut TensorView<'_, T>, row: usize, col: usize) -> bool {
        if !self.guard_running() {
            return false;
        }
        let acquired = !self.cfg.safe || self.data_sem.try_acquire();
        if !acquired {
            return false;
        }
        let ok = match &self.data {
            Some(data) => {
                let src = data.view::<T>(self.n_rows, self.n_cols, self.cfg.layout);
                read_block(&src, row, col, dst)
            }
            None => false,
        };
        if self.cfg.safe {
            if let Err(e) = self.data_sem.release() {
                error!("{e}");
            }
        }
        ok
    }

    /// Refresh the internal heap copy from shared memory and expose it.
    ///
    /// `None` when the snapshot could not be taken (not running, or safe-mode
    /// contention).
    pub fn read_cached(&mut self) -> Option<&Tensor<T>> {
        if !self.guard_running() {
            return None;
        }
        let acquired = !self.cfg.safe || self.data_sem.try_acquire();
        if !acquired {
            return None;
        }
        let ok = match &self.data {
            Some(data) => {
                let src = data.view::<T>(self.n_rows, self.n_cols, self.cfg.layout);
                let mut dst = self.tensor_copy.view_block_mut(0, 0, self.n_rows, self.n_cols);
                read_block(&src, 0, 0, &mut dst)
            }
            None => false,
        };
        if self.cfg.safe {
            if let Err(e) = self.data_sem.release() {
                error!("{e}");
            }
        }
        ok.then_some(&self.tensor_copy)
    }

    /// Take the data-access semaphore for an external compound critical
    /// section. Every acquire must be paired with
    /// [`data_sem_release`](Self::data_sem_release).
    pub fn data_sem_acquire(&mut self) -> Result<()> {
        self.data_sem.acquire_blocking()
    }

    pub fn data_sem_release(&mut self) -> Result<()> {
        self.data_sem.release()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Published client count, read under the data-access semaphore.
    ///
    /// `-1` once the server is closed.
    pub fn n_clients(&mut self) -> i32 {
        if self.terminated {
            return -1;
        }
        // before run() this server already holds data access
        if !self.data_sem_held && self.data_sem.acquire_blocking().is_err() {
            return -1;
        }
        let n = self.meta.as_ref().map_or(-1, |m| m.clients());
        if !self.data_sem_held {
            if let Err(e) = self.data_sem.release() {
                error!("{e}");
            }
        }
        n
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn scalar_type(&self) -> DType {
        T::DTYPE
    }

    pub fn layout(&self) -> MemLayout {
        self.cfg.layout
    }

    pub fn namespace(&self) -> &str {
        self.paths.namespace()
    }

    pub fn basename(&self) -> &str {
        self.paths.basename()
    }

    fn guard_running(&self) -> bool {
        if self.running {
            return true;
        }
        if self.cfg.verbose {
            error!(
                "server at {} is not running; did you call run()?",
                self.paths.data()
            );
        }
        false
    }
}

impl<T: Element> Drop for Server<T> {
    fn drop(&mut self) {
        self.close();
    }
}
