//! Tensor client
//!
//! A client attaches to a running server by name: it polls the metadata
//! sidecar until the server has published it, verifies that its own element
//! type and layout match the published discriminators, maps the data segment
//! with the published shape, and registers itself in the shared client
//! counter. Clients never unlink anything; the segments belong to the server.

use std::time::{Duration, Instant};

use log::{debug, error};

use crate::config::{ClientConfig, VLevel};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::meta::MetaCells;
use crate::names::SegmentPaths;
use crate::sem::NamedSemaphore;
use crate::shm::SharedMemory;
use crate::tensor::{read_block, write_block, MemLayout, Tensor, TensorView};

/// Reader/writer attached to a server-owned shared tensor
pub struct Client<T: Element> {
    paths: SegmentPaths,
    cfg: ClientConfig,
    n_rows: usize,
    n_cols: usize,
    data: Option<SharedMemory>,
    meta: Option<MetaCells>,
    data_sem: NamedSemaphore,
    tensor_copy: Tensor<T>,
    attached: bool,
    terminated: bool,
}

impl<T: Element> Client<T> {
    /// Prepare a client for `(basename, namespace)`.
    ///
    /// No shared state is touched beyond opening the data-access semaphore;
    /// discovery happens in [`attach`](Self::attach).
    pub fn new(basename: &str, namespace: &str, cfg: ClientConfig) -> Result<Self> {
        let paths = SegmentPaths::new(basename, namespace);
        let data_sem = NamedSemaphore::create(&paths.data_sem())?;
        Ok(Client {
            paths,
            cfg,
            n_rows: 0,
            n_cols: 0,
            data: None,
            meta: None,
            data_sem,
            tensor_copy: Tensor::zeros(0, 0, MemLayout::RowMajor),
            attached: false,
            terminated: false,
        })
    }

    /// Discover the server and map its tensor. Idempotent.
    ///
    /// Polls the metadata sidecar with backoff until the server publishes it
    /// or the attach timeout elapses. Dtype and layout mismatches are fatal:
    /// they are programming errors, not races.
    pub fn attach(&mut self) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        if self.terminated {
            return Err(Error::NotRunning {
                side: "client",
                name: self.paths.data(),
            });
        }

        let meta = self.poll_meta()?;

        let published_dtype = meta.dtype_code();
        if published_dtype != T::DTYPE.size() as i32 {
            let err = Error::DTypeMismatch {
                local: T::DTYPE.size(),
                published: published_dtype,
            };
            if self.cfg.verbose {
                error!("attach to {} refused: {err}", self.paths.data());
            }
            return Err(err);
        }
        let published_layout = meta.layout_code();
        if published_layout != self.cfg.layout.code() {
            let err = Error::LayoutMismatch {
                local: self.cfg.layout,
                published: published_layout,
            };
            if self.cfg.verbose {
                error!("attach to {} refused: {err}", self.paths.data());
            }
            return Err(err);
        }

        let (published_rows, published_cols) = (meta.n_rows(), meta.n_cols());
        if published_rows < 0 || published_cols < 0 {
            return Err(Error::SizeMismatch {
                local_rows: 0,
                local_cols: 0,
                published_rows: published_rows.max(0) as usize,
                published_cols: published_cols.max(0) as usize,
            });
        }
        let n_rows = published_rows as usize;
        let n_cols = published_cols as usize;
        let data = SharedMemory::open(&self.paths.data(), n_rows * n_cols * T::DTYPE.size())?;

        self.data_sem.acquire_blocking()?;
        meta.set_clients(meta.clients() + 1);
        self.data_sem.release()?;

        self.n_rows = n_rows;
        self.n_cols = n_cols;
        self.tensor_copy = Tensor::zeros(n_rows, n_cols, self.cfg.layout);
        self.data = Some(data);
        self.meta = Some(meta);
        self.attached = true;

        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!(
                "attached to {} as ({}, {})",
                self.paths.data(),
                n_rows,
                n_cols
            );
        }
        Ok(())
    }

    fn poll_meta(&self) -> Result<MetaCells> {
        let deadline = Instant::now() + Duration::from_millis(self.cfg.attach_timeout_ms);
        let mut backoff = Duration::from_millis(1);
        loop {
            match MetaCells::open(&self.paths) {
                Ok(meta) => return Ok(meta),
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_millis(50));
                }
            }
        }
    }

    /// Deregister from the client counter and forget the mapping. Idempotent.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        if let Some(meta) = &self.meta {
            if self.data_sem.acquire_blocking().is_ok() {
                meta.set_clients(meta.clients() - 1);
                if let Err(e) = self.data_sem.release() {
                    error!("{e}");
                }
            }
        }
        self.data = None;
        self.meta = None;
        self.attached = false;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("detached from {}", self.paths.data());
        }
    }

    /// Detach if attached and close the semaphore handle; nothing is
    /// unlinked. Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if self.terminated {
            return;
        }
        self.detach();
        self.data_sem.close(false);
        self.terminated = true;
    }

    /// Copy `src` into the shared tensor at `(row, col)`.
    ///
    /// `false` when not attached, the server is not running, the block does
    /// not fit, or safe mode failed to take the data semaphore.
    pub fn write(&mut self, src: &Tensor<T>, row: usize, col: usize) -> bool {
        self.write_view(&src.view(), row, col)
    }

    /// Strided-view overload of [`write`](Self::write)
    pub fn write_view(&mut self, src: &TensorView<'_, T>, row: usize, col: usize) -> bool {
        if !self.guard_usable() {
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
        if !self.guard_usable() {
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

    /// Refresh the internal heap copy from shared memory and expose it
    pub fn read_cached(&mut self) -> Option<&Tensor<T>> {
        if !self.guard_usable() {
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
    /// section. Pair with [`data_sem_release`](Self::data_sem_release).
    pub fn data_sem_acquire(&mut self) -> Result<()> {
        self.data_sem.acquire_blocking()
    }

    pub fn data_sem_release(&mut self) -> Result<()> {
        self.data_sem.release()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Running flag as published by the server
    pub fn server_running(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.is_running())
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

    fn guard_usable(&self) -> bool {
        if !self.attached {
            if self.cfg.verbose {
                error!(
                    "client of {} is not attached; did you call attach()?",
                    self.paths.data()
                );
            }
            return false;
        }
        if !self.server_running() {
            if self.cfg.verbose {
                error!("server at {} is not running", self.paths.data());
            }
            return false;
        }
        true
    }
}

impl<T: Element> Drop for Client<T> {
    fn drop(&mut self) {
        self.close();
    }
}
