//! String tensors
//!
//! Packs variable-length UTF-8 strings column-wise into an `i32` tensor
//! backed by the usual shared segment, one string per column, four bytes per
//! cell, little-endian. A zero byte terminates the string on decode; unused
//! trailing bytes are zero. String-level operations are atomic only per
//! underlying tensor operation; callers who need a consistent multi-column
//! snapshot serialize externally through the data semaphore.

use crate::client::Client;
use crate::config::{ClientConfig, ServerConfig};
use crate::dtype::DType;
use crate::error::Result;
use crate::server::Server;
use crate::tensor::{MemLayout, Tensor};

const BYTES_PER_CELL: usize = DType::Int.size();

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::server::Server<i32> {}
    impl Sealed for crate::client::Client<i32> {}
}

/// Backing role of a string tensor: the owning server or an attached client
/// of the underlying `i32` tensor. Sealed; implemented exactly for
/// `Server<i32>` and `Client<i32>`.
pub trait Backing: sealed::Sealed {
    #[doc(hidden)]
    fn start(&mut self) -> Result<()>;
    #[doc(hidden)]
    fn write_columns(&mut self, buffer: &Tensor<i32>, col: usize, width: usize) -> bool;
    #[doc(hidden)]
    fn read_columns(&mut self, buffer: &mut Tensor<i32>, col: usize, width: usize) -> bool;
    #[doc(hidden)]
    fn dims(&self) -> (usize, usize);
    #[doc(hidden)]
    fn names(&self) -> (&str, &str);
    #[doc(hidden)]
    fn shut_down(&mut self);
}

impl Backing for Server<i32> {
    fn start(&mut self) -> Result<()> {
        self.run()
    }

    fn write_columns(&mut self, buffer: &Tensor<i32>, col: usize, width: usize) -> bool {
        let rows = buffer.n_rows();
        self.write_view(&buffer.view_block(0, col, rows, width), 0, col)
    }

    fn read_columns(&mut self, buffer: &mut Tensor<i32>, col: usize, width: usize) -> bool {
        let rows = buffer.n_rows();
        self.read_view(&mut buffer.view_block_mut(0, col, rows, width), 0, col)
    }

    fn dims(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    fn names(&self) -> (&str, &str) {
        (self.basename(), self.namespace())
    }

    fn shut_down(&mut self) {
        self.close()
    }
}

impl Backing for Client<i32> {
    fn start(&mut self) -> Result<()> {
        self.attach()
    }

    fn write_columns(&mut self, buffer: &Tensor<i32>, col: usize, width: usize) -> bool {
        let rows = buffer.n_rows();
        self.write_view(&buffer.view_block(0, col, rows, width), 0, col)
    }

    fn read_columns(&mut self, buffer: &mut Tensor<i32>, col: usize, width: usize) -> bool {
        let rows = buffer.n_rows();
        self.read_view(&mut buffer.view_block_mut(0, col, rows, width), 0, col)
    }

    fn dims(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    fn names(&self) -> (&str, &str) {
        (self.basename(), self.namespace())
    }

    fn shut_down(&mut self) {
        self.close()
    }
}

/// Vector of shared strings over an integer tensor
pub struct StringTensor<B: Backing> {
    mem: B,
    length: usize,
    n_rows: usize,
    buffer: Tensor<i32>,
    running: bool,
}

/// Owning side of a string tensor
pub type StringTensorServer = StringTensor<Server<i32>>;
/// Attaching side of a string tensor
pub type StringTensorClient = StringTensor<Client<i32>>;

impl StringTensorServer {
    /// Create the backing server for `length` strings of up to
    /// `n_rows_fixed * 4` encoded bytes each.
    pub fn server(
        length: usize,
        n_rows_fixed: usize,
        basename: &str,
        namespace: &str,
        cfg: ServerConfig,
    ) -> Result<Self> {
        let mem = Server::new(n_rows_fixed, length, basename, namespace, cfg)?;
        Ok(StringTensor {
            mem,
            length,
            n_rows: n_rows_fixed,
            buffer: Tensor::zeros(0, 0, MemLayout::ColMajor),
            running: false,
        })
    }

    /// Client count of the backing server
    pub fn n_clients(&mut self) -> i32 {
        self.mem.n_clients()
    }
}

impl StringTensorClient {
    /// Prepare a client; dimensions are discovered on [`run`](Self::run)
    pub fn client(basename: &str, namespace: &str, cfg: ClientConfig) -> Result<Self> {
        let mem = Client::new(basename, namespace, cfg)?;
        Ok(StringTensor {
            mem,
            length: 0,
            n_rows: 0,
            buffer: Tensor::zeros(0, 0, MemLayout::ColMajor),
            running: false,
        })
    }
}

impl<B: Backing> StringTensor<B> {
    /// Start the backing tensor (run or attach) and size the scratch buffer.
    /// Idempotent.
    pub fn run(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.mem.start()?;
        let (n_rows, length) = self.mem.dims();
        self.n_rows = n_rows;
        self.length = length;
        // the scratch buffer only talks to the backing tensor through strided
        // views, so its own layout is a private choice
        self.buffer = Tensor::zeros(n_rows, length, MemLayout::ColMajor);
        self.running = true;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of strings
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn basename(&self) -> &str {
        self.mem.names().0
    }

    pub fn namespace(&self) -> &str {
        self.mem.names().1
    }

    /// Copy of the integer scratch buffer, for inspection
    pub fn raw_buffer(&self) -> Tensor<i32> {
        self.buffer.clone()
    }

    pub fn close(&mut self) {
        self.mem.shut_down();
        self.running = false;
    }

    /// Encode `vec` into columns `[col, col + vec.len())` and publish them.
    ///
    /// `false` when not running, the vector does not fit, any string
    /// overflows a column, or the underlying write fails; nothing is written
    /// unless every string encoded.
    pub fn write_vec<S: AsRef<str>>(&mut self, vec: &[S], col: usize) -> bool {
        if !self.running || !self.fits(vec.len(), col) {
            return false;
        }
        for (i, s) in vec.iter().enumerate() {
            if !self.encode_str(s.as_ref(), col + i) {
                return false;
            }
        }
        self.mem.write_columns(&self.buffer, col, vec.len())
    }

    /// Encode one string into column `col` and publish it
    pub fn write_str(&mut self, s: &str, col: usize) -> bool {
        if !self.running || col >= self.length {
            return false;
        }
        if !self.encode_str(s, col) {
            return false;
        }
        self.mem.write_columns(&self.buffer, col, 1)
    }

    /// Read and decode columns `[col, col + vec.len())` into `vec`
    pub fn read_vec(&mut self, vec: &mut [String], col: usize) -> bool {
        if !self.running || !self.fits(vec.len(), col) {
            return false;
        }
        if !self.mem.read_columns(&mut self.buffer, col, vec.len()) {
            return false;
        }
        for (i, s) in vec.iter_mut().enumerate() {
            self.decode_str(s, col + i);
        }
        true
    }

    /// Read and decode the single column `col` into `s`
    pub fn read_str(&mut self, s: &mut String, col: usize) -> bool {
        if !self.running || col >= self.length {
            return false;
        }
        if !self.mem.read_columns(&mut self.buffer, col, 1) {
            return false;
        }
        self.decode_str(s, col);
        true
    }

    fn fits(&self, width: usize, col: usize) -> bool {
        col + width <= self.length
    }

    /// Pack `s` into column `col`, 4 bytes per cell, little-endian.
    /// `false` when the encoded bytes overflow the column.
    fn encode_str(&mut self, s: &str, col: usize) -> bool {
        let bytes = s.as_bytes();
        if bytes.len() > self.n_rows * BYTES_PER_CELL {
            return false;
        }
        for row in 0..self.n_rows {
            self.buffer.set(row, col, 0);
        }
        for (row, chunk) in bytes.chunks(BYTES_PER_CELL).enumerate() {
            let mut cell = 0i32;
            for (j, byte) in chunk.iter().enumerate() {
                cell |= (*byte as i32) << (j * 8);
            }
            self.buffer.set(row, col, cell);
        }
        true
    }

    /// Unpack column `col` into `s`; a zero byte terminates the string
    fn decode_str(&self, s: &mut String, col: usize) {
        let mut bytes = Vec::with_capacity(self.n_rows * BYTES_PER_CELL);
        'rows: for row in 0..self.n_rows {
            let cell = self.buffer.get(row, col);
            for j in 0..BYTES_PER_CELL {
                let byte = ((cell >> (j * 8)) & 0xFF) as u8;
                if byte == 0 {
                    break 'rows;
                }
                bytes.push(byte);
            }
        }
        s.clear();
        s.push_str(&String::from_utf8_lossy(&bytes));
    }
}

impl<B: Backing> Drop for StringTensor<B> {
    fn drop(&mut self) {
        self.close();
    }
}
