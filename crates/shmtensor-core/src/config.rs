//! Construction-time options for servers, clients and coordination endpoints

use crate::tensor::MemLayout;

/// Verbosity levels for the optional diagnostics emitted through `log`.
///
/// Diagnostics are side effects only; nothing in the library contract depends
/// on them. `V0` keeps even warnings quiet, `V3` narrates every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VLevel {
    V0,
    V1,
    V2,
    V3,
}

/// Options for [`Server`](crate::Server) construction
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub verbose: bool,
    pub vlevel: VLevel,
    /// On a stuck data-access acquire at construction, destroy and recreate
    /// the semaphore instead of failing. Only safe when the previous owner is
    /// known to be dead.
    pub force_reconnection: bool,
    /// Acquire the data-access semaphore around every read/write
    pub safe: bool,
    pub layout: MemLayout,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            verbose: false,
            vlevel: VLevel::V0,
            force_reconnection: false,
            safe: true,
            layout: MemLayout::RowMajor,
        }
    }
}

/// Options for [`Client`](crate::Client) construction
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub verbose: bool,
    pub vlevel: VLevel,
    pub safe: bool,
    pub layout: MemLayout,
    /// Upper bound on metadata polling during `attach`. The server may come
    /// up after the client, so attach retries with backoff until this much
    /// time has passed.
    pub attach_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            verbose: false,
            vlevel: VLevel::V0,
            safe: true,
            layout: MemLayout::RowMajor,
            attach_timeout_ms: 5_000,
        }
    }
}

/// Options shared by [`Producer`](crate::Producer) and
/// [`Consumer`](crate::Consumer)
#[derive(Debug, Clone)]
pub struct CoordConfig {
    pub verbose: bool,
    pub vlevel: VLevel,
    /// Forwarded to the trigger/ack counter servers (producer side only)
    pub force_reconnection: bool,
}

impl Default for CoordConfig {
    fn default() -> Self {
        CoordConfig {
            verbose: false,
            vlevel: VLevel::V0,
            force_reconnection: false,
        }
    }
}
