//! shmtensor - Shared-memory tensors between cooperating processes
//!
//! One process (the [`Server`]) owns a named region of shared memory holding
//! a dense 2-D tensor plus a metadata sidecar; any number of [`Client`]s
//! attach by name, self-configure from the published shape/dtype/layout, and
//! perform partial overlay reads and writes under a named data-access
//! semaphore. [`StringTensor`] layers a UTF-8 string vector over an integer
//! tensor, and [`Producer`]/[`Consumer`] build a trigger/ack barrier from two
//! shared counters and two named condition variables.

pub mod client;
pub mod cond;
pub mod config;
pub mod consumer;
pub mod dtype;
pub mod error;
pub mod names;
pub mod producer;
pub mod sem;
pub mod server;
pub mod shm;
pub mod string_tensor;
pub mod tensor;

mod meta;

pub use client::Client;
pub use cond::SharedCondVar;
pub use config::{ClientConfig, CoordConfig, ServerConfig, VLevel};
pub use consumer::Consumer;
pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use names::SegmentPaths;
pub use producer::Producer;
pub use server::Server;
pub use string_tensor::{StringTensor, StringTensorClient, StringTensorServer};
pub use tensor::{MemLayout, Tensor, TensorView};
