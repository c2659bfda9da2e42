//! Trigger side of the producer/consumer barrier
//!
//! The producer owns two single-cell `i32` tensors, *Trigger* and *Ack*, and
//! two named condition variables. `trigger()` bumps the monotonic trigger
//! counter under the trigger mutex and wakes consumers; `wait_ack_from()`
//! parks on the ack condition until the ack counter has advanced by exactly
//! the expected number of consumers since the wait began.

use std::time::{Duration, Instant};

use log::{debug, error};

use crate::cond::SharedCondVar;
use crate::config::{CoordConfig, ServerConfig, VLevel};
use crate::error::{Error, Result};
use crate::server::Server;
use crate::tensor::{MemLayout, Tensor};

pub(crate) const TRIGGER_BASENAME: &str = "Trigger";
pub(crate) const ACK_BASENAME: &str = "Ack";
pub(crate) const TRIGGER_COND_BASENAME: &str = "TriggerCond";
pub(crate) const ACK_COND_BASENAME: &str = "AckCond";

/// Counter cell helper: read the single shared cell.
fn counter_read(srvr: &mut Server<i32>, scratch: &mut Tensor<i32>) -> Option<i32> {
    srvr.read(scratch, 0, 0).then(|| scratch.get(0, 0))
}

/// Counter cell helper: store `value` into the single shared cell.
fn counter_write(srvr: &mut Server<i32>, scratch: &mut Tensor<i32>, value: i32) -> bool {
    scratch.set(0, 0, value);
    srvr.write(scratch, 0, 0)
}

/// One-to-many trigger/ack barrier, producing side
pub struct Producer {
    basename: String,
    namespace: String,
    cfg: CoordConfig,
    trigger_srvr: Server<i32>,
    ack_srvr: Server<i32>,
    trigger_cond: Option<SharedCondVar>,
    ack_cond: Option<SharedCondVar>,
    scratch: Tensor<i32>,
    acks_before: i32,
    running: bool,
    closed: bool,
}

impl Producer {
    /// Allocate the two counter servers. Condition variables are created on
    /// [`run`](Self::run).
    pub fn new(basename: &str, namespace: &str, cfg: CoordConfig) -> Result<Self> {
        let server_cfg = ServerConfig {
            verbose: cfg.verbose,
            vlevel: cfg.vlevel,
            force_reconnection: cfg.force_reconnection,
            safe: true,
            layout: MemLayout::RowMajor,
        };
        let trigger_srvr = Server::new(
            1,
            1,
            &format!("{basename}{TRIGGER_BASENAME}"),
            namespace,
            server_cfg.clone(),
        )?;
        let ack_srvr = Server::new(
            1,
            1,
            &format!("{basename}{ACK_BASENAME}"),
            namespace,
            server_cfg,
        )?;
        Ok(Producer {
            basename: basename.to_string(),
            namespace: namespace.to_string(),
            cfg,
            trigger_srvr,
            ack_srvr,
            trigger_cond: None,
            ack_cond: None,
            scratch: Tensor::zeros(1, 1, MemLayout::RowMajor),
            acks_before: 0,
            running: false,
            closed: false,
        })
    }

    /// Start both counter servers at 0 and create the condition variables.
    /// Idempotent.
    pub fn run(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.trigger_srvr.run()?;
        self.ack_srvr.run()?;
        // An early client can hold data access for its attach bookkeeping,
        // so the zeroing writes retry through that window.
        Self::init_counter(&mut self.trigger_srvr, &mut self.scratch)?;
        Self::init_counter(&mut self.ack_srvr, &mut self.scratch)?;
        self.trigger_cond = Some(SharedCondVar::create(
            &format!("{}{TRIGGER_COND_BASENAME}", self.basename),
            &self.namespace,
        )?);
        self.ack_cond = Some(SharedCondVar::create(
            &format!("{}{ACK_COND_BASENAME}", self.basename),
            &self.namespace,
        )?);
        self.acks_before = 0;
        self.running = true;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("producer {} transitioned to running", self.basename);
        }
        Ok(())
    }

    fn init_counter(srvr: &mut Server<i32>, scratch: &mut Tensor<i32>) -> Result<()> {
        for _ in 0..100 {
            if counter_write(srvr, scratch, 0) {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Err(Error::SemAcquire {
            name: format!("{} data access", srvr.basename()),
        })
    }

    /// Publish one trigger: increment the shared trigger counter under its
    /// mutex and wake consumers.
    ///
    /// `false` when not running or the counter could not be advanced.
    pub fn trigger(&mut self) -> bool {
        if !self.running {
            error!("producer {} is not running; call run() first", self.basename);
            return false;
        }
        let Some(cond) = &self.trigger_cond else {
            return false;
        };
        let Ok(_guard) = cond.lock() else {
            return false;
        };
        let Some(current) = counter_read(&mut self.trigger_srvr, &mut self.scratch) else {
            error!("could not read trigger counter");
            return false;
        };
        if !counter_write(&mut self.trigger_srvr, &mut self.scratch, current + 1) {
            error!("could not write trigger counter");
            return false;
        }
        cond.notify();
        true
    }

    /// Block until the ack counter has advanced by exactly `n_consumers`
    /// since this call started, or the timeout elapses.
    ///
    /// `None` waits forever. Progress is measured against the counter value
    /// read at entry, so each trigger round calls this once.
    pub fn wait_ack_from(&mut self, n_consumers: i32, timeout_ms: Option<u64>) -> bool {
        if !self.running {
            error!("producer {} is not running; call run() first", self.basename);
            return false;
        }
        let Some(cond) = &self.ack_cond else {
            return false;
        };
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

        let Ok(mut guard) = cond.lock() else {
            return false;
        };
        let Some(before) = counter_read(&mut self.ack_srvr, &mut self.scratch) else {
            return false;
        };
        self.acks_before = before;

        loop {
            match counter_read(&mut self.ack_srvr, &mut self.scratch) {
                Some(current) if current - self.acks_before == n_consumers => return true,
                Some(_) => {}
                None => return false,
            }
            drop(guard);
            let remaining = match deadline {
                Some(dl) => {
                    let left = dl.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return false;
                    }
                    Some(left)
                }
                None => None,
            };
            cond.wait_hint(remaining);
            match cond.lock() {
                Ok(g) => guard = g,
                Err(_) => return false,
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Close both counter servers and drop the condition variables.
    /// Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.trigger_cond = None;
        self.ack_cond = None;
        self.trigger_srvr.close();
        self.ack_srvr.close();
        self.running = false;
        self.closed = true;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("closed producer {}", self.basename);
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.close();
    }
}
