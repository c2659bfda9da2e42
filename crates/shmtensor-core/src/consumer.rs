//! Ack side of the producer/consumer barrier
//!
//! Each consumer tracks the last trigger count it observed. A wake (or a
//! poll after timeout slicing) re-reads the shared counter; an advance of 1
//! is the event, 0 means keep waiting, anything else means a trigger was
//! missed and the consumer cannot recover — that is a protocol error, not a
//! timeout.

use std::time::{Duration, Instant};

use log::{debug, error};

use crate::client::Client;
use crate::cond::SharedCondVar;
use crate::config::{ClientConfig, CoordConfig, VLevel};
use crate::error::{Error, Result};
use crate::producer::{ACK_BASENAME, ACK_COND_BASENAME, TRIGGER_BASENAME, TRIGGER_COND_BASENAME};
use crate::tensor::{MemLayout, Tensor};

/// Counter cell helper: read the single shared cell.
fn counter_read(clnt: &mut Client<i32>, scratch: &mut Tensor<i32>) -> Option<i32> {
    clnt.read(scratch, 0, 0).then(|| scratch.get(0, 0))
}

/// Counter cell helper: store `value` into the single shared cell.
fn counter_write(clnt: &mut Client<i32>, scratch: &mut Tensor<i32>, value: i32) -> bool {
    scratch.set(0, 0, value);
    clnt.write(scratch, 0, 0)
}

/// One-to-many trigger/ack barrier, consuming side
pub struct Consumer {
    basename: String,
    namespace: String,
    cfg: CoordConfig,
    trigger_clnt: Client<i32>,
    ack_clnt: Client<i32>,
    trigger_cond: Option<SharedCondVar>,
    ack_cond: Option<SharedCondVar>,
    scratch: Tensor<i32>,
    internal_trigger_counter: i32,
    running: bool,
    closed: bool,
}

impl Consumer {
    /// Prepare the two counter clients; nothing attaches until
    /// [`run`](Self::run).
    pub fn new(basename: &str, namespace: &str, cfg: CoordConfig) -> Result<Self> {
        // Counter cells are guarded by the condition-variable mutexes, the
        // per-op data semaphore would only be a second lock on the same RMW.
        let client_cfg = ClientConfig {
            verbose: cfg.verbose,
            vlevel: cfg.vlevel,
            safe: false,
            layout: MemLayout::RowMajor,
            ..ClientConfig::default()
        };
        let trigger_clnt = Client::new(
            &format!("{basename}{TRIGGER_BASENAME}"),
            namespace,
            client_cfg.clone(),
        )?;
        let ack_clnt = Client::new(
            &format!("{basename}{ACK_BASENAME}"),
            namespace,
            client_cfg,
        )?;
        Ok(Consumer {
            basename: basename.to_string(),
            namespace: namespace.to_string(),
            cfg,
            trigger_clnt,
            ack_clnt,
            trigger_cond: None,
            ack_cond: None,
            scratch: Tensor::zeros(1, 1, MemLayout::RowMajor),
            internal_trigger_counter: 0,
            running: false,
            closed: false,
        })
    }

    /// Attach both counter clients, then open the condition variables the
    /// producer created. Idempotent.
    pub fn run(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.trigger_clnt.attach()?;
        self.ack_clnt.attach()?;
        // Attachment only proves the counter segments exist; the condition
        // variables appear when the producer reaches run(), so poll them the
        // same way attach polls metadata.
        self.trigger_cond = Some(Self::poll_cond(
            &format!("{}{TRIGGER_COND_BASENAME}", self.basename),
            &self.namespace,
        )?);
        self.ack_cond = Some(Self::poll_cond(
            &format!("{}{ACK_COND_BASENAME}", self.basename),
            &self.namespace,
        )?);
        self.internal_trigger_counter = 0;
        self.running = true;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("consumer {} transitioned to running", self.basename);
        }
        Ok(())
    }

    fn poll_cond(basename: &str, namespace: &str) -> Result<SharedCondVar> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut backoff = Duration::from_millis(1);
        loop {
            match SharedCondVar::open(basename, namespace) {
                Ok(cond) => return Ok(cond),
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

    /// Wait for the next trigger.
    ///
    /// `Ok(true)` when the trigger counter advanced by one, `Ok(false)` on
    /// timeout (`None` waits forever). An advance outside {0, 1} is fatal:
    /// [`Error::TriggerDeltaInvalid`].
    pub fn wait(&mut self, timeout_ms: Option<u64>) -> Result<bool> {
        self.check_running("wait")?;
        let Some(cond) = &self.trigger_cond else {
            return Ok(false);
        };
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut guard = cond.lock()?;
        loop {
            let current = match counter_read(&mut self.trigger_clnt, &mut self.scratch) {
                Some(v) => v,
                None => {
                    // server side mid-restart; treat like an absent trigger
                    drop(guard);
                    if let Some(dl) = deadline {
                        if Instant::now() >= dl {
                            return Ok(false);
                        }
                    }
                    std::thread::sleep(Duration::from_millis(1));
                    guard = cond.lock()?;
                    continue;
                }
            };
            let delta = current - self.internal_trigger_counter;
            if !(0..=1).contains(&delta) {
                return Err(Error::TriggerDeltaInvalid {
                    delta: delta as i64,
                });
            }
            if delta == 1 {
                self.internal_trigger_counter = current;
                // relay the wake so sibling consumers see this trigger too
                cond.notify();
                return Ok(true);
            }
            drop(guard);
            let remaining = match deadline {
                Some(dl) => {
                    let left = dl.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(false);
                    }
                    Some(left)
                }
                None => None,
            };
            cond.wait_hint(remaining);
            guard = cond.lock()?;
        }
    }

    /// Acknowledge the trigger: increment the shared ack counter under its
    /// mutex and wake the producer.
    ///
    /// `Ok(false)` when the counter could not be advanced (soft failure).
    pub fn ack(&mut self) -> Result<bool> {
        self.check_running("ack")?;
        let Some(cond) = &self.ack_cond else {
            return Ok(false);
        };
        let Ok(_guard) = cond.lock() else {
            return Ok(false);
        };
        let Some(current) = counter_read(&mut self.ack_clnt, &mut self.scratch) else {
            error!("could not read ack counter");
            return Ok(false);
        };
        if !counter_write(&mut self.ack_clnt, &mut self.scratch, current + 1) {
            error!("could not write ack counter");
            return Ok(false);
        }
        cond.notify();
        Ok(true)
    }

    /// `wait`, then the caller's callback, then `ack`.
    ///
    /// `Ok(true)` only when all three succeeded. The ack is still sent when
    /// the callback reports failure, so the producer's barrier never hangs on
    /// a consumer-side error.
    pub fn wait_and_ack<F>(&mut self, pre_ack: F, timeout_ms: Option<u64>) -> Result<bool>
    where
        F: FnOnce() -> bool,
    {
        if !self.wait(timeout_ms)? {
            return Ok(false);
        }
        let callback_ok = pre_ack();
        let ack_ok = self.ack()?;
        Ok(callback_ok && ack_ok)
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

    /// Detach both clients and drop the condition variables. Idempotent;
    /// also invoked on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.trigger_cond = None;
        self.ack_cond = None;
        self.trigger_clnt.close();
        self.ack_clnt.close();
        self.running = false;
        self.closed = true;
        if self.cfg.verbose && self.cfg.vlevel >= VLevel::V2 {
            debug!("closed consumer {}", self.basename);
        }
    }

    fn check_running(&self, op: &str) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            error!(
                "consumer {}: {op} before run(); call run() first",
                self.basename
            );
            Err(Error::NotRunning {
                side: "consumer",
                name: self.basename.clone(),
            })
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.close();
    }
}
