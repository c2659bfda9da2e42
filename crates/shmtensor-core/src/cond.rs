//! Named condition variables
//!
//! One segment per condition variable, holding a process-shared mutex and a
//! wake event side by side. The creator (producer side) initializes both; the
//! opener (consumer side) attaches to the existing state.
//!
//! Wakeups here are hints, not deliveries: every protocol built on top
//! re-checks its shared counter after waking and bounds the wait with its own
//! deadline. A waiter that consumed a wake meant for a sibling re-signals
//! before returning (`notify_all` relays through the waiters), so one event
//! serves any number of them.

use std::time::Duration;

use raw_sync::events::{Event, EventImpl, EventInit, EventState};
use raw_sync::locks::{LockGuard, LockImpl, LockInit, Mutex};
use raw_sync::Timeout;

use crate::error::{Error, Result};
use crate::names::SegmentPaths;
use crate::shm::SharedMemory;

// Fixed layout inside the segment: generous regions so the exact pthread /
// futex sizes never matter.
const MUTEX_OFFSET: usize = 0;
const EVENT_OFFSET: usize = 64;
const SEGMENT_LEN: usize = 128;

/// A named mutex + wake-event pair shared between processes
pub struct SharedCondVar {
    name: String,
    _shm: SharedMemory,
    mutex: Box<dyn LockImpl>,
    event: Box<dyn EventImpl>,
}

// The lock and event live inside the segment owned by `shm`; the boxed
// handles only hold pointers into that mapping.
unsafe impl Send for SharedCondVar {}

impl SharedCondVar {
    /// Create the backing segment and initialize mutex and event.
    ///
    /// A stale segment from a crashed creator is unlinked first.
    pub fn create(basename: &str, namespace: &str) -> Result<Self> {
        let name = SegmentPaths::new(basename, namespace).cond_var();
        SharedMemory::unlink_stale(&name);
        let shm = SharedMemory::create(&name, SEGMENT_LEN)?;
        let base = shm.as_ptr();

        let (mutex, _) = unsafe {
            Mutex::new(base.add(MUTEX_OFFSET), base.add(SEGMENT_LEN))
        }
        .map_err(|e| Error::CondVar {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        let (event, _) = unsafe { Event::new(base.add(EVENT_OFFSET), true) }.map_err(|e| {
            Error::CondVar {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(SharedCondVar {
            name,
            _shm: shm,
            mutex,
            event,
        })
    }

    /// Attach to a condition variable the creator already initialized
    pub fn open(basename: &str, namespace: &str) -> Result<Self> {
        let name = SegmentPaths::new(basename, namespace).cond_var();
        let shm = SharedMemory::open(&name, SEGMENT_LEN)?;
        let base = shm.as_ptr();

        let (mutex, _) = unsafe {
            Mutex::from_existing(base.add(MUTEX_OFFSET), base.add(SEGMENT_LEN))
        }
        .map_err(|e| Error::CondVar {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        let (event, _) =
            unsafe { Event::from_existing(base.add(EVENT_OFFSET)) }.map_err(|e| Error::CondVar {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(SharedCondVar {
            name,
            _shm: shm,
            mutex,
            event,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the mutex, blocking
    pub fn lock(&self) -> Result<LockGuard<'_>> {
        self.mutex.lock().map_err(|e| Error::CondVar {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Signal the event, waking one waiter.
    ///
    /// Returns `false` when signalling failed; callers treat that as a missed
    /// hint, never as protocol failure.
    pub fn notify(&self) -> bool {
        self.event.set(EventState::Signaled).is_ok()
    }

    /// Wait for a wake hint without holding the mutex.
    ///
    /// `None` waits indefinitely. Returns `true` when woken, `false` on
    /// timeout (or a wait error, which callers handle identically: re-check
    /// state, re-arm the deadline).
    pub fn wait_hint(&self, timeout: Option<Duration>) -> bool {
        let t = match timeout {
            Some(d) => Timeout::Val(d),
            None => Timeout::Infinite,
        };
        self.event.wait(t).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::unique_namespace;
    use std::thread;

    #[test]
    fn create_then_open_shares_the_event() {
        let ns = unique_namespace();
        let server = SharedCondVar::create("Wake", &ns).unwrap();
        let client = SharedCondVar::open("Wake", &ns).unwrap();

        assert!(server.notify());
        // auto-reset: a signaled event satisfies the next wait immediately
        assert!(client.wait_hint(Some(Duration::from_millis(100))));
        // and is consumed by it
        assert!(!client.wait_hint(Some(Duration::from_millis(10))));
    }

    #[test]
    fn wait_hint_times_out() {
        let ns = unique_namespace();
        let cv = SharedCondVar::create("Quiet", &ns).unwrap();
        assert!(!cv.wait_hint(Some(Duration::from_millis(10))));
    }

    #[test]
    fn notify_crosses_threads() {
        let ns = unique_namespace();
        let server = SharedCondVar::create("Cross", &ns).unwrap();
        let waiter = thread::spawn({
            let ns = ns.clone();
            move || {
                let cv = SharedCondVar::open("Cross", &ns).unwrap();
                cv.wait_hint(Some(Duration::from_secs(2)))
            }
        });
        thread::sleep(Duration::from_millis(50));
        assert!(server.notify());
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn open_without_creator_fails() {
        let ns = unique_namespace();
        assert!(SharedCondVar::open("Nobody", &ns).is_err());
    }
}
