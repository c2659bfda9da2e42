//! POSIX named semaphores
//!
//! Both coordination semaphores (server uniqueness and data access) are
//! binary, initialized to 1, and addressed by name so they survive the
//! processes that use them. A crashed holder leaves the count at 0; the
//! force-recreate path exists exactly for that case and must only run when
//! the previous owner is known dead.

use std::ffi::CString;
use std::io;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result};

const SEM_MODE: libc::c_uint = (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint;
const SEM_INITIAL: libc::c_uint = 1;

/// A named counting semaphore used in binary fashion
pub struct NamedSemaphore {
    name: String,
    c_name: CString,
    raw: *mut libc::sem_t,
    closed: bool,
}

// sem_t handles returned by sem_open are process-wide; the kernel object is
// shared by design.
unsafe impl Send for NamedSemaphore {}

impl NamedSemaphore {
    /// Create the semaphore if absent, otherwise open the existing one.
    ///
    /// A fresh semaphore starts at 1; an existing one keeps whatever count
    /// its previous users left behind.
    pub fn create(name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| Error::SemOpen {
            name: name.to_string(),
            reason: "name contains an interior NUL".to_string(),
        })?;

        let raw = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT, SEM_MODE, SEM_INITIAL) };
        if raw.is_null() {
            return Err(Error::SemOpen {
                name: name.to_string(),
                reason: io::Error::last_os_error().to_string(),
            });
        }

        Ok(NamedSemaphore {
            name: name.to_string(),
            c_name,
            raw,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire within `timeout`.
    ///
    /// On timeout with `force_recreate`, the semaphore is assumed stuck from
    /// a dead holder: it is unlinked, recreated at 1, and acquired. Without
    /// `force_recreate` a timeout is `SemAcquire`.
    pub fn acquire_timed(&mut self, timeout: Duration, force_recreate: bool) -> Result<()> {
        if self.closed {
            return Err(Error::SemAcquire {
                name: self.name.clone(),
            });
        }
        let deadline = Self::abs_deadline(timeout);
        loop {
            let rc = unsafe { libc::sem_timedwait(self.raw, &deadline) };
            if rc == 0 {
                return Ok(());
            }
            match io::Error::last_os_error().raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) if force_recreate => {
                    warn!(
                        "semaphore {} stuck past timeout, recreating it",
                        self.name
                    );
                    return self.recreate();
                }
                _ => {
                    return Err(Error::SemAcquire {
                        name: self.name.clone(),
                    })
                }
            }
        }
    }

    /// One-shot non-blocking acquire
    pub fn try_acquire(&mut self) -> bool {
        if self.closed {
            return false;
        }
        loop {
            let rc = unsafe { libc::sem_trywait(self.raw) };
            if rc == 0 {
                return true;
            }
            match io::Error::last_os_error().raw_os_error() {
                Some(libc::EINTR) => continue,
                _ => return false,
            }
        }
    }

    /// Acquire, blocking indefinitely
    pub fn acquire_blocking(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::SemAcquire {
                name: self.name.clone(),
            });
        }
        loop {
            let rc = unsafe { libc::sem_wait(self.raw) };
            if rc == 0 {
                return Ok(());
            }
            match io::Error::last_os_error().raw_os_error() {
                Some(libc::EINTR) => continue,
                _ => {
                    return Err(Error::SemAcquire {
                        name: self.name.clone(),
                    })
                }
            }
        }
    }

    pub fn release(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::SemRelease {
                name: self.name.clone(),
                reason: "semaphore handle already closed".to_string(),
            });
        }
        let rc = unsafe { libc::sem_post(self.raw) };
        if rc == 0 {
            Ok(())
        } else {
            Err(Error::SemRelease {
                name: self.name.clone(),
                reason: io::Error::last_os_error().to_string(),
            })
        }
    }

    /// Close the process-local handle; with `unlink` also remove the name.
    ///
    /// Processes that already hold the semaphore open keep using it after an
    /// unlink, new opens create a fresh one. Idempotent.
    pub fn close(&mut self, unlink: bool) {
        if self.closed {
            return;
        }
        self.closed = true;
        unsafe {
            libc::sem_close(self.raw);
            if unlink {
                libc::sem_unlink(self.c_name.as_ptr());
            }
        }
        debug!("closed semaphore {} (unlink: {})", self.name, unlink);
    }

    /// Destroy the kernel object and start over at 1, acquired
    fn recreate(&mut self) -> Result<()> {
        unsafe {
            libc::sem_close(self.raw);
            libc::sem_unlink(self.c_name.as_ptr());
        }
        let raw =
            unsafe { libc::sem_open(self.c_name.as_ptr(), libc::O_CREAT, SEM_MODE, SEM_INITIAL) };
        if raw.is_null() {
            self.closed = true; // nothing left to close
            return Err(Error::SemOpen {
                name: self.name.clone(),
                reason: io::Error::last_os_error().to_string(),
            });
        }
        self.raw = raw;
        if self.try_acquire() {
            Ok(())
        } else {
            Err(Error::SemAcquire {
                name: self.name.clone(),
            })
        }
    }

    fn abs_deadline(timeout: Duration) -> libc::timespec {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut now);
        }
        let nsec = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
        libc::timespec {
            tv_sec: now.tv_sec + timeout.as_secs() as libc::time_t + (nsec / 1_000_000_000),
            tv_nsec: (nsec % 1_000_000_000) as libc::c_long,
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        self.close(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::unique_namespace;

    #[test]
    fn fresh_semaphore_starts_at_one() {
        let name = format!("/{}_sem", unique_namespace());
        let mut sem = NamedSemaphore::create(&name).unwrap();
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release().unwrap();
        assert!(sem.try_acquire());
        sem.close(true);
    }

    #[test]
    fn timed_acquire_times_out_when_held() {
        let name = format!("/{}_held", unique_namespace());
        let mut sem = NamedSemaphore::create(&name).unwrap();
        assert!(sem.try_acquire());
        let err = sem.acquire_timed(Duration::from_millis(5), false);
        assert!(matches!(err, Err(Error::SemAcquire { .. })));
        sem.release().unwrap();
        sem.close(true);
    }

    #[test]
    fn force_recreate_recovers_a_stuck_semaphore() {
        let name = format!("/{}_stuck", unique_namespace());
        let mut sem = NamedSemaphore::create(&name).unwrap();
        assert!(sem.try_acquire()); // never released, simulating a dead holder
        sem.acquire_timed(Duration::from_millis(5), true).unwrap();
        // recreated and acquired: a second try must fail
        assert!(!sem.try_acquire());
        sem.release().unwrap();
        sem.close(true);
    }
}
