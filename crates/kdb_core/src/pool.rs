//! Bounded pools of storage handles.
//!
//! A pool owns a fixed set of handles. [`Pool::acquire`] blocks until one is
//! idle and returns a [`PoolGuard`] that puts the handle back when dropped, on
//! every exit path. The document store and every view hold one pool of size
//! one for their writer and one pool of readers.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// Fixed-size pool with blocking acquisition.
pub struct Pool<T> {
    name: String,
    idle: Mutex<Vec<T>>,
    available: Condvar,
    size: usize,
    timeout: Option<Duration>,
}

impl<T> Pool<T> {
    /// Opens `size` handles with `open`.
    ///
    /// Handles that fail to open are left out of the pool and logged. The pool
    /// only fails when no handle at all could be opened.
    pub fn open<F>(
        name: impl Into<String>,
        size: usize,
        timeout: Option<Duration>,
        mut open: F,
    ) -> CoreResult<Self>
    where
        F: FnMut(usize) -> CoreResult<T>,
    {
        let name = name.into();
        let mut handles = Vec::with_capacity(size);
        let mut last_error = None;

        for slot in 0..size.max(1) {
            match open(slot) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::warn!(pool = %name, slot, error = %e, "excluding handle that failed to open");
                    last_error = Some(e);
                }
            }
        }

        if handles.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| CoreError::internal(format!("pool {name} has no handles"))));
        }

        Ok(Self {
            size: handles.len(),
            name,
            idle: Mutex::new(handles),
            available: Condvar::new(),
            timeout,
        })
    }

    /// Checks out a handle, blocking until one is idle.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if a timeout is configured and elapses first.
    pub fn acquire(&self) -> CoreResult<PoolGuard<'_, T>> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut idle = self.idle.lock();

        loop {
            if let Some(handle) = idle.pop() {
                return Ok(PoolGuard {
                    pool: self,
                    handle: Some(handle),
                });
            }

            match deadline {
                None => self.available.wait(&mut idle),
                Some(deadline) => {
                    if self.available.wait_until(&mut idle, deadline).timed_out()
                        && idle.is_empty()
                    {
                        return Err(CoreError::internal(format!(
                            "timed out acquiring a handle from pool {}",
                            self.name
                        )));
                    }
                }
            }
        }
    }

    /// Number of handles owned by the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of handles currently idle.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, handle: T) {
        self.idle.lock().push(handle);
        self.available.notify_one();
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("idle", &self.idle())
            .finish_non_exhaustive()
    }
}

/// A checked-out handle. Returned to its pool on drop.
#[derive(Debug)]
pub struct PoolGuard<'a, T> {
    pool: &'a Pool<T>,
    handle: Option<T>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only taken in `drop`.
        self.handle.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.handle.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}
