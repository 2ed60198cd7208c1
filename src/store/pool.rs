//! Fixed-size pool of reusable handles.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::sync::{Mutex, Semaphore};

/// A set of handles checked out one at a time.
///
/// `acquire` blocks while every handle is in use. The returned guard puts
/// the handle back when dropped, however the holder exits.
pub struct ResourcePool<T> {
    idle: Mutex<Vec<T>>,
    permits: Semaphore,
    size: usize,
}

impl<T> ResourcePool<T> {
    pub fn new(handles: Vec<T>) -> Self {
        let size = handles.len();
        Self {
            idle: Mutex::new(handles),
            permits: Semaphore::new(size),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Handles not currently checked out.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn acquire(&self) -> Pooled<'_, T> {
        self.permits.acquire();
        self.checkout()
    }

    pub fn try_acquire(&self) -> Option<Pooled<'_, T>> {
        self.permits.try_acquire().then(|| self.checkout())
    }

    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Pooled<'_, T>> {
        self.permits
            .acquire_timeout(timeout)
            .then(|| self.checkout())
    }

    fn checkout(&self) -> Pooled<'_, T> {
        // Holding a permit guarantees an idle handle.
        let handle = self.idle.lock().pop();
        Pooled { pool: self, handle }
    }

    fn checkin(&self, handle: T) {
        self.idle.lock().push(handle);
        self.permits.release();
    }
}

/// RAII guard around a checked-out handle.
pub struct Pooled<'a, T> {
    pool: &'a ResourcePool<T>,
    handle: Option<T>,
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("pooled handle used after release"),
        }
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.handle {
            Some(handle) => handle,
            None => unreachable!("pooled handle used after release"),
        }
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.checkin(handle);
        }
    }
}
