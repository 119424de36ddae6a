use crate::error::{Result, XtcError};
use std::sync::Mutex;

/// Default pool bound; excess buffers are dropped on release.
pub const DEFAULT_POOL_CAPACITY: usize = 8;

/// Bounded pool of float scratch buffers for the dither stage.
///
/// Buffers are sized to one device page (`dev_w * dev_h` floats). On
/// allocation failure the pool is drained and the allocation retried once
/// before `ResourceExhausted` is surfaced.
pub struct ScratchPool {
    buffers: Mutex<Vec<Vec<f32>>>,
    capacity: usize,
}

impl ScratchPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Lease a buffer with at least `len` floats of capacity.
    pub fn acquire(&self, len: usize) -> Result<Vec<f32>> {
        if let Some(mut buf) = self.lock().pop() {
            if buf.capacity() >= len {
                buf.clear();
                return Ok(buf);
            }
        }
        match try_alloc(len) {
            Ok(buf) => Ok(buf),
            Err(_) => {
                self.lock().clear();
                try_alloc(len).map_err(|_| XtcError::ResourceExhausted {
                    bytes: len * std::mem::size_of::<f32>(),
                })
            }
        }
    }

    /// Return a buffer to the pool; dropped when the pool is full.
    pub fn release(&self, buf: Vec<f32>) {
        let mut buffers = self.lock();
        if buffers.len() < self.capacity {
            buffers.push(buf);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<f32>>> {
        self.buffers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

fn try_alloc(len: usize) -> std::result::Result<Vec<f32>, std::collections::TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    Ok(buf)
}
