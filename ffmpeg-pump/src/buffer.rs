/// Extra bytes allocated past every requested extent.
pub const SAFE_AREA_SIZE: usize = 64;

/// Grow-only scratch extent reused across pump iterations.
///
/// `ensure` reallocates only when the request exceeds the current size, and a
/// reallocation never carries the old bytes forward: callers overwrite the
/// whole extent every iteration. Bytes below the high-water mark stay
/// addressable but are not meaningful after a grow.
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    size: usize,
}

impl GrowableBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an extent of at least `capacity` bytes, sliced to `capacity`.
    pub fn ensure(&mut self, capacity: usize) -> &mut [u8] {
        if self.data.is_empty() || self.size < capacity {
            // the old extent is still live here, so the new one never reuses its address
            let fresh = vec![0u8; capacity + SAFE_AREA_SIZE];
            self.data = fresh;
            self.size = capacity;
            log::trace!("growable buffer reallocated to {} bytes", capacity);
        }
        &mut self.data[..capacity]
    }

    /// Current usable size (the high-water mark), excluding the safe area.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Releases the extent; the next `ensure` allocates afresh.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.size = 0;
    }
}
