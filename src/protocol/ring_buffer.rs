//! Byte ring buffer backing the frame accumulator
//!
//! Consuming parsed frames is an O(1) pointer advance instead of an O(n)
//! `Vec::drain`, which matters at the controller's 50 Hz stream rate.

/// Fixed-capacity ring buffer with O(1) advance
///
/// Generic const parameter `N` sets buffer capacity.
pub struct RingBuffer<const N: usize = 512> {
    data: [u8; N],
    head: usize,        // Write position (next empty slot)
    tail: usize,        // Read position (first valid byte)
    len: usize,         // Number of bytes available
    staging: [u8; 128], // For non-contiguous slice access
}

impl<const N: usize> RingBuffer<N> {
    /// Create a new empty ring buffer
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            len: 0,
            staging: [0u8; 128],
        }
    }

    /// Append bytes, dropping the oldest buffered bytes if needed to fit
    ///
    /// Returns the number of bytes dropped from the front. Dropping old data
    /// is the right call for a resynchronizing stream parser: the newest
    /// bytes are the ones that can still form a complete frame.
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let incoming = bytes.len().min(N);
        let bytes = &bytes[bytes.len() - incoming..];

        let overflow = (self.len + incoming).saturating_sub(N);
        if overflow > 0 {
            self.advance(overflow);
        }

        for &b in bytes {
            self.data[self.head] = b;
            self.head = (self.head + 1) % N;
            self.len += 1;
        }
        overflow
    }

    /// Consume n bytes from the front - O(1)
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % N;
        self.len -= n;
    }

    /// Number of bytes available to read
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are buffered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.tail + index) % N])
        } else {
            None
        }
    }

    /// Find the 2-byte start marker, returns offset from tail
    pub fn find_pattern_2(&self, b1: u8, b2: u8) -> Option<usize> {
        if self.len < 2 {
            return None;
        }
        (0..self.len - 1).find(|&i| {
            self.data[(self.tail + i) % N] == b1 && self.data[(self.tail + i + 1) % N] == b2
        })
    }

    /// Get contiguous slice (copies to staging if data wraps around)
    ///
    /// `len` is limited by the staging buffer size (128 bytes), which covers
    /// the largest frame the protocol admits.
    pub fn get_slice(&mut self, start: usize, len: usize) -> Option<&[u8]> {
        if start + len > self.len || len > self.staging.len() {
            return None;
        }

        let real_start = (self.tail + start) % N;

        if real_start + len <= N {
            Some(&self.data[real_start..real_start + len])
        } else {
            for i in 0..len {
                self.staging[i] = self.data[(real_start + i) % N];
            }
            Some(&self.staging[..len])
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
