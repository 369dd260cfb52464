//! Stream framing: accumulate arbitrary reads, yield checksum-valid frames
//!
//! The accumulator absorbs whatever chunk sizes the serial layer produces and
//! yields complete frames in arrival order, retaining trailing partial bytes
//! for the next feed. Corrupt frames are reported (with their raw bytes) and
//! the scan resumes one byte past the failed start marker, so a bad length
//! byte can never desynchronize the stream.

use super::ring_buffer::RingBuffer;
use super::{MAX_FRAME_LEN, MIN_FRAME_SIZE, SYNC1, SYNC2, xor_checksum};

/// Accumulator capacity; also the bound on unparseable buffered bytes
const BUFFER_CAPACITY: usize = 512;

/// One complete, checksum-valid frame
///
/// Holds the full wire bytes including start marker and trailer. Only the
/// accumulator constructs these, so a `RawFrame` is valid by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
}

impl RawFrame {
    /// Full wire bytes: `[AA 55 LEN TYPE PAYLOAD.. CS]`
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Type tag byte
    pub fn type_tag(&self) -> u8 {
        self.bytes[3]
    }

    /// Payload bytes (between TYPE and CS)
    pub fn payload(&self) -> &[u8] {
        &self.bytes[4..self.bytes.len() - 1]
    }
}

/// Framing errors surfaced per dropped frame
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    /// XOR over LEN..=CS was non-zero; carries the raw bytes for diagnostics
    #[error("checksum mismatch (running XOR {residue:#04x})")]
    ChecksumMismatch {
        /// Residue of the running XOR (zero for a valid frame)
        residue: u8,
        /// The raw frame bytes as received
        bytes: Vec<u8>,
    },
}

impl From<FrameError> for crate::error::Error {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::ChecksumMismatch { residue, .. } => {
                crate::error::Error::ChecksumMismatch { residue }
            }
        }
    }
}

/// Growable byte queue yielding complete validated frames
pub struct FrameAccumulator {
    buf: RingBuffer<BUFFER_CAPACITY>,
    dropped_bytes: u64,
}

impl FrameAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self {
            buf: RingBuffer::new(),
            dropped_bytes: 0,
        }
    }

    /// Append raw bytes from the serial layer
    ///
    /// If the internal bound would be exceeded the oldest bytes are dropped
    /// and the parser resynchronizes from the surviving data.
    pub fn feed(&mut self, bytes: &[u8]) {
        let dropped = self.buf.extend(bytes);
        if dropped > 0 {
            self.dropped_bytes += dropped as u64;
            log::warn!(
                "Accumulator: buffer bound hit, dropped {} stale bytes ({} total)",
                dropped,
                self.dropped_bytes
            );
        }
    }

    /// Lazily drain all complete frames currently buffered
    ///
    /// Yields `Ok(RawFrame)` per validated frame and `Err(FrameError)` per
    /// discarded one, in arrival order. Incomplete trailing bytes stay
    /// buffered for the next feed.
    pub fn extract_frames(&mut self) -> Frames<'_> {
        Frames { acc: self }
    }

    /// Bytes currently buffered (incomplete frame remainder)
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes discarded to the buffer bound since creation
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    fn next_frame(&mut self) -> Option<Result<RawFrame, FrameError>> {
        loop {
            if self.buf.len() < MIN_FRAME_SIZE {
                return None;
            }

            // Scan for the start marker; noise before it is dropped
            let Some(sync_idx) = self.buf.find_pattern_2(SYNC1, SYNC2) else {
                // Keep the final byte in case it is the first half of a marker
                self.buf.advance(self.buf.len() - 1);
                return None;
            };
            if sync_idx > 0 {
                self.buf.advance(sync_idx);
            }

            let Some(len_byte) = self.buf.get(2) else {
                return None;
            };
            if len_byte == 0 || len_byte > MAX_FRAME_LEN {
                // Not a plausible frame; this marker was noise
                log::debug!("Accumulator: implausible LEN={}, resyncing", len_byte);
                self.buf.advance(2);
                continue;
            }

            // sync(2) + len(1) + LEN bytes + cs(1)
            let total = 3 + len_byte as usize + 1;
            if self.buf.len() < total {
                return None;
            }

            // Validation: XOR of everything after the start marker, trailer
            // included, must come out zero
            let residue = {
                let span = self
                    .buf
                    .get_slice(2, total - 2)
                    .expect("span length bounded by MAX_FRAME_LEN");
                xor_checksum(span)
            };

            let bytes = self
                .buf
                .get_slice(0, total)
                .expect("frame length bounded by MAX_FRAME_LEN")
                .to_vec();

            if residue != 0 {
                // Do not trust the corrupted LEN: advance one byte and let the
                // marker scan find the true start of the next frame
                self.buf.advance(1);
                return Some(Err(FrameError::ChecksumMismatch { residue, bytes }));
            }

            self.buf.advance(total);
            return Some(Ok(RawFrame { bytes }));
        }
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the frames currently buffered
pub struct Frames<'a> {
    acc: &'a mut FrameAccumulator,
}

impl Iterator for Frames<'_> {
    type Item = Result<RawFrame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.acc.next_frame()
    }
}
