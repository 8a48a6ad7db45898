use std::io::Cursor;

use tracing::{debug, warn};

use crate::{
    protocol::{DecodingError, Frame, FrameHeader, FRAME_HDR_LEN},
    utils::ByteRing,
};

/// Turns the raw inbound byte stream back into frames.
///
/// Frame boundaries come from the declared payload size alone. Whenever the
/// bytes at the head of the buffer cannot be the start of a frame, one byte is
/// discarded and the scan starts over.
pub struct Assembler {
    ring: ByteRing,
    max_payload: usize,
    stat: AssemblerStat,
}

pub enum Polled<'a> {
    /// More bytes are needed.
    Pending,
    /// A verified frame. Its bytes stay buffered until `consume` is called.
    Frame(Frame<'a>),
    /// A data frame whose checksum did not match. Its bytes stay buffered
    /// until `consume` is called.
    Corrupted(FrameHeader),
}

enum Verdict {
    Pending,
    Skip,
    Ready(FrameHeader),
    Corrupted(FrameHeader),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssemblerStat {
    pub resync_bytes: u64,
    pub overflow_bytes: u64,
    pub checksum_errors: u64,
}

impl Assembler {
    #[inline]
    fn check_rep(&self) {
        assert!(FRAME_HDR_LEN + self.max_payload + crate::protocol::CHECKSUM_LEN <= self.ring.cap());
    }

    #[must_use]
    pub fn new(buf_len: usize, max_payload: usize) -> Self {
        let this = Assembler {
            ring: ByteRing::new(buf_len),
            max_payload,
            stat: AssemblerStat::default(),
        };
        this.check_rep();
        this
    }

    pub fn push(&mut self, byte: u8) {
        if self.ring.push_back(byte).is_some() {
            self.stat.overflow_bytes += 1;
        }
    }

    #[must_use]
    pub fn poll(&mut self) -> Polled<'_> {
        let hdr = loop {
            match self.inspect() {
                Verdict::Pending => return Polled::Pending,
                Verdict::Skip => {
                    self.ring.pop_front(1);
                    self.stat.resync_bytes += 1;
                }
                Verdict::Corrupted(hdr) => {
                    warn!(pn = hdr.packet_number(), ty = ?hdr.ty(), "checksum mismatch");
                    self.stat.checksum_errors += 1;
                    return Polled::Corrupted(hdr);
                }
                Verdict::Ready(hdr) => break hdr,
            }
        };
        let data = self.ring.data();
        let payload = &data[FRAME_HDR_LEN..FRAME_HDR_LEN + hdr.payload_size() as usize];
        match Frame::new(hdr, payload) {
            Ok(frame) => Polled::Frame(frame),
            Err(_) => Polled::Pending,
        }
    }

    /// Drops the bytes of a frame returned by `poll`.
    pub fn consume(&mut self, hdr: &FrameHeader) {
        self.ring.pop_front(hdr.frame_len());
    }

    fn inspect(&mut self) -> Verdict {
        let max_payload = self.max_payload;
        let data = self.ring.data();
        if data.len() < FRAME_HDR_LEN {
            return Verdict::Pending;
        }
        let hdr = match FrameHeader::from_bytes(&mut Cursor::new(data)) {
            Ok(x) => x,
            Err(_) => return Verdict::Skip,
        };
        if max_payload < hdr.payload_size() as usize {
            debug!(size = hdr.payload_size(), "implausible payload size");
            return Verdict::Skip;
        }
        let frame_len = hdr.frame_len();
        if data.len() < frame_len {
            return Verdict::Pending;
        }
        match Frame::decode(&data[..frame_len]) {
            Ok(_) => Verdict::Ready(hdr),
            Err(DecodingError::ChecksumMismatch { hdr, .. }) if hdr.ty().requires_reply() => {
                Verdict::Corrupted(hdr)
            }
            Err(_) => Verdict::Skip,
        }
    }

    #[must_use]
    pub fn stat(&self) -> AssemblerStat {
        self.stat.clone()
    }

    #[must_use]
    #[inline]
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }
}
