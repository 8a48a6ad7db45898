//! # Frame header
//!
//! All integers are little-endian.
//!
//! ```text
//! 0       2   3       5               9      11      13 (BYTE)
//! +-------+---+-------+---------------+-------+-------+
//! |  pn   |typ| size  |   stream id   | total | index |
//! +-------+---+-------+---------------+-------+-------+
//! ```
//!
//! # Frame
//!
//! ```text
//! (Frame header)
//! (Payload: `size` bytes)
//! (CRC-16/CCITT-FALSE over header and payload: 2 bytes)
//! ```
//!
//! There is no start or stop delimiter. Frame boundaries on the wire are
//! derived from `size` alone.
//!
//! # Invariants
//!
//! - `size` is at most `max_packet_size - FRAME_HDR_LEN - CHECKSUM_LEN`
//! - `stream id`, `total` and `index` are only meaningful for `FragmentData`
//! - `pn` of `Ack`/`Nack` is the packet number of the frame being answered

use thiserror::Error;

pub mod frame;
pub mod frame_hdr;

pub use frame::{checksum, Frame, CHECKSUM_LEN};
pub use frame_hdr::{FrameHeader, FrameHeaderBuilder, FrameType, FRAME_HDR_LEN};

/// Smallest legal `max_packet_size`: a header, one payload byte and the checksum.
pub const MIN_PACKET_SIZE: usize = FRAME_HDR_LEN + 1 + CHECKSUM_LEN;

#[must_use]
#[inline]
pub fn max_payload(max_packet_size: usize) -> usize {
    max_packet_size.saturating_sub(FRAME_HDR_LEN + CHECKSUM_LEN)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodingError {
    #[error("invalid frame: cannot decode `{field}`")]
    FrameInvalid { field: &'static str },
    #[error("checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        hdr: FrameHeader,
        carried: u16,
        computed: u16,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("payload is {actual} bytes but the header declares {declared}")]
    PayloadSizeMismatch { declared: usize, actual: usize },
}
