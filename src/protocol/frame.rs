use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian};
use crc::{Crc, CRC_16_IBM_3740};

use super::{DecodingError, EncodingError, FrameHeader, FRAME_HDR_LEN};

pub const CHECKSUM_LEN: usize = 2;

// CRC_16_IBM_3740 is the catalogue name of CRC-16/CCITT-FALSE
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

#[must_use]
#[inline]
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// A header and the payload it describes.
///
/// The payload is borrowed: on the send side from the pending packet, on the
/// receive side from the inbound buffer for as long as the frame is being
/// dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    hdr: FrameHeader,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(hdr: FrameHeader, payload: &'a [u8]) -> Result<Self, EncodingError> {
        if hdr.payload_size() as usize != payload.len() {
            return Err(EncodingError::PayloadSizeMismatch {
                declared: hdr.payload_size() as usize,
                actual: payload.len(),
            });
        }
        Ok(Frame { hdr, payload })
    }

    /// Appends `header || payload || checksum` to `wtr`.
    pub fn encode_to(&self, wtr: &mut Vec<u8>) {
        let start = wtr.len();
        wtr.extend_from_slice(&self.hdr.to_bytes());
        wtr.extend_from_slice(self.payload);
        let crc = checksum(&wtr[start..]);
        let mut tail = [0; CHECKSUM_LEN];
        LittleEndian::write_u16(&mut tail, crc);
        wtr.extend_from_slice(&tail);
        debug_assert_eq!(wtr.len() - start, self.len());
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut wtr = Vec::with_capacity(self.len());
        self.encode_to(&mut wtr);
        wtr
    }

    /// Decodes the frame at the start of `bytes`. Trailing bytes beyond the
    /// declared frame length are ignored.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodingError> {
        if bytes.len() < FRAME_HDR_LEN {
            return Err(DecodingError::FrameInvalid { field: "header" });
        }
        let hdr = FrameHeader::from_bytes(&mut Cursor::new(bytes))?;
        let body_end = FRAME_HDR_LEN + hdr.payload_size() as usize;
        if bytes.len() < body_end {
            return Err(DecodingError::FrameInvalid { field: "payload" });
        }
        if bytes.len() < body_end + CHECKSUM_LEN {
            return Err(DecodingError::FrameInvalid { field: "checksum" });
        }

        let carried = LittleEndian::read_u16(&bytes[body_end..body_end + CHECKSUM_LEN]);
        let computed = checksum(&bytes[..body_end]);
        if carried != computed {
            return Err(DecodingError::ChecksumMismatch {
                hdr,
                carried,
                computed,
            });
        }

        Ok(Frame {
            hdr,
            payload: &bytes[FRAME_HDR_LEN..body_end],
        })
    }

    #[must_use]
    #[inline]
    pub fn hdr(&self) -> &FrameHeader {
        &self.hdr
    }

    #[must_use]
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.hdr.frame_len()
    }
}
