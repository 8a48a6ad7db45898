use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::DecodingError;

pub const FRAME_HDR_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FrameType {
    SingleData,
    FragmentData,
    Ack,
    Nack,
    SingleNoAck,
}

impl FrameType {
    /// Data frames the peer is expected to answer with `Ack` or `Nack`.
    #[must_use]
    #[inline]
    pub fn requires_reply(self) -> bool {
        matches!(self, FrameType::SingleData | FrameType::FragmentData)
    }

    #[must_use]
    #[inline]
    pub fn is_reply(self) -> bool {
        matches!(self, FrameType::Ack | FrameType::Nack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    packet_number: u16,
    ty: FrameType,
    payload_size: u16,
    stream_id: u32,
    total_frags: u16,
    frag_index: u16,
}

pub struct FrameHeaderBuilder {
    pub packet_number: u16,
    pub ty: FrameType,
    pub payload_size: u16,
    pub stream_id: u32,
    pub total_frags: u16,
    pub frag_index: u16,
}

impl FrameHeaderBuilder {
    #[must_use]
    pub fn build(self) -> FrameHeader {
        let this = FrameHeader {
            packet_number: self.packet_number,
            ty: self.ty,
            payload_size: self.payload_size,
            stream_id: self.stream_id,
            total_frags: self.total_frags,
            frag_index: self.frag_index,
        };
        this.check_rep();
        this
    }
}

impl FrameHeader {
    #[inline]
    fn check_rep(&self) {}

    pub fn from_bytes(rdr: &mut Cursor<&[u8]>) -> Result<Self, DecodingError> {
        let packet_number = rdr
            .read_u16::<LittleEndian>()
            .map_err(|_e| DecodingError::FrameInvalid {
                field: "packet_number",
            })?;
        let ty = rdr
            .read_u8()
            .map_err(|_e| DecodingError::FrameInvalid { field: "type" })?;
        let ty = FrameType::try_from(ty).map_err(|_e| DecodingError::FrameInvalid { field: "type" })?;
        let payload_size = rdr
            .read_u16::<LittleEndian>()
            .map_err(|_e| DecodingError::FrameInvalid {
                field: "payload_size",
            })?;
        let stream_id = rdr
            .read_u32::<LittleEndian>()
            .map_err(|_e| DecodingError::FrameInvalid { field: "stream_id" })?;
        let total_frags = rdr
            .read_u16::<LittleEndian>()
            .map_err(|_e| DecodingError::FrameInvalid {
                field: "total_frags",
            })?;
        let frag_index = rdr
            .read_u16::<LittleEndian>()
            .map_err(|_e| DecodingError::FrameInvalid {
                field: "frag_index",
            })?;

        let this = FrameHeader {
            packet_number,
            ty,
            payload_size,
            stream_id,
            total_frags,
            frag_index,
        };
        this.check_rep();
        Ok(this)
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_HDR_LEN] {
        let mut hdr = [0; FRAME_HDR_LEN];
        LittleEndian::write_u16(&mut hdr[0..2], self.packet_number);
        hdr[2] = self.ty.into();
        LittleEndian::write_u16(&mut hdr[3..5], self.payload_size);
        LittleEndian::write_u32(&mut hdr[5..9], self.stream_id);
        LittleEndian::write_u16(&mut hdr[9..11], self.total_frags);
        LittleEndian::write_u16(&mut hdr[11..13], self.frag_index);
        hdr
    }

    /// Builds the `Ack`/`Nack` answering this frame.
    #[must_use]
    pub fn reply(&self, ty: FrameType) -> FrameHeader {
        debug_assert!(ty.is_reply());
        FrameHeaderBuilder {
            packet_number: self.packet_number,
            ty,
            payload_size: 0,
            stream_id: self.stream_id,
            total_frags: self.total_frags,
            frag_index: self.frag_index,
        }
        .build()
    }

    /// Total number of bytes this frame occupies on the wire.
    #[must_use]
    #[inline]
    pub fn frame_len(&self) -> usize {
        FRAME_HDR_LEN + self.payload_size as usize + super::CHECKSUM_LEN
    }

    #[must_use]
    #[inline]
    pub fn packet_number(&self) -> u16 {
        self.packet_number
    }

    #[must_use]
    #[inline]
    pub fn ty(&self) -> FrameType {
        self.ty
    }

    #[must_use]
    #[inline]
    pub fn payload_size(&self) -> u16 {
        self.payload_size
    }

    #[must_use]
    #[inline]
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    #[must_use]
    #[inline]
    pub fn total_frags(&self) -> u16 {
        self.total_frags
    }

    #[must_use]
    #[inline]
    pub fn frag_index(&self) -> u16 {
        self.frag_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test1() {
        let hdr1 = FrameHeaderBuilder {
            packet_number: 0x0102,
            ty: FrameType::FragmentData,
            payload_size: 20,
            stream_id: 0xdead_beef,
            total_frags: 3,
            frag_index: 1,
        }
        .build();
        let bytes = hdr1.to_bytes();
        let hdr2 = FrameHeader::from_bytes(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(hdr1, hdr2);
    }

    #[test]
    fn little_endian_layout() {
        let hdr = FrameHeaderBuilder {
            packet_number: 0x0102,
            ty: FrameType::Nack,
            payload_size: 0x0304,
            stream_id: 0x0506_0708,
            total_frags: 0x090a,
            frag_index: 0x0b0c,
        }
        .build();
        assert_eq!(
            hdr.to_bytes(),
            [
                0x02, 0x01, // pn
                3,    // type (Nack)
                0x04, 0x03, // size
                0x08, 0x07, 0x06, 0x05, // stream id
                0x0a, 0x09, // total
                0x0c, 0x0b, // index
            ]
        );
    }

    #[test]
    fn unknown_type() {
        let mut bytes = [0; FRAME_HDR_LEN];
        bytes[2] = 5;
        let e = FrameHeader::from_bytes(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert_eq!(e, DecodingError::FrameInvalid { field: "type" });
    }

    #[test]
    fn truncated() {
        let bytes = [0; FRAME_HDR_LEN - 1];
        let e = FrameHeader::from_bytes(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert_eq!(e, DecodingError::FrameInvalid { field: "frag_index" });
    }

    #[test]
    fn reply_addresses_original() {
        let hdr = FrameHeaderBuilder {
            packet_number: 77,
            ty: FrameType::FragmentData,
            payload_size: 9,
            stream_id: 4,
            total_frags: 2,
            frag_index: 1,
        }
        .build();
        let ack = hdr.reply(FrameType::Ack);
        assert_eq!(ack.packet_number(), 77);
        assert_eq!(ack.ty(), FrameType::Ack);
        assert_eq!(ack.payload_size(), 0);
        assert_eq!(ack.stream_id(), 4);
        assert_eq!(ack.frame_len(), FRAME_HDR_LEN + 2);
    }
}
