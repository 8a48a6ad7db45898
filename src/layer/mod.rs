mod downloader;
mod engine;
mod observer;
mod shared;
mod uploader;

pub use downloader::*;
pub use engine::*;
pub use observer::*;
pub use shared::*;
pub use uploader::*;

use thiserror::Error;

use crate::protocol::{self, FrameHeader, CHECKSUM_LEN, FRAME_HDR_LEN, MIN_PACKET_SIZE};

pub struct Builder {
    /// Ceiling on one wire frame: header, payload and checksum.
    pub max_packet_size: usize,
    pub max_queued_packets: usize,
    /// Packets handed to the transport and still waiting for `Ack`/`Nack`.
    pub max_awaiting_packets: usize,
    pub max_streams: usize,
    pub stream_timeout_ticks: u32,
    pub recv_buf_len: usize,
}

impl Builder {
    pub fn build(self) -> Result<Engine, BuildError> {
        if self.max_packet_size < MIN_PACKET_SIZE {
            return Err(BuildError::PacketSizeTooSmall {
                size: self.max_packet_size,
                min: MIN_PACKET_SIZE,
            });
        }
        let max_payload = protocol::max_payload(self.max_packet_size);
        if max_payload > u16::MAX as usize {
            return Err(BuildError::PacketSizeTooLarge {
                size: self.max_packet_size,
                max: u16::MAX as usize + FRAME_HDR_LEN + CHECKSUM_LEN,
            });
        }
        for (field, cap) in [
            ("max_queued_packets", self.max_queued_packets),
            ("max_awaiting_packets", self.max_awaiting_packets),
            ("max_streams", self.max_streams),
        ] {
            if cap == 0 {
                return Err(BuildError::ZeroCapacity { field });
            }
        }
        if self.recv_buf_len < self.max_packet_size {
            return Err(BuildError::RecvBufTooSmall {
                len: self.recv_buf_len,
                min: self.max_packet_size,
            });
        }

        let uploader = UploaderBuilder {
            to_send_queue_cap: self.max_queued_packets,
            awaiting_cap: self.max_awaiting_packets,
            max_payload,
        }
        .build();
        let downloader = DownloaderBuilder {
            recv_buf_len: self.recv_buf_len,
            max_payload,
            max_streams: self.max_streams,
            stream_timeout_ticks: self.stream_timeout_ticks,
        }
        .build();
        Ok(Engine::new(uploader, downloader))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            max_packet_size: 64,
            max_queued_packets: 16,
            max_awaiting_packets: 16,
            max_streams: 4,
            stream_timeout_ticks: 100,
            recv_buf_len: 128,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("max_packet_size {size} is below the minimum of {min}")]
    PacketSizeTooSmall { size: usize, min: usize },
    #[error("max_packet_size {size} is above the maximum of {max}")]
    PacketSizeTooLarge { size: usize, max: usize },
    #[error("`{field}` must not be zero")]
    ZeroCapacity { field: &'static str },
    #[error("recv_buf_len {len} cannot hold a {min}-byte frame")]
    RecvBufTooSmall { len: usize, min: usize },
}

/// What the downloader learned from one batch of inbound bytes.
#[derive(Debug, Default)]
pub struct SetUploadState {
    /// `Ack`/`Nack` frames from the peer, to be matched against sent packets.
    pub received_replies: Vec<FrameHeader>,
    /// `Ack`/`Nack` frames to send back to the peer.
    pub replies_to_send: Vec<FrameHeader>,
}
