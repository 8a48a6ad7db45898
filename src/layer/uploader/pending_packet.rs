use crate::protocol::{EncodingError, Frame, FrameHeader};

/// Per-message retry policy chosen by the caller of `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub max_retries: u8,
    pub retry_on_nack: bool,
}

impl SendOptions {
    /// Policy of frames that are never retried: `SingleNoAck` and replies.
    #[must_use]
    pub fn no_retry() -> Self {
        SendOptions {
            max_retries: 0,
            retry_on_nack: false,
        }
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            max_retries: 3,
            retry_on_nack: true,
        }
    }
}

pub struct PendingPacket {
    hdr: FrameHeader,
    payload: Vec<u8>,
    retries: u8,
    options: SendOptions,
    enqueued_at: u32,
    // granted a retransmission while the outbound queue was full
    retransmit_pending: bool,
}

impl PendingPacket {
    #[inline]
    fn check_rep(&self) {
        assert_eq!(self.hdr.payload_size() as usize, self.payload.len());
        assert!(self.retries <= self.options.max_retries);
    }

    #[must_use]
    pub fn new(hdr: FrameHeader, payload: Vec<u8>, options: SendOptions, now: u32) -> Self {
        let this = PendingPacket {
            hdr,
            payload,
            retries: 0,
            options,
            enqueued_at: now,
            retransmit_pending: false,
        };
        this.check_rep();
        this
    }

    pub fn encode_to(&self, wtr: &mut Vec<u8>) -> Result<(), EncodingError> {
        Frame::new(self.hdr, &self.payload)?.encode_to(wtr);
        Ok(())
    }

    #[must_use]
    #[inline]
    pub fn hdr(&self) -> &FrameHeader {
        &self.hdr
    }

    #[must_use]
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    #[inline]
    pub fn retries(&self) -> u8 {
        self.retries
    }

    #[must_use]
    #[inline]
    pub fn enqueued_at(&self) -> u32 {
        self.enqueued_at
    }

    /// Whether a `Nack` for this packet may put it back in the queue.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.options.retry_on_nack && self.retries < self.options.max_retries
    }

    pub fn to_retransmit(&mut self, now: u32) {
        assert!(self.can_retry());
        self.retries += 1;
        self.enqueued_at = now;
        self.check_rep();
    }

    #[must_use]
    #[inline]
    pub fn retransmit_pending(&self) -> bool {
        self.retransmit_pending
    }

    #[inline]
    pub fn set_retransmit_pending(&mut self, pending: bool) {
        self.retransmit_pending = pending;
    }

    /// Whether this packet is an outgoing data frame answered by `reply_pn`.
    #[must_use]
    pub fn is_answered_by(&self, reply_pn: u16) -> bool {
        self.hdr.ty().requires_reply() && self.hdr.packet_number() == reply_pn
    }
}
