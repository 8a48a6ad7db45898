use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    layer::{CompletionResult, IHost, SetUploadState},
    protocol::{FrameHeader, FrameHeaderBuilder, FrameType},
    utils::{PacketNumberGen, StreamIdGen},
};

use super::{
    ack_matcher::{self, MatchOutcome},
    PendingPacket, SendOptions,
};

pub struct Uploader {
    // modified by `send*` and `set_state`
    to_send_queue: VecDeque<PendingPacket>,
    // modified by `output_frame`
    current: Option<PendingPacket>,
    awaiting: VecDeque<PendingPacket>,
    tx_buf: Vec<u8>,

    packet_numbers: PacketNumberGen,
    stream_ids: StreamIdGen,
    // streams that lost a fragment; they end in `Error` instead of `Success`
    broken_streams: VecDeque<u32>,

    // stat
    stat: LocalStat,

    // const
    to_send_queue_cap: usize,
    awaiting_cap: usize,
    max_payload: usize,
}

pub struct UploaderBuilder {
    pub to_send_queue_cap: usize,
    pub awaiting_cap: usize,
    pub max_payload: usize,
}

impl UploaderBuilder {
    #[must_use]
    pub fn build(self) -> Uploader {
        let this = Uploader {
            to_send_queue: VecDeque::with_capacity(self.to_send_queue_cap),
            current: None,
            awaiting: VecDeque::with_capacity(self.awaiting_cap),
            tx_buf: Vec::new(),
            packet_numbers: PacketNumberGen::new(),
            stream_ids: StreamIdGen::new(),
            broken_streams: VecDeque::with_capacity(self.to_send_queue_cap + self.awaiting_cap),
            stat: LocalStat::default(),
            to_send_queue_cap: self.to_send_queue_cap,
            awaiting_cap: self.awaiting_cap,
            max_payload: self.max_payload,
        };
        this.check_rep();
        this
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound queue is full")]
    BufferFull,
    #[error("payload of {len} bytes exceeds the limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    BufferFull,
    /// More than `u16::MAX` fragments would be needed.
    PayloadTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResult {
    pub outcome: SendOutcome,
    /// `0` for unfragmented sends.
    pub stream_id: u32,
    /// Number of fragments enqueued; `0` for unfragmented sends.
    pub fragments: u16,
}

impl Uploader {
    #[inline]
    fn check_rep(&self) {
        assert!(self.to_send_queue.len() <= self.to_send_queue_cap);
        assert!(self.awaiting.len() <= self.awaiting_cap);
        assert!(self.broken_streams.len() <= self.to_send_queue_cap + self.awaiting_cap);
        for packet in &self.awaiting {
            assert!(packet.hdr().ty().requires_reply());
        }
    }

    #[must_use]
    pub fn stat(&self) -> UploaderStat {
        UploaderStat {
            frames_sent: self.stat.frames_sent,
            transmit_failures: self.stat.transmit_failures,
            retransmissions: self.stat.retransmissions,
            retries_exceeded: self.stat.retries_exceeded,
            acks: self.stat.acks,
            nacks: self.stat.nacks,
            unmatched_replies: self.stat.unmatched_replies,
            aged_out: self.stat.aged_out,
            replies_dropped: self.stat.replies_dropped,
            queued: self.to_send_queue.len(),
            awaiting: self.awaiting.len(),
        }
    }

    #[must_use]
    #[inline]
    pub fn is_full(&self) -> bool {
        self.to_send_queue.len() >= self.to_send_queue_cap
    }

    #[must_use]
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Enqueues `payload` as one `SingleData` frame, or as consecutive
    /// `FragmentData` frames sharing a fresh stream id when it does not fit.
    ///
    /// Fragments enqueued before the queue fills up stay queued.
    pub fn send(&mut self, payload: &[u8], options: SendOptions, now: u32) -> SendResult {
        if payload.len() <= self.max_payload {
            if self.is_full() {
                return SendResult {
                    outcome: SendOutcome::BufferFull,
                    stream_id: 0,
                    fragments: 0,
                };
            }
            let hdr = FrameHeaderBuilder {
                packet_number: self.packet_numbers.next(),
                ty: FrameType::SingleData,
                payload_size: payload.len() as u16,
                stream_id: 0,
                total_frags: 0,
                frag_index: 0,
            }
            .build();
            self.push_back(PendingPacket::new(hdr, payload.to_vec(), options, now));
            return SendResult {
                outcome: SendOutcome::Success,
                stream_id: 0,
                fragments: 0,
            };
        }

        let total_frags = (payload.len() + self.max_payload - 1) / self.max_payload;
        let total_frags = match u16::try_from(total_frags) {
            Ok(x) => x,
            Err(_) => {
                return SendResult {
                    outcome: SendOutcome::PayloadTooLarge,
                    stream_id: 0,
                    fragments: 0,
                }
            }
        };
        let stream_id = self.stream_ids.next();
        debug!(stream_id, total_frags, len = payload.len(), "fragmenting");

        for (frag_index, chunk) in payload.chunks(self.max_payload).enumerate() {
            let frag_index = frag_index as u16;
            if self.is_full() {
                warn!(stream_id, frag_index, total_frags, "outbound queue full mid-stream");
                if frag_index > 0 {
                    self.mark_broken(stream_id);
                }
                return SendResult {
                    outcome: SendOutcome::BufferFull,
                    stream_id,
                    fragments: frag_index,
                };
            }
            let hdr = FrameHeaderBuilder {
                packet_number: self.packet_numbers.next(),
                ty: FrameType::FragmentData,
                payload_size: chunk.len() as u16,
                stream_id,
                total_frags,
                frag_index,
            }
            .build();
            self.push_back(PendingPacket::new(hdr, chunk.to_vec(), options, now));
        }
        SendResult {
            outcome: SendOutcome::Success,
            stream_id,
            fragments: total_frags,
        }
    }

    /// Enqueues a `SingleNoAck` frame: never acknowledged, never retried.
    pub fn send_no_ack(&mut self, payload: &[u8], now: u32) -> Result<(), SendError> {
        if payload.len() > self.max_payload {
            return Err(SendError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }
        if self.is_full() {
            return Err(SendError::BufferFull);
        }
        let hdr = FrameHeaderBuilder {
            packet_number: self.packet_numbers.next(),
            ty: FrameType::SingleNoAck,
            payload_size: payload.len() as u16,
            stream_id: 0,
            total_frags: 0,
            frag_index: 0,
        }
        .build();
        self.push_back(PendingPacket::new(
            hdr,
            payload.to_vec(),
            SendOptions::no_retry(),
            now,
        ));
        Ok(())
    }

    #[inline]
    fn push_back(&mut self, packet: PendingPacket) {
        assert!(!self.is_full());
        self.to_send_queue.push_back(packet);
        self.check_rep();
    }

    /// Offers the head of the queue to the transport.
    ///
    /// A successful hand-off only means the transport accepted the bytes.
    /// Data frames then wait in the awaiting set for a reply; when that set is
    /// full its oldest entry is forgotten without being retried.
    pub fn output_frame(&mut self, host: &mut impl IHost) {
        if self.current.is_none() {
            self.current = self.to_send_queue.pop_front();
        }
        self.promote_deferred();
        let packet = match &self.current {
            Some(x) => x,
            None => return,
        };

        self.tx_buf.clear();
        if let Err(e) = packet.encode_to(&mut self.tx_buf) {
            warn!(?e, "dropping unencodable packet");
            self.current = None;
            self.check_rep();
            return;
        }
        if !host.transmit(&self.tx_buf) {
            self.stat.transmit_failures += 1;
            trace!(pn = packet.hdr().packet_number(), "transport busy");
            return;
        }
        trace!(
            pn = packet.hdr().packet_number(),
            ty = ?packet.hdr().ty(),
            len = self.tx_buf.len(),
            "transmitted"
        );
        self.stat.frames_sent += 1;
        if packet.retries() > 0 {
            self.stat.retransmissions += 1;
        }

        let packet = match self.current.take() {
            Some(x) => x,
            None => return,
        };
        if packet.hdr().ty().requires_reply() {
            self.awaiting.push_back(packet);
            if self.awaiting.len() > self.awaiting_cap {
                if let Some(stream_id) = self.age_out() {
                    self.settle_stream(stream_id, host);
                }
            }
        }
        self.check_rep();
    }

    /// Moves packets granted a retransmission while the queue was full into
    /// the queue, as far as room allows.
    fn promote_deferred(&mut self) {
        while self.to_send_queue.len() < self.to_send_queue_cap {
            let i = match self.awaiting.iter().position(|p| p.retransmit_pending()) {
                Some(x) => x,
                None => break,
            };
            let mut packet = match self.awaiting.remove(i) {
                Some(x) => x,
                None => break,
            };
            packet.set_retransmit_pending(false);
            debug!(pn = packet.hdr().packet_number(), "deferred retransmission queued");
            self.to_send_queue.push_back(packet);
        }
    }

    /// Forgets the oldest awaiting packet that has no retransmission pending.
    ///
    /// Returns the stream of a forgotten fragment, which can no longer succeed.
    fn age_out(&mut self) -> Option<u32> {
        let i = self.awaiting.iter().position(|p| !p.retransmit_pending())?;
        let old = self.awaiting.remove(i)?;
        let hdr = *old.hdr();
        self.stat.aged_out += 1;
        debug!(pn = hdr.packet_number(), "unanswered packet aged out");
        match hdr.ty() {
            FrameType::FragmentData => {
                self.mark_broken(hdr.stream_id());
                Some(hdr.stream_id())
            }
            _ => None,
        }
    }

    pub fn set_state(&mut self, delta: SetUploadState, host: &mut impl IHost, now: u32) {
        for reply in delta.received_replies {
            self.on_reply(&reply, host, now);
        }
        for reply in delta.replies_to_send {
            self.push_reply(reply, now);
        }
        self.check_rep();
    }

    fn on_reply(&mut self, reply: &FrameHeader, host: &mut impl IHost, now: u32) {
        match reply.ty() {
            FrameType::Ack => self.stat.acks += 1,
            _ => self.stat.nacks += 1,
        }
        let outcome = ack_matcher::match_reply(
            &mut self.to_send_queue,
            self.to_send_queue_cap,
            &mut self.awaiting,
            reply,
            now,
        );
        match outcome {
            MatchOutcome::Unmatched => {
                trace!(pn = reply.packet_number(), ty = ?reply.ty(), "reply matches nothing");
                self.stat.unmatched_replies += 1;
            }
            MatchOutcome::Requeued => {
                debug!(pn = reply.packet_number(), "requeued on nack");
            }
            MatchOutcome::Deferred => {
                debug!(pn = reply.packet_number(), "nack deferred, outbound queue full");
            }
            MatchOutcome::Acked(packet) => {
                let hdr = packet.hdr();
                match hdr.ty() {
                    FrameType::FragmentData => self.settle_stream(hdr.stream_id(), host),
                    _ => host.on_complete(0, CompletionResult::Success),
                }
            }
            MatchOutcome::Exhausted(packet) => {
                warn!(
                    pn = packet.hdr().packet_number(),
                    stream_id = packet.hdr().stream_id(),
                    retries = packet.retries(),
                    "retries exceeded"
                );
                self.give_up(packet.hdr(), host);
            }
        }
    }

    /// Ends the message of `hdr` with `RetryExceeded`, dropping whatever is
    /// left of its stream.
    fn give_up(&mut self, hdr: &FrameHeader, host: &mut impl IHost) {
        self.stat.retries_exceeded += 1;
        if hdr.ty() == FrameType::FragmentData {
            self.purge_stream(hdr.stream_id());
            self.take_broken(hdr.stream_id());
        }
        host.on_complete(hdr.stream_id(), CompletionResult::RetryExceeded);
    }

    /// Reports the stream once none of its fragments is held any more.
    fn settle_stream(&mut self, stream_id: u32, host: &mut impl IHost) {
        if self.holds_stream(stream_id) {
            return;
        }
        if self.take_broken(stream_id) {
            warn!(stream_id, "stream ended with fragments missing");
            host.on_complete(stream_id, CompletionResult::Error);
        } else {
            debug!(stream_id, "stream delivered");
            host.on_complete(stream_id, CompletionResult::Success);
        }
    }

    fn mark_broken(&mut self, stream_id: u32) {
        if self.broken_streams.contains(&stream_id) {
            return;
        }
        if self.broken_streams.len() >= self.to_send_queue_cap + self.awaiting_cap {
            self.broken_streams.pop_front();
        }
        self.broken_streams.push_back(stream_id);
    }

    fn take_broken(&mut self, stream_id: u32) -> bool {
        match self.broken_streams.iter().position(|&s| s == stream_id) {
            Some(i) => self.broken_streams.remove(i).is_some(),
            None => false,
        }
    }

    fn push_reply(&mut self, reply: FrameHeader, now: u32) {
        if self.is_full() {
            warn!(pn = reply.packet_number(), ty = ?reply.ty(), "outbound queue full, reply dropped");
            self.stat.replies_dropped += 1;
            return;
        }
        self.push_back(PendingPacket::new(
            reply,
            Vec::new(),
            SendOptions::no_retry(),
            now,
        ));
    }

    /// Whether any fragment of `stream_id` is still queued, in the outgoing
    /// slot or awaiting a reply.
    #[must_use]
    fn holds_stream(&self, stream_id: u32) -> bool {
        let is_of_stream = |p: &PendingPacket| {
            p.hdr().ty() == FrameType::FragmentData && p.hdr().stream_id() == stream_id
        };
        self.to_send_queue.iter().any(is_of_stream)
            || self.awaiting.iter().any(is_of_stream)
            || self.current.as_ref().map_or(false, is_of_stream)
    }

    fn purge_stream(&mut self, stream_id: u32) {
        let is_other = |p: &PendingPacket| {
            !(p.hdr().ty() == FrameType::FragmentData && p.hdr().stream_id() == stream_id)
        };
        self.to_send_queue.retain(is_other);
        self.awaiting.retain(is_other);
        if !self.current.as_ref().map_or(true, is_other) {
            self.current = None;
        }
        self.check_rep();
    }
}

#[derive(Default)]
struct LocalStat {
    frames_sent: u64,
    transmit_failures: u64,
    retransmissions: u64,
    retries_exceeded: u64,
    acks: u64,
    nacks: u64,
    unmatched_replies: u64,
    aged_out: u64,
    replies_dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderStat {
    pub frames_sent: u64,
    pub transmit_failures: u64,
    pub retransmissions: u64,
    pub retries_exceeded: u64,
    pub acks: u64,
    pub nacks: u64,
    pub unmatched_replies: u64,
    pub aged_out: u64,
    pub replies_dropped: u64,
    pub queued: usize,
    pub awaiting: usize,
}
