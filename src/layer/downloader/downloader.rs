use tracing::trace;

use crate::{
    layer::{CompletionResult, IHost, SetUploadState},
    protocol::FrameType,
};

use super::{
    assembler::{Assembler, Polled},
    stream_table::StreamTable,
};

pub struct Downloader {
    assembler: Assembler,
    streams: StreamTable,
    stat: LocalStat,
}

pub struct DownloaderBuilder {
    pub recv_buf_len: usize,
    pub max_payload: usize,
    pub max_streams: usize,
    pub stream_timeout_ticks: u32,
}

impl DownloaderBuilder {
    #[must_use]
    pub fn build(self) -> Downloader {
        let this = Downloader {
            assembler: Assembler::new(self.recv_buf_len, self.max_payload),
            streams: StreamTable::new(self.max_streams, self.stream_timeout_ticks),
            stat: LocalStat::default(),
        };
        this.check_rep();
        this
    }
}

impl Downloader {
    #[inline]
    fn check_rep(&self) {}

    #[must_use]
    pub fn stat(&self) -> DownloaderStat {
        let assembler = self.assembler.stat();
        let streams = self.streams.stat();
        DownloaderStat {
            frames: self.stat.frames,
            singles: self.stat.singles,
            fragments: self.stat.fragments,
            replies: self.stat.replies,
            checksum_errors: assembler.checksum_errors,
            resync_bytes: assembler.resync_bytes,
            overflow_bytes: assembler.overflow_bytes,
            streams_allocated: streams.allocated,
            streams_evicted: streams.evicted,
            streams_timed_out: streams.timed_out,
            fragment_mismatches: streams.mismatches,
            fragments_out_of_range: streams.out_of_range,
            duplicate_fragments: streams.duplicates,
            active_streams: self.streams.active(),
            buffered: self.assembler.buffered(),
        }
    }

    /// Runs `bytes` through the assembler in arrival order, delivering data to
    /// `host` as frames complete.
    ///
    /// Returns the replies the uploader has to match and the ones it has to
    /// send.
    #[must_use]
    pub fn input(&mut self, bytes: &[u8], host: &mut impl IHost, now: u32) -> SetUploadState {
        let mut changes = SetUploadState::default();
        for &byte in bytes {
            self.assembler.push(byte);
            loop {
                match self.assembler.poll() {
                    Polled::Pending => break,
                    Polled::Corrupted(hdr) => {
                        changes.replies_to_send.push(hdr.reply(FrameType::Nack));
                        self.assembler.consume(&hdr);
                    }
                    Polled::Frame(frame) => {
                        let hdr = *frame.hdr();
                        trace!(pn = hdr.packet_number(), ty = ?hdr.ty(), "received");
                        self.stat.frames += 1;
                        match hdr.ty() {
                            FrameType::SingleData => {
                                self.stat.singles += 1;
                                let accepted = host.on_data(0, 0, 1, frame.payload());
                                let (reply, result) = if accepted {
                                    (FrameType::Ack, CompletionResult::Success)
                                } else {
                                    (FrameType::Nack, CompletionResult::Rejected)
                                };
                                changes.replies_to_send.push(hdr.reply(reply));
                                host.on_complete(0, result);
                            }
                            FrameType::SingleNoAck => {
                                self.stat.singles += 1;
                                let accepted = host.on_data(0, 0, 1, frame.payload());
                                let result = if accepted {
                                    CompletionResult::Success
                                } else {
                                    CompletionResult::Rejected
                                };
                                host.on_complete(0, result);
                            }
                            FrameType::FragmentData => {
                                self.stat.fragments += 1;
                                let reply =
                                    self.streams.on_fragment(&hdr, frame.payload(), host, now);
                                changes.replies_to_send.push(hdr.reply(reply));
                            }
                            FrameType::Ack | FrameType::Nack => {
                                self.stat.replies += 1;
                                changes.received_replies.push(hdr);
                            }
                        }
                        self.assembler.consume(&hdr);
                    }
                }
            }
        }
        self.check_rep();
        changes
    }

    pub fn sweep_streams(&mut self, host: &mut impl IHost, now: u32) {
        self.streams.sweep(host, now);
    }
}

#[derive(Default)]
struct LocalStat {
    frames: u64,
    singles: u64,
    fragments: u64,
    replies: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderStat {
    pub frames: u64,
    pub singles: u64,
    pub fragments: u64,
    pub replies: u64,
    pub checksum_errors: u64,
    pub resync_bytes: u64,
    pub overflow_bytes: u64,
    pub streams_allocated: u64,
    pub streams_evicted: u64,
    pub streams_timed_out: u64,
    pub fragment_mismatches: u64,
    pub fragments_out_of_range: u64,
    pub duplicate_fragments: u64,
    pub active_streams: usize,
    pub buffered: usize,
}

#[cfg(test)]
mod tests {
    use crate::{
        layer::tests::RecordingHost,
        protocol::{Frame, FrameHeader, FrameHeaderBuilder, FRAME_HDR_LEN},
    };

    use super::*;

    fn downloader() -> Downloader {
        DownloaderBuilder {
            recv_buf_len: 128,
            max_payload: 20,
            max_streams: 2,
            stream_timeout_ticks: 10,
        }
        .build()
    }

    fn hdr(pn: u16, ty: FrameType, len: usize) -> FrameHeader {
        FrameHeaderBuilder {
            packet_number: pn,
            ty,
            payload_size: len as u16,
            stream_id: 0,
            total_frags: 0,
            frag_index: 0,
        }
        .build()
    }

    #[test]
    fn single_is_acked() {
        let mut down = downloader();
        let mut host = RecordingHost::default();
        let bytes = Frame::new(hdr(3, FrameType::SingleData, 2), &[8, 9])
            .unwrap()
            .to_bytes();
        let changes = down.input(&bytes, &mut host, 0);
        assert_eq!(host.delivered, vec![(0, 0, 1, vec![8, 9])]);
        assert_eq!(host.completions, vec![(0, CompletionResult::Success)]);
        assert_eq!(changes.replies_to_send.len(), 1);
        assert_eq!(changes.replies_to_send[0].ty(), FrameType::Ack);
        assert_eq!(changes.replies_to_send[0].packet_number(), 3);
    }

    #[test]
    fn single_rejected() {
        let mut down = downloader();
        let mut host = RecordingHost {
            reject: true,
            ..Default::default()
        };
        let bytes = Frame::new(hdr(3, FrameType::SingleData, 1), &[8])
            .unwrap()
            .to_bytes();
        let changes = down.input(&bytes, &mut host, 0);
        assert_eq!(host.completions, vec![(0, CompletionResult::Rejected)]);
        assert_eq!(changes.replies_to_send[0].ty(), FrameType::Nack);
    }

    #[test]
    fn no_ack_gets_no_reply() {
        let mut down = downloader();
        let mut host = RecordingHost::default();
        let bytes = Frame::new(hdr(3, FrameType::SingleNoAck, 1), &[8])
            .unwrap()
            .to_bytes();
        let changes = down.input(&bytes, &mut host, 0);
        assert_eq!(host.delivered.len(), 1);
        assert!(changes.replies_to_send.is_empty());
    }

    #[test]
    fn corrupted_is_nacked() {
        let mut down = downloader();
        let mut host = RecordingHost::default();
        let mut bytes = Frame::new(hdr(3, FrameType::SingleData, 2), &[8, 9])
            .unwrap()
            .to_bytes();
        bytes[FRAME_HDR_LEN] ^= 0x80;
        let changes = down.input(&bytes, &mut host, 0);
        assert!(host.delivered.is_empty());
        assert_eq!(changes.replies_to_send.len(), 1);
        assert_eq!(changes.replies_to_send[0].ty(), FrameType::Nack);
        assert_eq!(changes.replies_to_send[0].packet_number(), 3);
        assert_eq!(down.stat().checksum_errors, 1);
    }

    #[test]
    fn replies_are_passed_up() {
        let mut down = downloader();
        let mut host = RecordingHost::default();
        let mut bytes = Frame::new(hdr(4, FrameType::Ack, 0), &[]).unwrap().to_bytes();
        bytes.extend(Frame::new(hdr(5, FrameType::Nack, 0), &[]).unwrap().to_bytes());
        let changes = down.input(&bytes, &mut host, 0);
        let pns: Vec<_> = changes
            .received_replies
            .iter()
            .map(|h| (h.packet_number(), h.ty()))
            .collect();
        assert_eq!(pns, vec![(4, FrameType::Ack), (5, FrameType::Nack)]);
        assert!(host.delivered.is_empty());
    }

    #[test]
    fn split_across_calls() {
        let mut down = downloader();
        let mut host = RecordingHost::default();
        let bytes = Frame::new(hdr(3, FrameType::SingleData, 2), &[8, 9])
            .unwrap()
            .to_bytes();
        let (head, tail) = bytes.split_at(7);
        let changes = down.input(head, &mut host, 0);
        assert!(changes.replies_to_send.is_empty());
        assert_eq!(down.stat().buffered, 7);
        let changes = down.input(tail, &mut host, 0);
        assert_eq!(changes.replies_to_send.len(), 1);
        assert_eq!(down.stat().buffered, 0);
    }
}
