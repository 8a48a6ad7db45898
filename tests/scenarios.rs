use fraglink::{
    layer::{Builder, CompletionResult, Engine, IHost, SendOptions, SendOutcome},
    protocol::{Frame, FrameHeaderBuilder, FrameType, FRAME_HDR_LEN},
};

#[derive(Default)]
struct Recorder {
    transmitted: Vec<Vec<u8>>,
    delivered: Vec<(u32, u16, u16, Vec<u8>)>,
    completions: Vec<(u32, CompletionResult)>,
    refuse_transmit: bool,
}

impl IHost for Recorder {
    fn transmit(&mut self, frame: &[u8]) -> bool {
        if self.refuse_transmit {
            return false;
        }
        self.transmitted.push(frame.to_vec());
        true
    }

    fn on_data(&mut self, stream_id: u32, frag_index: u16, total_frags: u16, payload: &[u8]) -> bool {
        self.delivered
            .push((stream_id, frag_index, total_frags, payload.to_vec()));
        true
    }

    fn on_complete(&mut self, stream_id: u32, result: CompletionResult) {
        self.completions.push((stream_id, result));
    }
}

struct Link {
    a: Engine,
    ha: Recorder,
    b: Engine,
    hb: Recorder,
    carried_a: usize,
    carried_b: usize,
}

impl Link {
    fn new(builder: impl Fn() -> Builder) -> Self {
        Link {
            a: builder().build().unwrap(),
            ha: Recorder::default(),
            b: builder().build().unwrap(),
            hb: Recorder::default(),
            carried_a: 0,
            carried_b: 0,
        }
    }

    /// One tick on both sides; frames from `a` pass through `wire` first.
    fn tick(&mut self, wire: &mut impl FnMut(&mut Vec<u8>)) {
        self.a.process(&mut self.ha);
        self.b.process(&mut self.hb);
        while self.carried_a < self.ha.transmitted.len() {
            let mut frame = self.ha.transmitted[self.carried_a].clone();
            wire(&mut frame);
            self.b.data_received(&frame, &mut self.hb);
            self.carried_a += 1;
        }
        while self.carried_b < self.hb.transmitted.len() {
            let frame = self.hb.transmitted[self.carried_b].clone();
            self.a.data_received(&frame, &mut self.ha);
            self.carried_b += 1;
        }
    }

    fn run(&mut self, ticks: usize, mut wire: impl FnMut(&mut Vec<u8>)) {
        for _ in 0..ticks {
            self.tick(&mut wire);
        }
    }
}

fn small() -> Builder {
    Builder {
        max_packet_size: 35,
        max_queued_packets: 32,
        max_awaiting_packets: 32,
        max_streams: 2,
        stream_timeout_ticks: 100,
        recv_buf_len: 70,
    }
}

fn fragment(pn: u16, stream_id: u32, total_frags: u16, frag_index: u16, payload: &[u8]) -> Vec<u8> {
    let hdr = FrameHeaderBuilder {
        packet_number: pn,
        ty: FrameType::FragmentData,
        payload_size: payload.len() as u16,
        stream_id,
        total_frags,
        frag_index,
    }
    .build();
    Frame::new(hdr, payload).unwrap().to_bytes()
}

fn reply_types(host: &Recorder) -> Vec<(u16, FrameType)> {
    host.transmitted
        .iter()
        .map(|bytes| {
            let hdr = *Frame::decode(bytes).unwrap().hdr();
            (hdr.packet_number(), hdr.ty())
        })
        .collect()
}

#[test]
fn three_fragments() {
    let mut link = Link::new(small);
    let payload: Vec<u8> = (0..45).collect();
    let result = link.a.send(&payload);
    assert_eq!(result.outcome, SendOutcome::Success);
    assert_eq!(result.fragments, 3);

    link.run(10, |_| ());

    let indices: Vec<_> = link.hb.delivered.iter().map(|d| (d.1, d.2)).collect();
    assert_eq!(indices, vec![(0, 3), (1, 3), (2, 3)]);
    let joined: Vec<u8> = link.hb.delivered.iter().flat_map(|d| d.3.clone()).collect();
    assert_eq!(joined, payload);
    assert_eq!(
        link.hb.completions,
        vec![(result.stream_id, CompletionResult::Success)]
    );
    assert_eq!(
        link.ha.completions,
        vec![(result.stream_id, CompletionResult::Success)]
    );
}

#[test]
fn byte_at_a_time() {
    let mut a = small().build().unwrap();
    let mut b = small().build().unwrap();
    let (mut ha, mut hb) = (Recorder::default(), Recorder::default());
    let payload: Vec<u8> = (100..160).collect();
    a.send(&payload);
    for _ in 0..3 {
        a.process(&mut ha);
    }
    for frame in &ha.transmitted {
        for &byte in frame {
            b.feed(byte, &mut hb);
        }
    }
    let joined: Vec<u8> = hb.delivered.iter().flat_map(|d| d.3.clone()).collect();
    assert_eq!(joined, payload);
    assert_eq!(b.stat().downloader.buffered, 0);
}

#[test]
fn garbage_between_frames() {
    let mut a = small().build().unwrap();
    let mut b = small().build().unwrap();
    let (mut ha, mut hb) = (Recorder::default(), Recorder::default());
    a.send(&[1, 2, 3]);
    a.send(&[4, 5]);
    a.process(&mut ha);
    a.process(&mut ha);

    let mut bytes = vec![0xff];
    bytes.extend(&ha.transmitted[0]);
    bytes.push(0x33);
    bytes.extend(&ha.transmitted[1]);
    b.data_received(&bytes, &mut hb);

    let delivered: Vec<_> = hb.delivered.iter().map(|d| d.3.clone()).collect();
    assert_eq!(delivered, vec![vec![1, 2, 3], vec![4, 5]]);
    assert_eq!(b.stat().downloader.resync_bytes, 2);
    assert_eq!(b.stat().downloader.checksum_errors, 0);
}

#[test]
fn corrupted_singles_are_recovered() {
    let mut link = Link::new(small);
    let mut sent: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 5 + i as usize]).collect();
    for payload in &sent {
        assert_eq!(link.a.send(payload).outcome, SendOutcome::Success);
    }

    let (mut frames, mut corrupted) = (0, 0);
    link.run(40, |frame| {
        frames += 1;
        if frames % 2 == 0 && corrupted < 3 {
            frame[FRAME_HDR_LEN] ^= 0x01;
            corrupted += 1;
        }
    });

    let mut delivered: Vec<Vec<u8>> = link.hb.delivered.iter().map(|d| d.3.clone()).collect();
    delivered.sort();
    sent.sort();
    assert_eq!(delivered, sent);
    assert_eq!(link.b.stat().downloader.checksum_errors, 3);
    assert_eq!(link.a.stat().uploader.retransmissions, 3);
    assert_eq!(link.ha.completions.len(), 6);
    assert!(link
        .ha
        .completions
        .iter()
        .all(|c| *c == (0, CompletionResult::Success)));
}

#[test]
fn nack_without_retry_fails_at_once() {
    let mut link = Link::new(small);
    link.a.send_with(
        &[9; 4],
        SendOptions {
            max_retries: 3,
            retry_on_nack: false,
        },
    );
    link.run(5, |frame| frame[FRAME_HDR_LEN] ^= 0x10);
    assert!(link.hb.delivered.is_empty());
    assert_eq!(
        link.ha.completions,
        vec![(0, CompletionResult::RetryExceeded)]
    );
    assert_eq!(link.a.stat().uploader.frames_sent, 1);
}

#[test]
fn no_ack_is_fire_and_forget() {
    let mut link = Link::new(small);
    link.a.send_no_ack(&[5; 3]).unwrap();
    link.run(5, |_| ());
    assert_eq!(link.hb.delivered, vec![(0, 0, 1, vec![5; 3])]);
    assert_eq!(link.hb.completions, vec![(0, CompletionResult::Success)]);
    assert!(link.hb.transmitted.is_empty());
    assert!(link.ha.completions.is_empty());
    assert_eq!(link.a.stat().uploader.awaiting, 0);
}

#[test]
fn refused_transmit_is_offered_again() {
    let mut a = small().build().unwrap();
    let mut ha = Recorder {
        refuse_transmit: true,
        ..Default::default()
    };
    a.send(&[1]);
    for _ in 0..3 {
        a.process(&mut ha);
    }
    assert!(ha.transmitted.is_empty());
    assert_eq!(a.stat().uploader.transmit_failures, 3);

    ha.refuse_transmit = false;
    a.process(&mut ha);
    assert_eq!(ha.transmitted.len(), 1);
    assert_eq!(a.stat().uploader.retransmissions, 0);
    assert_eq!(a.stat().uploader.awaiting, 1);
}

#[test]
fn duplicate_fragment_is_answered_not_redelivered() {
    let mut b = small().build().unwrap();
    let mut hb = Recorder::default();
    let frame = fragment(4, 9, 1, 0, &[1, 2]);
    b.data_received(&frame, &mut hb);
    b.data_received(&frame, &mut hb);
    assert_eq!(hb.delivered.len(), 1);
    assert_eq!(hb.completions, vec![(9, CompletionResult::Success)]);
    assert_eq!(b.stat().downloader.duplicate_fragments, 1);

    b.process(&mut hb);
    b.process(&mut hb);
    assert_eq!(
        reply_types(&hb),
        vec![(4, FrameType::Ack), (4, FrameType::Ack)]
    );
}

#[test]
fn full_table_evicts_least_recently_active() {
    let mut b = small().build().unwrap();
    let mut hb = Recorder::default();
    b.data_received(&fragment(0, 5, 3, 0, &[0]), &mut hb);
    b.process(&mut hb);
    b.data_received(&fragment(1, 6, 3, 0, &[0]), &mut hb);
    b.process(&mut hb);
    assert!(hb.completions.is_empty());

    b.data_received(&fragment(2, 7, 3, 0, &[0]), &mut hb);
    assert_eq!(hb.completions, vec![(5, CompletionResult::Error)]);
    assert_eq!(b.stat().downloader.streams_evicted, 1);
    assert_eq!(b.stat().downloader.active_streams, 2);
    assert_eq!(hb.delivered.len(), 3);
}

#[test]
fn mismatched_total_is_nacked() {
    let mut b = small().build().unwrap();
    let mut hb = Recorder::default();
    b.data_received(&fragment(0, 5, 3, 0, &[0]), &mut hb);
    b.data_received(&fragment(1, 5, 4, 1, &[0]), &mut hb);
    assert_eq!(hb.delivered.len(), 1);
    assert_eq!(b.stat().downloader.fragment_mismatches, 1);
    b.process(&mut hb);
    b.process(&mut hb);
    assert_eq!(
        reply_types(&hb),
        vec![(0, FrameType::Ack), (1, FrameType::Nack)]
    );
}

#[test]
fn nack_landing_on_full_queue_is_still_retransmitted() {
    let mut link = Link::new(|| Builder {
        max_queued_packets: 1,
        ..small()
    });
    link.a.send(&[1, 2, 3]);
    link.a.process(&mut link.ha);
    let mut frame = link.ha.transmitted[0].clone();
    frame[FRAME_HDR_LEN] ^= 0x01;
    link.b.data_received(&frame, &mut link.hb);
    link.carried_a = 1;

    // the queue is full again when the nack comes back
    assert_eq!(link.a.send(&[4, 5]).outcome, SendOutcome::Success);
    link.b.process(&mut link.hb);
    let nack = link.hb.transmitted[0].clone();
    assert_eq!(reply_types(&link.hb), vec![(0, FrameType::Nack)]);
    link.a.data_received(&nack, &mut link.ha);
    link.carried_b = 1;
    assert_eq!(link.a.stat().uploader.queued, 1);

    link.run(10, |_| ());

    let delivered: Vec<_> = link.hb.delivered.iter().map(|d| d.3.clone()).collect();
    assert_eq!(delivered, vec![vec![4, 5], vec![1, 2, 3]]);
    assert_eq!(link.a.stat().uploader.retransmissions, 1);
    assert_eq!(
        link.ha.completions,
        vec![
            (0, CompletionResult::Success),
            (0, CompletionResult::Success)
        ]
    );
}
