use tracing::{debug, warn};

use crate::{
    layer::{CompletionResult, IHost},
    protocol::{FrameHeader, FrameType},
};

struct ActiveStream {
    stream_id: u32,
    total_frags: u16,
    last_activity: u32,
    completion: Option<CompletionResult>,
}

/// Fixed pool of reassembly contexts, one per in-flight fragmented message.
///
/// Fragments are handed to the host as they arrive; nothing is buffered here.
pub struct StreamTable {
    slots: Vec<Option<ActiveStream>>,
    timeout_ticks: u32,
    stat: StreamTableStat,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamTableStat {
    pub allocated: u64,
    pub evicted: u64,
    pub timed_out: u64,
    pub mismatches: u64,
    pub out_of_range: u64,
    pub duplicates: u64,
}

impl StreamTable {
    #[inline]
    fn check_rep(&self) {
        for (i, a) in self.slots.iter().enumerate() {
            for b in self.slots.iter().skip(i + 1) {
                if let (Some(a), Some(b)) = (a, b) {
                    assert_ne!(a.stream_id, b.stream_id);
                }
            }
        }
    }

    #[must_use]
    pub fn new(max_streams: usize, timeout_ticks: u32) -> Self {
        let mut slots = Vec::with_capacity(max_streams);
        slots.resize_with(max_streams, || None);
        let this = StreamTable {
            slots,
            timeout_ticks,
            stat: StreamTableStat::default(),
        };
        this.check_rep();
        this
    }

    /// Handles one `FragmentData` frame and returns the reply type to send.
    pub fn on_fragment(
        &mut self,
        hdr: &FrameHeader,
        payload: &[u8],
        host: &mut impl IHost,
        now: u32,
    ) -> FrameType {
        debug_assert_eq!(hdr.ty(), FrameType::FragmentData);
        let stream_id = hdr.stream_id();
        if hdr.frag_index() >= hdr.total_frags() {
            warn!(
                stream_id,
                frag_index = hdr.frag_index(),
                total_frags = hdr.total_frags(),
                "fragment index out of range"
            );
            self.stat.out_of_range += 1;
            return FrameType::Nack;
        }

        let slot = match self.find(stream_id) {
            Some(x) => x,
            None => match self.allocate(hdr, host, now) {
                Some(x) => x,
                None => return FrameType::Nack,
            },
        };
        let stream = match self.slots[slot].as_mut() {
            Some(x) => x,
            None => return FrameType::Nack,
        };

        // the stream already ended; answer again without delivering twice
        match stream.completion {
            Some(CompletionResult::Success) => {
                self.stat.duplicates += 1;
                return FrameType::Ack;
            }
            Some(_) => {
                self.stat.duplicates += 1;
                return FrameType::Nack;
            }
            None => (),
        }

        if stream.total_frags != hdr.total_frags() {
            warn!(
                stream_id,
                recorded = stream.total_frags,
                received = hdr.total_frags(),
                "fragment count mismatch"
            );
            self.stat.mismatches += 1;
            return FrameType::Nack;
        }

        stream.last_activity = now;
        let accepted = host.on_data(stream_id, hdr.frag_index(), hdr.total_frags(), payload);
        if !accepted {
            debug!(stream_id, frag_index = hdr.frag_index(), "fragment rejected");
            stream.completion = Some(CompletionResult::Rejected);
            host.on_complete(stream_id, CompletionResult::Rejected);
            return FrameType::Nack;
        }
        if hdr.frag_index() == hdr.total_frags() - 1 {
            debug!(stream_id, "stream complete");
            stream.completion = Some(CompletionResult::Success);
            host.on_complete(stream_id, CompletionResult::Success);
        }
        FrameType::Ack
    }

    /// Ends every incomplete stream idle for more than `timeout_ticks`.
    pub fn sweep(&mut self, host: &mut impl IHost, now: u32) {
        for stream in self.slots.iter_mut().flatten() {
            if stream.completion.is_some() {
                continue;
            }
            if now.wrapping_sub(stream.last_activity) > self.timeout_ticks {
                warn!(stream_id = stream.stream_id, "stream timed out");
                stream.completion = Some(CompletionResult::Timeout);
                self.stat.timed_out += 1;
                host.on_complete(stream.stream_id, CompletionResult::Timeout);
            }
        }
    }

    #[must_use]
    fn find(&self, stream_id: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(s) if s.stream_id == stream_id))
    }

    /// Picks an empty slot, else the least recently active completed one,
    /// else evicts the least recently active incomplete stream.
    fn allocate(&mut self, hdr: &FrameHeader, host: &mut impl IHost, now: u32) -> Option<usize> {
        let idle = |s: &ActiveStream| now.wrapping_sub(s.last_activity);
        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(x) => x,
            None => {
                let completed = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
                    .filter(|(_, s)| s.completion.is_some())
                    .max_by_key(|(_, s)| idle(s))
                    .map(|(i, _)| i);
                match completed {
                    Some(x) => x,
                    None => {
                        let (i, victim) = self
                            .slots
                            .iter()
                            .enumerate()
                            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
                            .max_by_key(|(_, s)| idle(s))?;
                        warn!(
                            evicted = victim.stream_id,
                            by = hdr.stream_id(),
                            "reassembly table full, evicting"
                        );
                        self.stat.evicted += 1;
                        host.on_complete(victim.stream_id, CompletionResult::Error);
                        i
                    }
                }
            }
        };

        self.slots[slot] = Some(ActiveStream {
            stream_id: hdr.stream_id(),
            total_frags: hdr.total_frags(),
            last_activity: now,
            completion: None,
        });
        self.stat.allocated += 1;
        debug!(stream_id = hdr.stream_id(), total_frags = hdr.total_frags(), slot, "stream allocated");
        self.check_rep();
        Some(slot)
    }

    #[must_use]
    pub fn stat(&self) -> StreamTableStat {
        self.stat.clone()
    }

    /// Number of streams still waiting for fragments.
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.completion.is_none())
            .count()
    }
}
