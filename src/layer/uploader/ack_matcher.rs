use std::collections::VecDeque;

use crate::protocol::{FrameHeader, FrameType};

use super::PendingPacket;

pub enum MatchOutcome {
    /// No queued or awaiting packet carries the replied packet number.
    Unmatched,
    Acked(PendingPacket),
    /// Moved to the tail of the outbound queue for retransmission.
    Requeued,
    /// Retransmission is granted but the outbound queue is full; the packet
    /// stays where it was found, flagged, until the uploader finds room.
    Deferred,
    Exhausted(PendingPacket),
}

enum Origin {
    ToSend(usize),
    Awaiting(usize),
}

/// Reconciles one `Ack`/`Nack` against the packets still held by the uploader.
///
/// The outbound queue is searched first, then the packets already handed to
/// the transport. Entries that do not match keep their relative order.
pub fn match_reply(
    to_send_queue: &mut VecDeque<PendingPacket>,
    to_send_queue_cap: usize,
    awaiting: &mut VecDeque<PendingPacket>,
    reply: &FrameHeader,
    now: u32,
) -> MatchOutcome {
    debug_assert!(reply.ty().is_reply());
    let pn = reply.packet_number();

    let origin = if let Some(i) = to_send_queue.iter().position(|p| p.is_answered_by(pn)) {
        Origin::ToSend(i)
    } else if let Some(i) = awaiting.iter().position(|p| p.is_answered_by(pn)) {
        Origin::Awaiting(i)
    } else {
        return MatchOutcome::Unmatched;
    };
    let packet = match origin {
        Origin::ToSend(i) => to_send_queue.remove(i),
        Origin::Awaiting(i) => awaiting.remove(i),
    };
    let mut packet = match packet {
        Some(x) => x,
        None => return MatchOutcome::Unmatched,
    };

    match reply.ty() {
        // already granted; waiting for room in the outbound queue
        FrameType::Nack if packet.retransmit_pending() => {
            put_back(to_send_queue, awaiting, origin, packet);
            MatchOutcome::Deferred
        }
        FrameType::Nack if packet.can_retry() => {
            packet.to_retransmit(now);
            if to_send_queue.len() < to_send_queue_cap {
                to_send_queue.push_back(packet);
                MatchOutcome::Requeued
            } else {
                packet.set_retransmit_pending(true);
                put_back(to_send_queue, awaiting, origin, packet);
                MatchOutcome::Deferred
            }
        }
        FrameType::Nack => MatchOutcome::Exhausted(packet),
        _ => MatchOutcome::Acked(packet),
    }
}

fn put_back(
    to_send_queue: &mut VecDeque<PendingPacket>,
    awaiting: &mut VecDeque<PendingPacket>,
    origin: Origin,
    packet: PendingPacket,
) {
    match origin {
        Origin::ToSend(i) => to_send_queue.insert(i, packet),
        Origin::Awaiting(i) => awaiting.insert(i, packet),
    }
}
