/// How a logical message (a single packet or a whole stream) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionResult {
    Success,
    RetryExceeded,
    Rejected,
    /// The stream was evicted to make room for a newer one.
    Error,
    /// The stream saw no fragment for longer than the configured tick threshold.
    Timeout,
}

/// The outside world as seen by the engine.
///
/// The engine borrows the host only for the duration of a call; every
/// callback runs synchronously on the caller's thread.
pub trait IHost {
    /// Hands one serialized frame to the transport.
    ///
    /// Returning `false` keeps the frame in the outgoing slot; it is offered
    /// again on the next `process` call without consuming a retry.
    fn transmit(&mut self, frame: &[u8]) -> bool;

    /// Delivers one received payload. Unfragmented messages arrive as
    /// `(0, 0, 1, payload)`. Returning `false` rejects the message.
    fn on_data(&mut self, stream_id: u32, frag_index: u16, total_frags: u16, payload: &[u8])
        -> bool;

    /// Reports the end of a message. `stream_id` is `0` for unfragmented ones.
    fn on_complete(&mut self, stream_id: u32, result: CompletionResult);
}
