use std::num::Wrapping;

use tracing::trace;

use super::{
    Downloader, DownloaderStat, IHost, SendError, SendOptions, SendResult, Uploader, UploaderStat,
};

/// One end of a reliable link over an ordered, lossy byte transport.
///
/// The engine never blocks and never spawns; all work happens inside the
/// call the host makes. It takes no locks either: when `data_received` and
/// `process` are driven from different contexts the host serializes them,
/// or uses [`super::SharedEngine`].
pub struct Engine {
    uploader: Uploader,
    downloader: Downloader,
    now: Wrapping<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub now: u32,
    pub uploader: UploaderStat,
    pub downloader: DownloaderStat,
}

impl Engine {
    #[must_use]
    pub(super) fn new(uploader: Uploader, downloader: Downloader) -> Self {
        Engine {
            uploader,
            downloader,
            now: Wrapping(0),
        }
    }

    /// Sends `payload` with the default retry policy.
    pub fn send(&mut self, payload: &[u8]) -> SendResult {
        self.send_with(payload, SendOptions::default())
    }

    pub fn send_with(&mut self, payload: &[u8], options: SendOptions) -> SendResult {
        self.uploader.send(payload, options, self.now.0)
    }

    /// Sends a payload that fits in one frame without asking for a reply.
    pub fn send_no_ack(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.uploader.send_no_ack(payload, self.now.0)
    }

    /// Consumes bytes read from the transport, in arrival order.
    pub fn data_received(&mut self, bytes: &[u8], host: &mut impl IHost) {
        let changes = self.downloader.input(bytes, host, self.now.0);
        self.uploader.set_state(changes, host, self.now.0);
    }

    /// Consumes one byte read from the transport.
    #[inline]
    pub fn feed(&mut self, byte: u8, host: &mut impl IHost) {
        self.data_received(&[byte], host);
    }

    /// Advances one tick: offers at most one frame to the transport and
    /// times out idle streams.
    pub fn process(&mut self, host: &mut impl IHost) {
        self.now += Wrapping(1);
        trace!(now = self.now.0, "tick");
        self.uploader.output_frame(host);
        self.downloader.sweep_streams(host, self.now.0);
    }

    #[must_use]
    pub fn stat(&self) -> Stat {
        Stat {
            now: self.now.0,
            uploader: self.uploader.stat(),
            downloader: self.downloader.stat(),
        }
    }

    #[must_use]
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.uploader.max_payload()
    }
}
