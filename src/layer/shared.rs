use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Engine, IHost, SendError, SendOptions, SendResult, Stat};

/// An [`Engine`] behind a mutex, for hosts that feed bytes from one context
/// (say an interrupt-driven reader thread) and drive `process` from another.
///
/// Host callbacks run while the lock is held and must not call back into the
/// same `SharedEngine`.
pub struct SharedEngine {
    engine: Mutex<Engine>,
}

impl SharedEngine {
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        SharedEngine {
            engine: Mutex::new(engine),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        // engine state stays consistent across a panicking callback
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn send(&self, payload: &[u8]) -> SendResult {
        self.lock().send(payload)
    }

    pub fn send_with(&self, payload: &[u8], options: SendOptions) -> SendResult {
        self.lock().send_with(payload, options)
    }

    pub fn send_no_ack(&self, payload: &[u8]) -> Result<(), SendError> {
        self.lock().send_no_ack(payload)
    }

    pub fn data_received(&self, bytes: &[u8], host: &mut impl IHost) {
        self.lock().data_received(bytes, host);
    }

    pub fn process(&self, host: &mut impl IHost) {
        self.lock().process(host);
    }

    #[must_use]
    pub fn stat(&self) -> Stat {
        self.lock().stat()
    }

    #[must_use]
    pub fn into_inner(self) -> Engine {
        self.engine.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
