use std::collections::VecDeque;

/// Fixed-capacity byte FIFO.
///
/// Storage is reserved once at construction; pushing into a full ring evicts
/// the oldest byte.
pub struct ByteRing {
    buf: VecDeque<u8>,
    cap: usize,
}

impl ByteRing {
    #[inline]
    fn check_rep(&self) {
        assert!(self.buf.len() <= self.cap);
    }

    #[must_use]
    pub fn new(cap: usize) -> Self {
        let this = ByteRing {
            buf: VecDeque::with_capacity(cap),
            cap,
        };
        this.check_rep();
        this
    }

    /// Returns the byte evicted to make room, if any.
    pub fn push_back(&mut self, byte: u8) -> Option<u8> {
        let evicted = if self.buf.len() == self.cap {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(byte);
        self.check_rep();
        evicted
    }

    /// Contiguous view of every buffered byte, oldest first.
    #[must_use]
    pub fn data(&mut self) -> &[u8] {
        self.buf.make_contiguous()
    }

    pub fn pop_front(&mut self, len: usize) {
        let len = usize::min(len, self.buf.len());
        self.buf.drain(..len);
        self.check_rep();
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }
}
