use std::num::Wrapping;

/// Packet numbers: start at `0`, wrap at `u16::MAX`.
pub struct PacketNumberGen {
    next: Wrapping<u16>,
}

impl PacketNumberGen {
    #[must_use]
    pub fn new() -> Self {
        PacketNumberGen { next: Wrapping(0) }
    }

    pub fn next(&mut self) -> u16 {
        let n = self.next.0;
        self.next += Wrapping(1);
        n
    }
}

impl Default for PacketNumberGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream ids: start at `1` and skip `0` on wrap-around, `0` being the id of
/// unfragmented messages.
pub struct StreamIdGen {
    next: Wrapping<u32>,
}

impl StreamIdGen {
    #[must_use]
    pub fn new() -> Self {
        StreamIdGen { next: Wrapping(1) }
    }

    pub fn next(&mut self) -> u32 {
        if self.next.0 == 0 {
            self.next += Wrapping(1);
        }
        let n = self.next.0;
        self.next += Wrapping(1);
        n
    }
}

impl Default for StreamIdGen {
    fn default() -> Self {
        Self::new()
    }
}
