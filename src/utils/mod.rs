mod byte_ring;
mod counter;

pub use byte_ring::*;
pub use counter::*;
