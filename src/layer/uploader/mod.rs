mod ack_matcher;
mod pending_packet;
mod uploader;

pub use ack_matcher::*;
pub use pending_packet::*;
pub use uploader::*;
