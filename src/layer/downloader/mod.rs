mod assembler;
mod downloader;
mod stream_table;

pub use assembler::*;
pub use downloader::*;
pub use stream_table::*;
