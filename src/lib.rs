//! A reliable, fragmenting frame protocol over an ordered but lossy byte
//! transport such as a serial link or a datagram socket.
//!
//! The host owns the transport and the clock. It feeds received bytes into an
//! [`Engine`](layer::Engine), calls [`Engine::process`](layer::Engine::process)
//! once per tick, and learns about outbound frames, delivered data and
//! completions through [`IHost`](layer::IHost).

pub mod layer;
pub mod protocol;
pub mod utils;

pub use layer::{Builder, CompletionResult, Engine, IHost, SendOptions, SendOutcome, SendResult};
