//! Host-side I/O server
//!
//! The server sits on the other end of Link 0 from the emulated processor
//! and services its file, console, time, command-line and exit requests.
//!
//! - `proto`: tag and result constants of the wire protocol
//! - `codec`: length-prefixed frame encoding and decoding
//! - `platform`: stream table, raw-mode console and wall clock
//! - `handler`: the tag dispatcher and response assembly

pub mod codec;
pub mod handler;
pub mod platform;
pub mod proto;

pub use codec::FrameCodec;
pub use handler::ProtocolHandler;
pub use platform::Platform;
