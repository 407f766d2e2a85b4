//! Capture pipeline: filter compiler, layer decoder and capture loop
//!
//! Sources and sinks (capture files, live interfaces) implement
//! [`CaptureHandle`](libnetdump_tools::CaptureHandle) from `libnetdump-tools`.
//! The [`CaptureLoop`] pulls frames from a source, drops those rejected by
//! the compiled filter, and either decodes the others or forwards them to a
//! sink.

mod capture;
pub mod decode;
pub mod filter;
mod open;

pub use capture::*;
pub use decode::{decode, DecodeError, DecodedPacket, FieldValue, Layer};
pub use filter::{compile, CompiledFilter};
pub use open::*;
