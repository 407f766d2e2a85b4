//! Building blocks for netdump: frames, link types, and the capture handle
//! contract with its capture file variant.

mod config;
mod error;
mod file;
mod frame;
mod handle;
mod input;
mod link_type;
mod timestamp;

pub use config::{Config, LiveOptions};
pub use error::*;
pub use file::*;
pub use frame::Frame;
pub use handle::*;
pub use input::*;
pub use link_type::LinkType;
pub use timestamp::*;

pub use pcap_parser;
