//! Live capture on a network interface, through libpcap.

mod live_handle;

pub use live_handle::LiveHandle;
