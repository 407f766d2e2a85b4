use crate::capture::{CaptureConfig, SourceSelector};
use libnetdump_tools::{CaptureHandle, Error, FileHandle, LinkType, LiveOptions};
use std::path::Path;
use tracing::debug;

fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str()
        .ok_or_else(|| Error::SourceUnavailable(format!("{}: invalid file name", path.display())))
}

/// Resolve the source selected by `config`, without activating it
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, Error> {
    match &config.source {
        SourceSelector::File(path) => {
            let handle = FileHandle::open_with_capacity(path_str(path)?, config.buffer_capacity)?;
            Ok(Box::new(handle))
        }
        SourceSelector::Interface(name) => open_interface(name, &config.live),
    }
}

#[cfg(feature = "live")]
fn open_interface(name: &str, options: &LiveOptions) -> Result<Box<dyn CaptureHandle>, Error> {
    debug!("Opening live interface {name}");
    let handle = libnetdump_live::LiveHandle::open(name, options)?;
    Ok(Box::new(handle))
}

#[cfg(not(feature = "live"))]
fn open_interface(name: &str, _options: &LiveOptions) -> Result<Box<dyn CaptureHandle>, Error> {
    debug!("Live capture requested on {name}, but not supported by this build");
    Err(Error::SourceUnavailable(format!(
        "{name}: live capture is not supported (build with the `live` feature)"
    )))
}

/// Create a pcap file sink for frames of type `link_type`
pub fn create_sink(path: &Path, link_type: LinkType) -> Result<Box<dyn CaptureHandle>, Error> {
    let handle = FileHandle::create(path_str(path)?, link_type)?;
    Ok(Box::new(handle))
}
